use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::assessment::catalog::{CatalogParts, CatalogSnapshot};
use crate::workflows::assessment::domain::{
    AnswerSubmission, Assessment, AssessmentId, Chapter, ChapterId, Indicator, IndicatorId,
    OrganizationId, ResponseLevel, ResponseLevelId, Segment, SegmentId, SustainabilityTier,
    TierId,
};
use crate::workflows::assessment::memory::{InMemoryStore, MemoryBlobStore};
use crate::workflows::assessment::repository::{BlobError, BlobStore};
use crate::workflows::assessment::service::AssessmentService;
use crate::workflows::assessment::DEFAULT_MAX_EVIDENCE_BYTES;

pub(super) const BOUTIQUE: SegmentId = SegmentId(1);
pub(super) const ESTATE: SegmentId = SegmentId(2);
pub(super) const ORG: OrganizationId = OrganizationId(42);

pub(super) type TestService = AssessmentService<CatalogSnapshot, InMemoryStore, MemoryBlobStore>;

/// Level id for an indicator: `1` scores nothing, `2` scores `10 * indicator`, `3` scores 40.
pub(super) fn level(indicator: i64, rank: i64) -> ResponseLevelId {
    ResponseLevelId(indicator * 10 + rank)
}

pub(super) fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n% winery evidence\n".to_vec()
}

/// Boutique (segment 1) scores indicators 1-3 against three tiers; Estate (segment 2)
/// scores indicators 1-4 and has no tiers. Indicator 4 sits alone in chapter 3.
pub(super) fn catalog_parts() -> CatalogParts {
    let chapters = [(1, "Vineyard"), (2, "Cellar"), (3, "Community")]
        .into_iter()
        .map(|(id, name)| Chapter {
            id: ChapterId(id),
            name: name.to_string(),
            description: format!("{name} practices"),
            order: id as i32,
        })
        .collect();

    let indicators = [(1, 1), (2, 1), (3, 2), (4, 3)]
        .into_iter()
        .map(|(id, chapter)| Indicator {
            id: IndicatorId(id),
            chapter_id: ChapterId(chapter),
            name: format!("Indicator {id}"),
            description: String::new(),
            order: id as i32,
        })
        .collect();

    let mut response_levels = Vec::new();
    for indicator in 1..=4_i64 {
        for (rank, points) in [(1, 0), (2, 10 * indicator as i32), (3, 40)] {
            response_levels.push(ResponseLevel {
                id: level(indicator, rank),
                indicator_id: IndicatorId(indicator),
                name: format!("Level {rank}"),
                description: format!("Rank {rank} practice"),
                points,
                position: rank as i32,
            });
        }
    }

    let tiers = [(1, "Low", 0, 50), (2, "Medium", 51, 80), (3, "High", 81, 100)]
        .into_iter()
        .map(|(id, name, min_score, max_score)| SustainabilityTier {
            id: TierId(id),
            segment_id: BOUTIQUE,
            name: name.to_string(),
            min_score,
            max_score,
        })
        .collect();

    CatalogParts {
        segments: vec![
            Segment {
                id: BOUTIQUE,
                name: "Boutique".to_string(),
                min_tourists: 0,
                max_tourists: Some(5_000),
            },
            Segment {
                id: ESTATE,
                name: "Estate".to_string(),
                min_tourists: 5_001,
                max_tourists: None,
            },
        ],
        chapters,
        indicators,
        response_levels,
        applicability: vec![
            (BOUTIQUE, IndicatorId(1)),
            (BOUTIQUE, IndicatorId(2)),
            (BOUTIQUE, IndicatorId(3)),
            (ESTATE, IndicatorId(1)),
            (ESTATE, IndicatorId(2)),
            (ESTATE, IndicatorId(3)),
            (ESTATE, IndicatorId(4)),
        ],
        tiers,
    }
}

pub(super) fn catalog() -> Arc<CatalogSnapshot> {
    Arc::new(CatalogSnapshot::new(catalog_parts()).expect("test catalog validates"))
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<InMemoryStore>,
    pub(super) blobs: Arc<MemoryBlobStore>,
}

pub(super) fn harness() -> Harness {
    harness_with_limit(DEFAULT_MAX_EVIDENCE_BYTES)
}

pub(super) fn harness_with_limit(max_bytes: usize) -> Harness {
    let catalog = catalog();
    let store = Arc::new(InMemoryStore::new(catalog.clone()));
    let blobs = Arc::new(MemoryBlobStore::default());
    let service = Arc::new(AssessmentService::new(
        catalog,
        store.clone(),
        blobs.clone(),
        max_bytes,
    ));
    Harness {
        service,
        store,
        blobs,
    }
}

pub(super) fn answers(items: &[(i64, i64)]) -> Vec<AnswerSubmission> {
    items
        .iter()
        .map(|(indicator, rank)| AnswerSubmission {
            indicator_id: IndicatorId(*indicator),
            response_level_id: level(*indicator, *rank),
        })
        .collect()
}

/// A pending Boutique assessment with the given answers recorded.
pub(super) fn answered_assessment(service: &TestService, items: &[(i64, i64)]) -> AssessmentId {
    let outcome = service.get_or_create(ORG).expect("assessment starts");
    let id = outcome.assessment.id;
    service.select_segment(id, BOUTIQUE).expect("segment selects");
    service
        .submit_answers(id, &answers(items))
        .expect("answers store");
    id
}

pub(super) fn completed_assessment(service: &TestService, items: &[(i64, i64)]) -> Assessment {
    let id = answered_assessment(service, items);
    service.complete(id).expect("assessment completes")
}

/// Blob store whose deletes always fail.
#[derive(Default)]
pub(super) struct StickyBlobStore {
    inner: MemoryBlobStore,
}

impl StickyBlobStore {
    pub(super) fn paths(&self) -> Vec<String> {
        self.inner.paths()
    }
}

impl BlobStore for StickyBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.inner.put(path, bytes)
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.inner.get(path)
    }

    fn remove(&self, path: &str) -> Result<(), BlobError> {
        Err(BlobError::Io {
            path: path.to_string(),
            source: std::io::Error::other("volume is read only"),
        })
    }
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .expect("read body")
        .to_vec()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    serde_json::from_slice(&read_body(response).await).expect("json payload")
}

/// Multipart body carrying a single `file` field.
pub(super) fn multipart_upload(file_name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "winery-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
