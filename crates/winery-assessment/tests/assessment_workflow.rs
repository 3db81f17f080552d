use std::sync::Arc;

use winery_assessment::workflows::assessment::{
    load_dir, AnswerRepository, AnswerSubmission, AssessmentError, AssessmentService,
    AssessmentStatus, CatalogParts, CatalogSnapshot, Chapter, ChapterId, EvidenceRepository,
    FsBlobStore, InMemoryStore, Indicator, IndicatorId, OrganizationId, ResponseLevel,
    ResponseLevelId, Segment, SegmentId, SustainabilityTier, TierId,
    DEFAULT_MAX_EVIDENCE_BYTES,
};

type FsService = AssessmentService<CatalogSnapshot, InMemoryStore, FsBlobStore>;

const WINERY: OrganizationId = OrganizationId(7);
const SEGMENT: SegmentId = SegmentId(1);

/// Each indicator offers 0 points or `10 * indicator` points.
fn catalog() -> CatalogSnapshot {
    let indicators = (1..=3)
        .map(|id| Indicator {
            id: IndicatorId(id),
            chapter_id: ChapterId(1),
            name: format!("Practice {id}"),
            description: String::new(),
            order: id as i32,
        })
        .collect();
    let response_levels = (1..=3_i64)
        .flat_map(|indicator| {
            [(0, 0), (1, 10 * indicator as i32)]
                .into_iter()
                .map(move |(rank, points)| ResponseLevel {
                    id: ResponseLevelId(indicator * 10 + rank),
                    indicator_id: IndicatorId(indicator),
                    name: if rank == 0 { "Absent" } else { "Present" }.to_string(),
                    description: String::new(),
                    points,
                    position: rank as i32,
                })
        })
        .collect();
    let tiers = [(1, "Low", 0, 50), (2, "Medium", 51, 80), (3, "High", 81, 100)]
        .into_iter()
        .map(|(id, name, min_score, max_score)| SustainabilityTier {
            id: TierId(id),
            segment_id: SEGMENT,
            name: name.to_string(),
            min_score,
            max_score,
        })
        .collect();

    CatalogSnapshot::new(CatalogParts {
        segments: vec![Segment {
            id: SEGMENT,
            name: "Family estate".to_string(),
            min_tourists: 0,
            max_tourists: None,
        }],
        chapters: vec![Chapter {
            id: ChapterId(1),
            name: "Vineyard".to_string(),
            description: String::new(),
            order: 1,
        }],
        indicators,
        response_levels,
        applicability: (1..=3).map(|id| (SEGMENT, IndicatorId(id))).collect(),
        tiers,
    })
    .expect("catalog validates")
}

fn service(evidence_root: &std::path::Path) -> (FsService, Arc<InMemoryStore>) {
    let catalog = Arc::new(catalog());
    let store = Arc::new(InMemoryStore::new(catalog.clone()));
    let blobs = Arc::new(FsBlobStore::new(evidence_root));
    let service = AssessmentService::new(
        catalog,
        store.clone(),
        blobs,
        DEFAULT_MAX_EVIDENCE_BYTES,
    );
    (service, store)
}

fn scoring_answers(indicators: &[i64]) -> Vec<AnswerSubmission> {
    indicators
        .iter()
        .map(|indicator| AnswerSubmission {
            indicator_id: IndicatorId(*indicator),
            response_level_id: ResponseLevelId(indicator * 10 + 1),
        })
        .collect()
}

#[test]
fn end_to_end_assessment_reaches_a_tier() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, _) = service(dir.path());

    let started = service.get_or_create(WINERY).expect("starts");
    assert!(started.is_new);
    assert_eq!(started.assessment.status(), AssessmentStatus::Pending);
    let id = started.assessment.id;

    service.select_segment(id, SEGMENT).expect("segment");
    service
        .submit_answers(id, &scoring_answers(&[1, 2, 3]))
        .expect("answers");
    let completed = service.complete(id).expect("completes");

    assert_eq!(completed.status(), AssessmentStatus::Completed);
    assert_eq!(completed.final_score(), Some(60));
    assert_eq!(
        completed.tier().map(|tier| tier.name.as_str()),
        Some("Medium")
    );

    let next = service.get_or_create(WINERY).expect("next assessment");
    assert!(next.is_new);
    assert_ne!(next.assessment.id, id);
}

#[test]
fn resuming_returns_the_same_pending_assessment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, _) = service(dir.path());

    let first = service.get_or_create(WINERY).expect("first");
    let second = service.get_or_create(WINERY).expect("second");
    let other = service.get_or_create(OrganizationId(8)).expect("other org");

    assert_eq!(first.assessment.id, second.assessment.id);
    assert!(!second.is_new);
    assert_ne!(other.assessment.id, first.assessment.id);
}

#[test]
fn completion_needs_every_applicable_indicator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, _) = service(dir.path());
    let id = service.get_or_create(WINERY).expect("starts").assessment.id;
    service.select_segment(id, SEGMENT).expect("segment");
    service
        .submit_answers(id, &scoring_answers(&[1, 3]))
        .expect("answers");

    match service.complete(id) {
        Err(AssessmentError::Incomplete { expected, answered }) => {
            assert_eq!((expected, answered), (3, 2));
        }
        other => panic!("expected incomplete, got {other:?}"),
    }
}

#[test]
fn completed_assessment_is_immutable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, store) = service(dir.path());
    let id = service.get_or_create(WINERY).expect("starts").assessment.id;
    service.select_segment(id, SEGMENT).expect("segment");
    service
        .submit_answers(id, &scoring_answers(&[1, 2, 3]))
        .expect("answers");
    service.complete(id).expect("completes");

    let change = vec![AnswerSubmission {
        indicator_id: IndicatorId(1),
        response_level_id: ResponseLevelId(10),
    }];
    assert!(matches!(
        service.submit_answers(id, &change),
        Err(AssessmentError::InvalidState(_))
    ));
    assert!(matches!(
        service.cancel(id),
        Err(AssessmentError::InvalidState(_))
    ));
    let stored = store.list_answers(id).expect("answers");
    assert!(stored
        .iter()
        .all(|answer| answer.response_level_id.0 % 10 == 1));
}

#[test]
fn evidence_lands_on_disk_once_per_answer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, store) = service(dir.path());
    let id = service.get_or_create(WINERY).expect("starts").assessment.id;
    service.select_segment(id, SEGMENT).expect("segment");
    let answer = service
        .submit_answers(id, &scoring_answers(&[1]))
        .expect("answers")[0]
        .id;

    let evidence = service
        .evidence()
        .attach(id, answer, "cover crops.pdf", b"%PDF-1.4 cover crops")
        .expect("attach");
    let on_disk = dir.path().join(&evidence.storage_location);
    assert!(on_disk.is_file());
    assert!(evidence.storage_location.starts_with("7/cover_crops_ae"));

    assert!(matches!(
        service
            .evidence()
            .attach(id, answer, "again.pdf", b"%PDF-1.4 again"),
        Err(AssessmentError::Conflict(_))
    ));
    assert_eq!(store.count_for_assessment(id).expect("count"), 1);

    service.evidence().remove(id, answer).expect("remove");
    assert!(!on_disk.exists());
}

#[test]
fn catalog_directory_round_trips_through_the_loader() {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = [
        ("segments.csv", "id,name,min_tourists,max_tourists\n1,Family estate,0,\n"),
        ("chapters.csv", "id,name,description,order\n1,Vineyard,,1\n"),
        (
            "indicators.csv",
            "id,chapter_id,name,description,order\n1,1,Soil cover,,1\n",
        ),
        (
            "response_levels.csv",
            "id,indicator_id,name,description,points,position\n\
             11,1,Absent,,0,1\n\
             12,1,Present,,10,2\n",
        ),
        ("applicability.csv", "segment_id,indicator_id\n1,1\n"),
        (
            "tiers.csv",
            "id,segment_id,name,min_score,max_score\n1,1,Starter,0,5\n2,1,Leader,6,10\n",
        ),
    ];
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("write catalog file");
    }

    let catalog = load_dir(dir.path()).expect("catalog loads");
    assert_eq!(catalog.segment_count(), 1);
    assert_eq!(catalog.indicator_count(), 1);
    assert!(catalog.tier_overlaps().is_empty());
}
