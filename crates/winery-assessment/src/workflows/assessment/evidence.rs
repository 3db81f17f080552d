use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::catalog::CatalogProvider;
use super::domain::{
    Answer, AnswerId, Assessment, AssessmentId, AssessmentStatus, Evidence, EvidenceStatus,
    IndicatorId,
};
use super::repository::{AssessmentStore, BlobStore, RepositoryError};
use super::service::{load_assessment, AssessmentError};

/// Upload cap for a single evidence document.
pub const DEFAULT_MAX_EVIDENCE_BYTES: usize = 2 * 1024 * 1024;

const PDF_EXTENSION: &str = "pdf";

/// Keeps evidence records, their blobs, and the assessment's evidence status in step.
pub struct EvidenceTracker<C, S, B> {
    catalog: Arc<C>,
    store: Arc<S>,
    blobs: Arc<B>,
    max_bytes: usize,
}

impl<C, S, B> EvidenceTracker<C, S, B>
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    pub fn new(catalog: Arc<C>, store: Arc<S>, blobs: Arc<B>, max_bytes: usize) -> Self {
        Self {
            catalog,
            store,
            blobs,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store a PDF for an answer that has no evidence yet.
    pub fn attach(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Evidence, AssessmentError> {
        let (assessment, answer) = self.writable_answer(assessment_id, answer_id)?;
        self.validate_file(file_name, bytes.len())?;

        if self.store.find_by_answer(answer.id)?.is_some() {
            return Err(AssessmentError::Conflict(format!(
                "answer {answer_id} already has evidence"
            )));
        }

        let evidence = self.store_document(&assessment, &answer, file_name, bytes)?;
        self.recompute_status(assessment_id)?;
        Ok(evidence)
    }

    /// Swap the evidence for an answer, attaching fresh when none exists.
    pub fn replace(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Evidence, AssessmentError> {
        let (assessment, answer) = self.writable_answer(assessment_id, answer_id)?;
        self.validate_file(file_name, bytes.len())?;

        self.invalidate(answer.id)?;
        let evidence = self.store_document(&assessment, &answer, file_name, bytes)?;
        self.recompute_status(assessment_id)?;
        Ok(evidence)
    }

    pub fn remove(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
    ) -> Result<(), AssessmentError> {
        self.writable_answer(assessment_id, answer_id)?;
        if !self.invalidate(answer_id)? {
            return Err(AssessmentError::not_found("evidence for answer", answer_id.0));
        }
        self.recompute_status(assessment_id)?;
        Ok(())
    }

    pub fn find(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
    ) -> Result<Option<Evidence>, AssessmentError> {
        let answer = self.owned_answer(assessment_id, answer_id)?;
        Ok(self.store.find_by_answer(answer.id)?)
    }

    pub fn list(&self, assessment_id: AssessmentId) -> Result<Vec<Evidence>, AssessmentError> {
        load_assessment(self.store.as_ref(), assessment_id)?;
        Ok(self.store.list_for_assessment(assessment_id)?)
    }

    /// The evidence record and its document bytes.
    pub fn download(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
    ) -> Result<(Evidence, Vec<u8>), AssessmentError> {
        let evidence = self
            .find(assessment_id, answer_id)?
            .ok_or_else(|| AssessmentError::not_found("evidence for answer", answer_id.0))?;
        let bytes = self.blobs.get(&evidence.storage_location)?;
        Ok((evidence, bytes))
    }

    /// Zip bundle with one entry per evidence document of the assessment.
    pub fn archive(&self, assessment_id: AssessmentId) -> Result<Vec<u8>, AssessmentError> {
        let evidence = self.list(assessment_id)?;
        if evidence.is_empty() {
            return Err(AssessmentError::not_found(
                "evidence for assessment",
                assessment_id.0,
            ));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for item in &evidence {
            let bytes = self.blobs.get(&item.storage_location)?;
            writer.start_file(archive_entry_name(item), options)?;
            writer
                .write_all(&bytes)
                .map_err(zip::result::ZipError::from)?;
        }
        let cursor = writer.finish()?;

        info!(
            assessment_id = %assessment_id,
            documents = evidence.len(),
            "evidence archive built"
        );
        Ok(cursor.into_inner())
    }

    /// Drop the evidence attached to an answer: the record first, then the blob on a
    /// best-effort basis. Returns whether anything was attached.
    pub fn invalidate(&self, answer_id: AnswerId) -> Result<bool, AssessmentError> {
        let Some(evidence) = self.store.find_by_answer(answer_id)? else {
            return Ok(false);
        };

        match self.store.delete_evidence(evidence.id) {
            Ok(()) | Err(RepositoryError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }

        self.discard_blob(&evidence);
        Ok(true)
    }

    /// Remove the blob behind a deleted evidence record. Failures are logged, not returned.
    pub(crate) fn discard_blob(&self, evidence: &Evidence) {
        if let Err(err) = self.blobs.remove(&evidence.storage_location) {
            warn!(
                answer_id = %evidence.answer_id,
                evidence_id = %evidence.id,
                path = %evidence.storage_location,
                error = %err,
                "failed to remove evidence blob; continuing"
            );
        }
    }

    /// Recount evidence over the segment's applicable indicators and persist the status.
    /// Without a segment nothing is persisted and `NONE` is returned.
    pub fn recompute_status(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<EvidenceStatus, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        let Some(segment_id) = assessment.segment_id() else {
            return Ok(EvidenceStatus::None);
        };

        let applicable: BTreeSet<IndicatorId> = self
            .catalog
            .list_applicable_indicator_ids(segment_id)?
            .into_iter()
            .collect();
        let with_evidence: BTreeSet<AnswerId> = self
            .store
            .list_for_assessment(assessment_id)?
            .into_iter()
            .map(|evidence| evidence.answer_id)
            .collect();
        let covered = self
            .store
            .list_answers(assessment_id)?
            .iter()
            .filter(|answer| {
                applicable.contains(&answer.indicator_id) && with_evidence.contains(&answer.id)
            })
            .count();

        let status = EvidenceStatus::compute(applicable.len(), covered);
        self.store.update_evidence_status(assessment_id, status)?;
        Ok(status)
    }

    fn owned_answer(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
    ) -> Result<Answer, AssessmentError> {
        load_assessment(self.store.as_ref(), assessment_id)?;
        self.store
            .list_answers(assessment_id)?
            .into_iter()
            .find(|answer| answer.id == answer_id)
            .ok_or_else(|| AssessmentError::not_found("answer", answer_id.0))
    }

    fn writable_answer(
        &self,
        assessment_id: AssessmentId,
        answer_id: AnswerId,
    ) -> Result<(Assessment, Answer), AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        if assessment.status() == AssessmentStatus::Cancelled {
            return Err(AssessmentError::InvalidState(format!(
                "assessment {assessment_id} is cancelled"
            )));
        }
        let answer = self.owned_answer(assessment_id, answer_id)?;
        Ok((assessment, answer))
    }

    fn validate_file(&self, file_name: &str, size: usize) -> Result<(), AssessmentError> {
        if mime_guess::from_path(file_name).first() != Some(mime::APPLICATION_PDF) {
            return Err(AssessmentError::Validation(format!(
                "{file_name} is not a PDF document"
            )));
        }
        if size == 0 {
            return Err(AssessmentError::Validation(format!("{file_name} is empty")));
        }
        if size > self.max_bytes {
            return Err(AssessmentError::Validation(format!(
                "{file_name} is {size} bytes; the limit is {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }

    fn store_document(
        &self,
        assessment: &Assessment,
        answer: &Answer,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Evidence, AssessmentError> {
        let location = storage_location(assessment, answer, file_name);
        self.blobs.put(&location, bytes)?;

        match self.store.create_evidence(answer.id, file_name, &location) {
            Ok(evidence) => {
                info!(
                    assessment_id = %assessment.id,
                    answer_id = %answer.id,
                    path = %location,
                    bytes = bytes.len(),
                    "evidence stored"
                );
                Ok(evidence)
            }
            Err(err) => {
                if let Err(blob_err) = self.blobs.remove(&location) {
                    warn!(
                        path = %location,
                        error = %blob_err,
                        "failed to roll back evidence blob"
                    );
                }
                match err {
                    RepositoryError::Conflict => Err(AssessmentError::Conflict(format!(
                        "answer {} already has evidence",
                        answer.id
                    ))),
                    other => Err(other.into()),
                }
            }
        }
    }
}

/// `{organization}/{stem}_ae{assessment}_r{answer}_{YYYYmmdd_HHMMSS}.pdf`
fn storage_location(assessment: &Assessment, answer: &Answer, file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(sanitize_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "evidence".to_string());
    format!(
        "{}/{}_ae{}_r{}_{}.{PDF_EXTENSION}",
        assessment.organization_id,
        stem,
        assessment.id,
        answer.id,
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn archive_entry_name(evidence: &Evidence) -> String {
    let base = Path::new(&evidence.display_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("evidence.pdf");
    format!("r{}_{}", evidence.answer_id, base)
}
