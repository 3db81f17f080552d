use chrono::{DateTime, Utc};

use super::domain::{
    Answer, AnswerId, Assessment, AssessmentId, Evidence, EvidenceId, EvidenceStatus,
    IndicatorId, OrganizationId, ResponseLevelId, ScoreSnapshot, SegmentId, TierRef,
};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Everything persisted by the `PENDING -> COMPLETED` transition, written in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub final_score: i32,
    pub tier: Option<TierRef>,
    pub snapshot: ScoreSnapshot,
    pub finished_at: DateTime<Utc>,
}

/// Assessment rows. Transitions are conditional writes: a store must refuse them with
/// `RepositoryError::Conflict` when the stored row is no longer `PENDING`.
pub trait AssessmentRepository: Send + Sync {
    /// Returns the organization's pending assessment, creating one if none exists.
    /// The boolean is `true` when a row was inserted. Lookup and insert are one atomic step.
    fn find_or_create_pending(
        &self,
        organization_id: OrganizationId,
        started_at: DateTime<Utc>,
    ) -> Result<(Assessment, bool), RepositoryError>;
    fn fetch(&self, id: AssessmentId) -> Result<Option<Assessment>, RepositoryError>;
    /// Sets the segment and resets evidence status to `NONE`. The segment is fixed once
    /// stored: assigning the same segment again returns the row unchanged, a different one
    /// fails with `RepositoryError::Conflict`.
    fn assign_segment(
        &self,
        id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<Assessment, RepositoryError>;
    fn update_evidence_status(
        &self,
        id: AssessmentId,
        status: EvidenceStatus,
    ) -> Result<(), RepositoryError>;
    fn complete(
        &self,
        id: AssessmentId,
        record: CompletionRecord,
    ) -> Result<Assessment, RepositoryError>;
    fn cancel(
        &self,
        id: AssessmentId,
        finished_at: DateTime<Utc>,
    ) -> Result<Assessment, RepositoryError>;
    /// Completed assessments for an organization, most recently finished first.
    fn completed_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Assessment>, RepositoryError>;
}

/// Outcome of an answer upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerUpsert {
    pub answer: Answer,
    /// Evidence record removed because the level changed. Its blob is still on disk.
    pub dropped_evidence: Option<Evidence>,
}

/// Answer store keyed by (assessment, indicator).
pub trait AnswerRepository: Send + Sync {
    /// Inserts or replaces the level for the pair. Last writer wins; the answer id is stable.
    /// A changed level drops the answer's evidence record in the same write. Fails with
    /// `RepositoryError::Conflict` unless the assessment is `PENDING`.
    fn upsert_answer(
        &self,
        assessment_id: AssessmentId,
        indicator_id: IndicatorId,
        response_level_id: ResponseLevelId,
    ) -> Result<AnswerUpsert, RepositoryError>;
    fn list_answers(&self, assessment_id: AssessmentId) -> Result<Vec<Answer>, RepositoryError>;
    fn delete_all_answers(&self, assessment_id: AssessmentId) -> Result<(), RepositoryError>;
    /// Sum of the points of every referenced response level; 0 without answers.
    fn total_score(&self, assessment_id: AssessmentId) -> Result<i32, RepositoryError>;
}

/// Evidence records, at most one per answer.
pub trait EvidenceRepository: Send + Sync {
    fn find_by_answer(&self, answer_id: AnswerId) -> Result<Option<Evidence>, RepositoryError>;
    /// Fails with `RepositoryError::Conflict` when the answer already has evidence.
    fn create_evidence(
        &self,
        answer_id: AnswerId,
        display_name: &str,
        storage_location: &str,
    ) -> Result<Evidence, RepositoryError>;
    fn delete_evidence(&self, evidence_id: EvidenceId) -> Result<(), RepositoryError>;
    fn list_for_assessment(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Evidence>, RepositoryError>;
    fn count_for_assessment(&self, assessment_id: AssessmentId) -> Result<usize, RepositoryError>;
}

/// The relational store as a whole.
pub trait AssessmentStore: AssessmentRepository + AnswerRepository + EvidenceRepository {}

impl<T> AssessmentStore for T where
    T: AssessmentRepository + AnswerRepository + EvidenceRepository
{
}

/// Path-keyed file storage for evidence documents.
pub trait BlobStore: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;
    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;
    fn remove(&self, path: &str) -> Result<(), BlobError>;
}

/// Blob storage failure.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob path rejected: {0}")]
    InvalidPath(String),
    #[error("blob io failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
