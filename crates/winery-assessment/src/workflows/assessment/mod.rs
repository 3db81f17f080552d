//! Self-assessment lifecycle: segment selection, answer upserts, evidence tracking,
//! completion scoring, and result projections.

pub mod blob;
pub mod catalog;
pub mod domain;
pub mod evidence;
pub mod memory;
pub mod report;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use blob::FsBlobStore;
pub use catalog::{load_dir, CatalogLoadError, CatalogParts, CatalogProvider, CatalogSnapshot};
pub use domain::{
    Answer, AnswerId, AnswerSubmission, Assessment, AssessmentId, AssessmentState,
    AssessmentStatus, Chapter, ChapterId, Evidence, EvidenceId, EvidenceStatus, Indicator,
    IndicatorId, OrganizationId, ResponseLevel, ResponseLevelId, ScoreLine, ScoreSnapshot,
    Segment, SegmentId, SustainabilityTier, TierId, TierRef,
};
pub use evidence::{EvidenceTracker, DEFAULT_MAX_EVIDENCE_BYTES};
pub use memory::{InMemoryStore, MemoryBlobStore};
pub use report::{
    ChapterResult, DetailedResult, HistoryItem, IndicatorResult, LatestResult, ReportProjection,
    TierSummary,
};
pub use repository::{
    AnswerRepository, AnswerUpsert, AssessmentRepository, AssessmentStore, BlobError,
    BlobStore, CompletionRecord, EvidenceRepository, RepositoryError,
};
pub use router::assessment_router;
pub use scoring::select_tier;
pub use service::{
    AssessmentError, AssessmentService, AssessmentStructure, GetOrCreateOutcome,
    StructureChapter, StructureIndicator,
};
