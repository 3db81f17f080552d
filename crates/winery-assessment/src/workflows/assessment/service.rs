use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::catalog::CatalogProvider;
use super::domain::{
    Answer, AnswerSubmission, Assessment, AssessmentId, Chapter, Indicator, IndicatorId,
    OrganizationId, ResponseLevel, ResponseLevelId, Segment, SegmentId,
};
use super::evidence::EvidenceTracker;
use super::report::ReportProjection;
use super::repository::{
    AssessmentRepository, AssessmentStore, BlobError, BlobStore, CompletionRecord,
    RepositoryError,
};
use super::scoring::{capture_snapshot, select_tier};

pub const CREATED_MESSAGE: &str = "assessment created";
pub const RESUMED_MESSAGE: &str =
    "a pending assessment already exists; cancel it to start a new one";

/// Result of `get_or_create`: the pending assessment plus the answers recorded so far.
#[derive(Debug, Clone, Serialize)]
pub struct GetOrCreateOutcome {
    pub assessment: Assessment,
    pub answers: Vec<Answer>,
    pub is_new: bool,
    pub message: &'static str,
}

/// Catalog tree for one assessment, annotated with applicability and current answers.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentStructure {
    pub assessment_id: AssessmentId,
    pub segment: Segment,
    pub chapters: Vec<StructureChapter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureChapter {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub indicators: Vec<StructureIndicator>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureIndicator {
    #[serde(flatten)]
    pub indicator: Indicator,
    pub applicable: bool,
    pub selected_level_id: Option<ResponseLevelId>,
    pub levels: Vec<ResponseLevel>,
}

/// Lifecycle engine for self-assessments.
pub struct AssessmentService<C, S, B> {
    catalog: Arc<C>,
    store: Arc<S>,
    evidence: EvidenceTracker<C, S, B>,
    reports: ReportProjection<C, S>,
}

impl<C, S, B> AssessmentService<C, S, B>
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    pub fn new(catalog: Arc<C>, store: Arc<S>, blobs: Arc<B>, max_evidence_bytes: usize) -> Self {
        let evidence = EvidenceTracker::new(
            catalog.clone(),
            store.clone(),
            blobs,
            max_evidence_bytes,
        );
        let reports = ReportProjection::new(catalog.clone(), store.clone());
        Self {
            catalog,
            store,
            evidence,
            reports,
        }
    }

    pub fn evidence(&self) -> &EvidenceTracker<C, S, B> {
        &self.evidence
    }

    pub fn reports(&self) -> &ReportProjection<C, S> {
        &self.reports
    }

    /// Resume the organization's pending assessment or start a new one.
    pub fn get_or_create(
        &self,
        organization_id: OrganizationId,
    ) -> Result<GetOrCreateOutcome, AssessmentError> {
        let (assessment, is_new) = self
            .store
            .find_or_create_pending(organization_id, Utc::now())?;

        if is_new {
            info!(
                organization_id = %organization_id,
                assessment_id = %assessment.id,
                "assessment created"
            );
            return Ok(GetOrCreateOutcome {
                assessment,
                answers: Vec::new(),
                is_new,
                message: CREATED_MESSAGE,
            });
        }

        let answers = self.store.list_answers(assessment.id)?;
        debug!(
            organization_id = %organization_id,
            assessment_id = %assessment.id,
            answers = answers.len(),
            "resuming pending assessment"
        );
        Ok(GetOrCreateOutcome {
            assessment,
            answers,
            is_new,
            message: RESUMED_MESSAGE,
        })
    }

    pub fn list_segments(&self) -> Result<Vec<Segment>, AssessmentError> {
        Ok(self.catalog.list_segments()?)
    }

    /// Fix the segment for a pending assessment. Re-selecting the current segment is a no-op;
    /// a different segment is refused once one is set.
    pub fn select_segment(
        &self,
        assessment_id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<Assessment, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        self.catalog
            .find_segment(segment_id)?
            .ok_or_else(|| AssessmentError::not_found("segment", segment_id.0))?;
        ensure_pending(&assessment)?;

        match assessment.segment_id() {
            Some(current) if current == segment_id => Ok(assessment),
            Some(current) => Err(AssessmentError::InvalidState(format!(
                "assessment {assessment_id} already has segment {current}"
            ))),
            None => {
                let updated = self
                    .store
                    .assign_segment(assessment_id, segment_id)
                    .map_err(|err| transition_error(err, assessment_id))?;
                info!(
                    assessment_id = %assessment_id,
                    segment_id = %segment_id,
                    "segment selected"
                );
                Ok(updated)
            }
        }
    }

    pub fn structure(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<AssessmentStructure, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        let segment_id = require_segment(&assessment)?;
        let segment = self
            .catalog
            .find_segment(segment_id)?
            .ok_or_else(|| AssessmentError::not_found("segment", segment_id.0))?;

        let applicable: BTreeSet<IndicatorId> = self
            .catalog
            .list_applicable_indicator_ids(segment_id)?
            .into_iter()
            .collect();
        let selected: BTreeMap<IndicatorId, ResponseLevelId> = self
            .store
            .list_answers(assessment_id)?
            .into_iter()
            .map(|answer| (answer.indicator_id, answer.response_level_id))
            .collect();

        let mut chapters = Vec::new();
        for chapter in self.catalog.list_chapters_ordered()? {
            let mut indicators = Vec::new();
            for indicator in self.catalog.list_indicators_for_chapter(chapter.id)? {
                let levels = self
                    .catalog
                    .list_response_levels_for_indicator(indicator.id)?;
                indicators.push(StructureIndicator {
                    applicable: applicable.contains(&indicator.id),
                    selected_level_id: selected.get(&indicator.id).copied(),
                    levels,
                    indicator,
                });
            }
            chapters.push(StructureChapter {
                chapter,
                indicators,
            });
        }

        Ok(AssessmentStructure {
            assessment_id,
            segment,
            chapters,
        })
    }

    /// Upsert answers in order. A changed level drops the evidence attached to the prior
    /// answer in the same store write; the orphaned blob is removed afterwards.
    pub fn submit_answers(
        &self,
        assessment_id: AssessmentId,
        items: &[AnswerSubmission],
    ) -> Result<Vec<Answer>, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        ensure_pending(&assessment)?;

        for item in items {
            self.catalog
                .find_indicator(item.indicator_id)?
                .ok_or_else(|| AssessmentError::not_found("indicator", item.indicator_id.0))?;
            let level = self
                .catalog
                .find_response_level(item.response_level_id)?
                .ok_or_else(|| {
                    AssessmentError::not_found("response level", item.response_level_id.0)
                })?;
            if level.indicator_id != item.indicator_id {
                return Err(AssessmentError::not_found(
                    "response level",
                    item.response_level_id.0,
                ));
            }
        }

        let mut invalidated = false;
        let mut persisted = Vec::with_capacity(items.len());
        for item in items {
            let upsert = self
                .store
                .upsert_answer(assessment_id, item.indicator_id, item.response_level_id)
                .map_err(|err| transition_error(err, assessment_id))?;
            if let Some(evidence) = &upsert.dropped_evidence {
                self.evidence.discard_blob(evidence);
                invalidated = true;
            }
            persisted.push(upsert.answer);
        }

        if invalidated && assessment.segment_id().is_some() {
            self.evidence.recompute_status(assessment_id)?;
        }

        debug!(
            assessment_id = %assessment_id,
            submitted = persisted.len(),
            invalidated,
            "answers stored"
        );
        Ok(persisted)
    }

    /// Score the assessment and move it to `COMPLETED`.
    ///
    /// The answered indicators must be exactly the segment's applicable set. Score, tier,
    /// and the score snapshot are persisted in one conditional write.
    pub fn complete(&self, assessment_id: AssessmentId) -> Result<Assessment, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        ensure_pending(&assessment)?;
        let segment_id = require_segment(&assessment)?;

        let answers = self.store.list_answers(assessment_id)?;
        if answers.is_empty() {
            return Err(AssessmentError::InvalidState(format!(
                "assessment {assessment_id} has no answers"
            )));
        }

        let max_points = self.catalog.max_points_for_segment(segment_id)?;
        let answered: BTreeSet<IndicatorId> =
            answers.iter().map(|answer| answer.indicator_id).collect();
        let covered = answers.len() == max_points.len()
            && max_points.keys().all(|indicator| answered.contains(indicator));
        if !covered {
            return Err(AssessmentError::Incomplete {
                expected: max_points.len(),
                answered: answers.len(),
            });
        }

        let score = self.store.total_score(assessment_id)?;
        let tiers = self.catalog.list_tiers_for_segment(segment_id)?;
        let tier = select_tier(score, &tiers).map(|tier| tier.to_ref());

        let mut levels = Vec::with_capacity(answers.len());
        for answer in &answers {
            if let Some(level) = self.catalog.find_response_level(answer.response_level_id)? {
                levels.push(level);
            }
        }
        let snapshot = capture_snapshot(&answers, &max_points, &levels);

        let completed = self
            .store
            .complete(
                assessment_id,
                CompletionRecord {
                    final_score: score,
                    tier: tier.clone(),
                    snapshot,
                    finished_at: Utc::now(),
                },
            )
            .map_err(|err| transition_error(err, assessment_id))?;

        info!(
            assessment_id = %assessment_id,
            organization_id = %completed.organization_id,
            score,
            tier = tier.as_ref().map(|tier| tier.name.as_str()).unwrap_or("none"),
            "assessment completed"
        );
        Ok(completed)
    }

    /// Move a pending assessment to `CANCELLED`. Answers and evidence are kept.
    pub fn cancel(&self, assessment_id: AssessmentId) -> Result<Assessment, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        ensure_pending(&assessment)?;
        let cancelled = self
            .store
            .cancel(assessment_id, Utc::now())
            .map_err(|err| transition_error(err, assessment_id))?;
        info!(assessment_id = %assessment_id, "assessment cancelled");
        Ok(cancelled)
    }
}

pub(crate) fn load_assessment<S>(
    store: &S,
    assessment_id: AssessmentId,
) -> Result<Assessment, AssessmentError>
where
    S: AssessmentRepository + ?Sized,
{
    store
        .fetch(assessment_id)?
        .ok_or_else(|| AssessmentError::not_found("assessment", assessment_id.0))
}

fn ensure_pending(assessment: &Assessment) -> Result<(), AssessmentError> {
    if assessment.is_pending() {
        Ok(())
    } else {
        Err(AssessmentError::InvalidState(format!(
            "assessment {} is {}",
            assessment.id,
            assessment.status().label()
        )))
    }
}

fn require_segment(assessment: &Assessment) -> Result<SegmentId, AssessmentError> {
    assessment.segment_id().ok_or_else(|| {
        AssessmentError::InvalidState(format!(
            "assessment {} has no segment selected",
            assessment.id
        ))
    })
}

fn transition_error(err: RepositoryError, assessment_id: AssessmentId) -> AssessmentError {
    match err {
        RepositoryError::Conflict => AssessmentError::InvalidState(format!(
            "assessment {assessment_id} is no longer pending"
        )),
        RepositoryError::NotFound => AssessmentError::not_found("assessment", assessment_id.0),
        other => AssessmentError::Repository(other),
    }
}

/// Error raised by the assessment workflow.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    InvalidState(String),
    #[error("{answered} answers recorded for {expected} applicable indicators")]
    Incomplete { expected: usize, answered: usize },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("failed to build evidence archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl AssessmentError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Machine-readable discriminant used in client error bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            AssessmentError::NotFound { .. } => "not_found",
            AssessmentError::InvalidState(_) => "invalid_state",
            AssessmentError::Incomplete { .. } => "incomplete",
            AssessmentError::Conflict(_) => "conflict",
            AssessmentError::Validation(_) => "validation",
            AssessmentError::Repository(_)
            | AssessmentError::Blob(_)
            | AssessmentError::Archive(_) => "internal",
        }
    }
}
