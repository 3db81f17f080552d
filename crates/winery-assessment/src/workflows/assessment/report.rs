//! Read-only result views over completed assessments.
//!
//! Points, maxima, and tier bands come from the score snapshot captured at completion.
//! The live catalog only supplies display names and ordering.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::CatalogProvider;
use super::domain::{
    percentage, AnswerId, Assessment, AssessmentId, ChapterId, EvidenceStatus, IndicatorId,
    OrganizationId, ScoreSnapshot, SegmentId, TierId,
};
use super::repository::AssessmentStore;
use super::service::{load_assessment, AssessmentError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierSummary {
    pub id: TierId,
    pub name: String,
}

/// One completed assessment in an organization's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub assessment_id: AssessmentId,
    pub organization_id: OrganizationId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: &'static str,
    pub segment_id: Option<SegmentId>,
    pub segment_name: Option<String>,
    pub final_score: i32,
    pub max_score: i32,
    pub percentage: f32,
    pub tier: Option<TierSummary>,
    pub indicators_answered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResult {
    pub indicator_id: IndicatorId,
    pub name: String,
    pub obtained_points: i32,
    pub max_points: i32,
    pub level_name: Option<String>,
    pub level_description: Option<String>,
    pub has_evidence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterResult {
    pub chapter_id: ChapterId,
    pub name: String,
    pub obtained_points: i32,
    pub max_points: i32,
    pub percentage: f32,
    pub indicators_answered: usize,
    pub indicators: Vec<IndicatorResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedResult {
    #[serde(flatten)]
    pub summary: HistoryItem,
    pub evidence_status: Option<EvidenceStatus>,
    pub chapters: Vec<ChapterResult>,
}

/// Condensed view of the newest completed assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestResult {
    pub assessment_id: AssessmentId,
    pub finished_at: Option<DateTime<Utc>>,
    pub final_score: i32,
    pub max_score: i32,
    pub percentage: f32,
    pub segment_name: Option<String>,
    pub tier_name: Option<String>,
}

pub struct ReportProjection<C, S> {
    catalog: Arc<C>,
    store: Arc<S>,
}

impl<C, S> ReportProjection<C, S>
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
{
    pub fn new(catalog: Arc<C>, store: Arc<S>) -> Self {
        Self { catalog, store }
    }

    /// Completed assessments for the organization, newest first.
    pub fn history(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<HistoryItem>, AssessmentError> {
        self.store
            .completed_for_organization(organization_id)?
            .iter()
            .map(|assessment| self.summarize(assessment))
            .collect()
    }

    /// Per-chapter breakdown of one completed assessment.
    pub fn detail(&self, assessment_id: AssessmentId) -> Result<DetailedResult, AssessmentError> {
        let assessment = load_assessment(self.store.as_ref(), assessment_id)?;
        let snapshot = completed_snapshot(&assessment)?;
        let summary = self.summarize(&assessment)?;

        let with_evidence: BTreeSet<AnswerId> = self
            .store
            .list_for_assessment(assessment_id)?
            .into_iter()
            .map(|evidence| evidence.answer_id)
            .collect();
        let answered_with_evidence: BTreeSet<IndicatorId> = self
            .store
            .list_answers(assessment_id)?
            .into_iter()
            .filter(|answer| with_evidence.contains(&answer.id))
            .map(|answer| answer.indicator_id)
            .collect();

        let mut chapters = Vec::new();
        for chapter in self.catalog.list_chapters_ordered()? {
            let mut indicators = Vec::new();
            for indicator in self.catalog.list_indicators_for_chapter(chapter.id)? {
                let Some(line) = snapshot.line_for(indicator.id) else {
                    continue;
                };
                let level = self.catalog.find_response_level(line.response_level_id)?;
                indicators.push(IndicatorResult {
                    indicator_id: indicator.id,
                    name: indicator.name,
                    obtained_points: line.points,
                    max_points: line.max_points,
                    level_name: level.as_ref().map(|level| level.name.clone()),
                    level_description: level.map(|level| level.description),
                    has_evidence: answered_with_evidence.contains(&indicator.id),
                });
            }
            if indicators.is_empty() {
                continue;
            }

            let obtained: i32 = indicators.iter().map(|row| row.obtained_points).sum();
            let max: i32 = indicators.iter().map(|row| row.max_points).sum();
            chapters.push(ChapterResult {
                chapter_id: chapter.id,
                name: chapter.name,
                obtained_points: obtained,
                max_points: max,
                percentage: percentage(obtained, max),
                indicators_answered: indicators.len(),
                indicators,
            });
        }

        Ok(DetailedResult {
            summary,
            evidence_status: assessment.evidence_status,
            chapters,
        })
    }

    pub fn latest_result(
        &self,
        organization_id: OrganizationId,
    ) -> Result<LatestResult, AssessmentError> {
        let latest = self
            .store
            .completed_for_organization(organization_id)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AssessmentError::not_found(
                    "completed assessment for organization",
                    organization_id.0,
                )
            })?;
        let summary = self.summarize(&latest)?;

        Ok(LatestResult {
            assessment_id: summary.assessment_id,
            finished_at: summary.finished_at,
            final_score: summary.final_score,
            max_score: summary.max_score,
            percentage: summary.percentage,
            segment_name: summary.segment_name,
            tier_name: summary.tier.map(|tier| tier.name),
        })
    }

    fn summarize(&self, assessment: &Assessment) -> Result<HistoryItem, AssessmentError> {
        let snapshot = completed_snapshot(assessment)?;
        let final_score = assessment.final_score().unwrap_or_default();
        let segment_name = match assessment.segment_id() {
            Some(segment_id) => self
                .catalog
                .find_segment(segment_id)?
                .map(|segment| segment.name),
            None => None,
        };

        Ok(HistoryItem {
            assessment_id: assessment.id,
            organization_id: assessment.organization_id,
            started_at: assessment.started_at,
            finished_at: assessment.finished_at(),
            state: assessment.status().label(),
            segment_id: assessment.segment_id(),
            segment_name,
            final_score,
            max_score: snapshot.max_score,
            percentage: snapshot.percentage_of(final_score),
            tier: assessment.tier().map(|tier| TierSummary {
                id: tier.id,
                name: tier.name.clone(),
            }),
            indicators_answered: snapshot.lines.len(),
        })
    }
}

fn completed_snapshot(assessment: &Assessment) -> Result<&ScoreSnapshot, AssessmentError> {
    assessment.snapshot().ok_or_else(|| {
        AssessmentError::InvalidState(format!(
            "assessment {} is {}; results exist only once completed",
            assessment.id,
            assessment.status().label()
        ))
    })
}
