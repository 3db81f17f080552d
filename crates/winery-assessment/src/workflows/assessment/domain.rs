use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

identifier!(
    /// Externally owned winery identity; the core only keeps its id.
    OrganizationId
);
identifier!(AssessmentId);
identifier!(SegmentId);
identifier!(ChapterId);
identifier!(IndicatorId);
identifier!(ResponseLevelId);
identifier!(TierId);
identifier!(AnswerId);
identifier!(EvidenceId);

/// Market-size category that decides which indicators apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub min_tourists: i32,
    pub max_tourists: Option<i32>,
}

/// Named score band assigned to a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SustainabilityTier {
    pub id: TierId,
    pub segment_id: SegmentId,
    pub name: String,
    pub min_score: i32,
    pub max_score: i32,
}

impl SustainabilityTier {
    pub fn contains(&self, score: i32) -> bool {
        score >= self.min_score && score <= self.max_score
    }

    pub fn to_ref(&self) -> TierRef {
        TierRef {
            id: self.id,
            name: self.name.clone(),
            min_score: self.min_score,
            max_score: self.max_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub name: String,
    pub description: String,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: IndicatorId,
    pub chapter_id: ChapterId,
    pub name: String,
    pub description: String,
    pub order: i32,
}

/// One selectable answer to an indicator; `points` feeds the final score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseLevel {
    pub id: ResponseLevelId,
    pub indicator_id: IndicatorId,
    pub name: String,
    pub description: String,
    pub points: i32,
    pub position: i32,
}

/// Coarse evidence coverage persisted onto the assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStatus {
    None,
    Partial,
    Complete,
}

impl EvidenceStatus {
    /// `applicable` indicators in scope, `with_evidence` of them backed by a file.
    pub const fn compute(applicable: usize, with_evidence: usize) -> Self {
        if with_evidence == 0 {
            Self::None
        } else if with_evidence == applicable && applicable > 0 {
            Self::Complete
        } else {
            Self::Partial
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EvidenceStatus::None => "none",
            EvidenceStatus::Partial => "partial",
            EvidenceStatus::Complete => "complete",
        }
    }
}

/// Tier band as it stood when the assessment was completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRef {
    pub id: TierId,
    pub name: String,
    pub min_score: i32,
    pub max_score: i32,
}

/// Points captured per applicable indicator at completion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub indicator_id: IndicatorId,
    pub response_level_id: ResponseLevelId,
    pub points: i32,
    pub max_points: i32,
}

/// Frozen scoring inputs so later catalog edits cannot rewrite history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub lines: Vec<ScoreLine>,
    pub max_score: i32,
}

impl ScoreSnapshot {
    pub fn line_for(&self, indicator_id: IndicatorId) -> Option<&ScoreLine> {
        self.lines
            .iter()
            .find(|line| line.indicator_id == indicator_id)
    }

    pub fn percentage_of(&self, score: i32) -> f32 {
        percentage(score, self.max_score)
    }
}

pub(crate) fn percentage(obtained: i32, maximum: i32) -> f32 {
    if maximum <= 0 {
        return 0.0;
    }
    (obtained as f32 / maximum as f32) * 100.0
}

/// Lifecycle state. Terminal variants carry the fields that only exist once finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentState {
    Pending {
        segment_id: Option<SegmentId>,
    },
    Completed {
        segment_id: SegmentId,
        final_score: i32,
        tier: Option<TierRef>,
        snapshot: ScoreSnapshot,
        finished_at: DateTime<Utc>,
    },
    Cancelled {
        segment_id: Option<SegmentId>,
        finished_at: DateTime<Utc>,
    },
}

/// Flat status discriminant for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentStatus {
    Pending,
    Completed,
    Cancelled,
}

impl AssessmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AssessmentStatus::Pending => "pending",
            AssessmentStatus::Completed => "completed",
            AssessmentStatus::Cancelled => "cancelled",
        }
    }
}

/// One self-assessment attempt by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub organization_id: OrganizationId,
    pub started_at: DateTime<Utc>,
    pub evidence_status: Option<EvidenceStatus>,
    #[serde(flatten)]
    pub state: AssessmentState,
}

impl Assessment {
    pub fn new_pending(
        id: AssessmentId,
        organization_id: OrganizationId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organization_id,
            started_at,
            evidence_status: None,
            state: AssessmentState::Pending { segment_id: None },
        }
    }

    pub fn status(&self) -> AssessmentStatus {
        match self.state {
            AssessmentState::Pending { .. } => AssessmentStatus::Pending,
            AssessmentState::Completed { .. } => AssessmentStatus::Completed,
            AssessmentState::Cancelled { .. } => AssessmentStatus::Cancelled,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, AssessmentState::Pending { .. })
    }

    pub fn segment_id(&self) -> Option<SegmentId> {
        match &self.state {
            AssessmentState::Pending { segment_id } => *segment_id,
            AssessmentState::Completed { segment_id, .. } => Some(*segment_id),
            AssessmentState::Cancelled { segment_id, .. } => *segment_id,
        }
    }

    pub fn final_score(&self) -> Option<i32> {
        match &self.state {
            AssessmentState::Completed { final_score, .. } => Some(*final_score),
            _ => None,
        }
    }

    pub fn tier(&self) -> Option<&TierRef> {
        match &self.state {
            AssessmentState::Completed { tier, .. } => tier.as_ref(),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&ScoreSnapshot> {
        match &self.state {
            AssessmentState::Completed { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            AssessmentState::Pending { .. } => None,
            AssessmentState::Completed { finished_at, .. }
            | AssessmentState::Cancelled { finished_at, .. } => Some(*finished_at),
        }
    }
}

/// Selected response for one indicator; unique per (assessment, indicator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub assessment_id: AssessmentId,
    pub indicator_id: IndicatorId,
    pub response_level_id: ResponseLevelId,
}

/// Supporting document certifying one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub answer_id: AnswerId,
    pub display_name: String,
    pub storage_location: String,
}

/// Caller-provided answer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub indicator_id: IndicatorId,
    pub response_level_id: ResponseLevelId,
}
