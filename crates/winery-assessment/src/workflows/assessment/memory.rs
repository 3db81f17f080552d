//! Process-local store used by the API binary, the demo, and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::catalog::CatalogProvider;
use super::domain::{
    Answer, AnswerId, Assessment, AssessmentId, AssessmentState, Evidence, EvidenceId,
    EvidenceStatus, IndicatorId, OrganizationId, ResponseLevelId, SegmentId,
};
use super::repository::{
    AnswerRepository, AnswerUpsert, AssessmentRepository, BlobError, BlobStore,
    CompletionRecord, EvidenceRepository, RepositoryError,
};

#[derive(Debug, Default)]
struct StoreState {
    last_assessment: i64,
    last_answer: i64,
    last_evidence: i64,
    assessments: BTreeMap<AssessmentId, Assessment>,
    answers: BTreeMap<(AssessmentId, IndicatorId), Answer>,
    evidence: BTreeMap<AnswerId, Evidence>,
}

impl StoreState {
    fn pending_mut(&mut self, id: AssessmentId) -> Result<&mut Assessment, RepositoryError> {
        let assessment = self
            .assessments
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if assessment.is_pending() {
            Ok(assessment)
        } else {
            Err(RepositoryError::Conflict)
        }
    }

    fn answers_for(&self, assessment_id: AssessmentId) -> impl Iterator<Item = &Answer> {
        let first = (assessment_id, IndicatorId(i64::MIN));
        let last = (assessment_id, IndicatorId(i64::MAX));
        self.answers.range(first..=last).map(|(_, answer)| answer)
    }

    fn answer_ids_for(&self, assessment_id: AssessmentId) -> Vec<AnswerId> {
        self.answers_for(assessment_id)
            .map(|answer| answer.id)
            .collect()
    }
}

/// Assessment, answer, and evidence rows behind a single lock. Every trait method
/// runs under that lock, which makes pending lookup-and-insert and the terminal
/// transitions atomic.
pub struct InMemoryStore {
    catalog: Arc<dyn CatalogProvider>,
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// The catalog resolves response level points for `total_score`.
    pub fn new(catalog: Arc<dyn CatalogProvider>) -> Self {
        Self {
            catalog,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state.lock().map_err(|_| {
            RepositoryError::Unavailable("assessment store lock poisoned".to_string())
        })
    }
}

impl AssessmentRepository for InMemoryStore {
    fn find_or_create_pending(
        &self,
        organization_id: OrganizationId,
        started_at: DateTime<Utc>,
    ) -> Result<(Assessment, bool), RepositoryError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .assessments
            .values()
            .find(|assessment| {
                assessment.organization_id == organization_id && assessment.is_pending()
            })
        {
            return Ok((existing.clone(), false));
        }

        state.last_assessment += 1;
        let assessment = Assessment::new_pending(
            AssessmentId(state.last_assessment),
            organization_id,
            started_at,
        );
        state.assessments.insert(assessment.id, assessment.clone());
        Ok((assessment, true))
    }

    fn fetch(&self, id: AssessmentId) -> Result<Option<Assessment>, RepositoryError> {
        Ok(self.lock()?.assessments.get(&id).cloned())
    }

    fn assign_segment(
        &self,
        id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<Assessment, RepositoryError> {
        let mut state = self.lock()?;
        let assessment = state.pending_mut(id)?;
        match assessment.segment_id() {
            Some(current) if current == segment_id => return Ok(assessment.clone()),
            Some(_) => return Err(RepositoryError::Conflict),
            None => {}
        }
        assessment.state = AssessmentState::Pending {
            segment_id: Some(segment_id),
        };
        assessment.evidence_status = Some(EvidenceStatus::None);
        Ok(assessment.clone())
    }

    fn update_evidence_status(
        &self,
        id: AssessmentId,
        status: EvidenceStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let assessment = state
            .assessments
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        assessment.evidence_status = Some(status);
        Ok(())
    }

    fn complete(
        &self,
        id: AssessmentId,
        record: CompletionRecord,
    ) -> Result<Assessment, RepositoryError> {
        let mut state = self.lock()?;
        let assessment = state.pending_mut(id)?;
        let segment_id = assessment.segment_id().ok_or_else(|| {
            RepositoryError::Unavailable("completion without segment".to_string())
        })?;
        assessment.state = AssessmentState::Completed {
            segment_id,
            final_score: record.final_score,
            tier: record.tier,
            snapshot: record.snapshot,
            finished_at: record.finished_at,
        };
        Ok(assessment.clone())
    }

    fn cancel(
        &self,
        id: AssessmentId,
        finished_at: DateTime<Utc>,
    ) -> Result<Assessment, RepositoryError> {
        let mut state = self.lock()?;
        let assessment = state.pending_mut(id)?;
        let segment_id = assessment.segment_id();
        assessment.state = AssessmentState::Cancelled {
            segment_id,
            finished_at,
        };
        Ok(assessment.clone())
    }

    fn completed_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Assessment>, RepositoryError> {
        let state = self.lock()?;
        let mut completed: Vec<Assessment> = state
            .assessments
            .values()
            .filter(|assessment| {
                assessment.organization_id == organization_id
                    && matches!(assessment.state, AssessmentState::Completed { .. })
            })
            .cloned()
            .collect();
        completed.sort_by(|a, b| {
            b.finished_at()
                .cmp(&a.finished_at())
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(completed)
    }
}

impl AnswerRepository for InMemoryStore {
    fn upsert_answer(
        &self,
        assessment_id: AssessmentId,
        indicator_id: IndicatorId,
        response_level_id: ResponseLevelId,
    ) -> Result<AnswerUpsert, RepositoryError> {
        let mut state = self.lock()?;
        state.pending_mut(assessment_id)?;

        if let Some(existing) = state.answers.get_mut(&(assessment_id, indicator_id)) {
            let changed = existing.response_level_id != response_level_id;
            existing.response_level_id = response_level_id;
            let answer = existing.clone();
            let dropped_evidence = if changed {
                state.evidence.remove(&answer.id)
            } else {
                None
            };
            return Ok(AnswerUpsert {
                answer,
                dropped_evidence,
            });
        }

        state.last_answer += 1;
        let answer = Answer {
            id: AnswerId(state.last_answer),
            assessment_id,
            indicator_id,
            response_level_id,
        };
        state
            .answers
            .insert((assessment_id, indicator_id), answer.clone());
        Ok(AnswerUpsert {
            answer,
            dropped_evidence: None,
        })
    }

    fn list_answers(&self, assessment_id: AssessmentId) -> Result<Vec<Answer>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.answers_for(assessment_id).cloned().collect())
    }

    fn delete_all_answers(&self, assessment_id: AssessmentId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let answer_ids = state.answer_ids_for(assessment_id);
        for answer_id in answer_ids {
            state.evidence.remove(&answer_id);
        }
        state
            .answers
            .retain(|(owner, _), _| *owner != assessment_id);
        Ok(())
    }

    fn total_score(&self, assessment_id: AssessmentId) -> Result<i32, RepositoryError> {
        let level_ids: Vec<ResponseLevelId> = {
            let state = self.lock()?;
            state
                .answers_for(assessment_id)
                .map(|answer| answer.response_level_id)
                .collect()
        };

        let mut total = 0;
        for level_id in level_ids {
            if let Some(level) = self.catalog.find_response_level(level_id)? {
                total += level.points;
            }
        }
        Ok(total)
    }
}

impl EvidenceRepository for InMemoryStore {
    fn find_by_answer(&self, answer_id: AnswerId) -> Result<Option<Evidence>, RepositoryError> {
        Ok(self.lock()?.evidence.get(&answer_id).cloned())
    }

    fn create_evidence(
        &self,
        answer_id: AnswerId,
        display_name: &str,
        storage_location: &str,
    ) -> Result<Evidence, RepositoryError> {
        let mut state = self.lock()?;
        if state.evidence.contains_key(&answer_id) {
            return Err(RepositoryError::Conflict);
        }
        if !state.answers.values().any(|answer| answer.id == answer_id) {
            return Err(RepositoryError::NotFound);
        }

        state.last_evidence += 1;
        let evidence = Evidence {
            id: EvidenceId(state.last_evidence),
            answer_id,
            display_name: display_name.to_string(),
            storage_location: storage_location.to_string(),
        };
        state.evidence.insert(answer_id, evidence.clone());
        Ok(evidence)
    }

    fn delete_evidence(&self, evidence_id: EvidenceId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let before = state.evidence.len();
        state.evidence.retain(|_, evidence| evidence.id != evidence_id);
        if state.evidence.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn list_for_assessment(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Evidence>, RepositoryError> {
        let state = self.lock()?;
        let mut evidence: Vec<Evidence> = state
            .answer_ids_for(assessment_id)
            .into_iter()
            .filter_map(|answer_id| state.evidence.get(&answer_id).cloned())
            .collect();
        evidence.sort_by_key(|item| item.id);
        Ok(evidence)
    }

    fn count_for_assessment(&self, assessment_id: AssessmentId) -> Result<usize, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .answer_ids_for(assessment_id)
            .iter()
            .filter(|answer_id| state.evidence.contains_key(answer_id))
            .count())
    }
}

/// Blob store keeping documents in memory, keyed by path.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn paths(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self, path: &str) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>, BlobError> {
        self.blobs.lock().map_err(|_| BlobError::Io {
            path: path.to_string(),
            source: std::io::Error::other("blob store lock poisoned"),
        })
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.lock(path)?.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.lock(path)?
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn remove(&self, path: &str) -> Result<(), BlobError> {
        self.lock(path)?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::assessment::catalog::CatalogSnapshot;
    use crate::workflows::assessment::domain::ScoreSnapshot;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(CatalogSnapshot::standard()))
    }

    #[test]
    fn pending_assessment_is_reused() {
        let store = store();
        let (first, created) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        let (second, created_again) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("resume");
        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn upsert_keeps_answer_id_stable() {
        let store = store();
        let (assessment, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        let first = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(11))
            .expect("insert")
            .answer;
        let second = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(13))
            .expect("update")
            .answer;
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_answers(assessment.id).expect("list").len(), 1);
        assert_eq!(store.total_score(assessment.id).expect("score"), 10);
    }

    #[test]
    fn terminal_rows_refuse_transitions() {
        let store = store();
        let (assessment, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        store.cancel(assessment.id, Utc::now()).expect("cancel");
        assert!(matches!(
            store.cancel(assessment.id, Utc::now()),
            Err(RepositoryError::Conflict)
        ));
        assert!(matches!(
            store.assign_segment(assessment.id, SegmentId(1)),
            Err(RepositoryError::Conflict)
        ));
    }

    #[test]
    fn segment_is_fixed_once_assigned() {
        let store = store();
        let (assessment, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        store
            .assign_segment(assessment.id, SegmentId(1))
            .expect("first segment");
        store
            .update_evidence_status(assessment.id, EvidenceStatus::Partial)
            .expect("status");

        assert!(matches!(
            store.assign_segment(assessment.id, SegmentId(2)),
            Err(RepositoryError::Conflict)
        ));
        let same = store
            .assign_segment(assessment.id, SegmentId(1))
            .expect("same segment");
        assert_eq!(same.segment_id(), Some(SegmentId(1)));
        assert_eq!(same.evidence_status, Some(EvidenceStatus::Partial));
    }

    #[test]
    fn answers_are_frozen_after_completion() {
        let store = store();
        let (assessment, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        store
            .assign_segment(assessment.id, SegmentId(1))
            .expect("segment");
        let answer = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(11))
            .expect("answer")
            .answer;
        store
            .create_evidence(answer.id, "plan.pdf", "1/plan.pdf")
            .expect("evidence");
        store
            .complete(
                assessment.id,
                CompletionRecord {
                    final_score: 0,
                    tier: None,
                    snapshot: ScoreSnapshot::default(),
                    finished_at: Utc::now(),
                },
            )
            .expect("complete");

        assert!(matches!(
            store.upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(13)),
            Err(RepositoryError::Conflict)
        ));
        let answers = store.list_answers(assessment.id).expect("list");
        assert_eq!(answers[0].response_level_id, ResponseLevelId(11));
        assert!(store.find_by_answer(answer.id).expect("find").is_some());
    }

    #[test]
    fn level_change_drops_evidence_in_the_same_write() {
        let store = store();
        let (assessment, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        let answer = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(11))
            .expect("answer")
            .answer;
        store
            .create_evidence(answer.id, "plan.pdf", "1/plan.pdf")
            .expect("evidence");

        let unchanged = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(11))
            .expect("same level");
        assert!(unchanged.dropped_evidence.is_none());

        let changed = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(13))
            .expect("new level");
        let dropped = changed.dropped_evidence.expect("dropped evidence");
        assert_eq!(dropped.storage_location, "1/plan.pdf");
        assert!(store.find_by_answer(answer.id).expect("find").is_none());
    }

    #[test]
    fn evidence_is_one_per_answer() {
        let store = store();
        let (assessment, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        let answer = store
            .upsert_answer(assessment.id, IndicatorId(1), ResponseLevelId(11))
            .expect("answer")
            .answer;
        store
            .create_evidence(answer.id, "plan.pdf", "1/plan.pdf")
            .expect("first evidence");
        assert!(matches!(
            store.create_evidence(answer.id, "plan.pdf", "1/plan-2.pdf"),
            Err(RepositoryError::Conflict)
        ));
        assert_eq!(store.count_for_assessment(assessment.id).expect("count"), 1);
    }

    #[test]
    fn delete_all_answers_clears_owned_rows_only() {
        let store = store();
        let (first, _) = store
            .find_or_create_pending(OrganizationId(1), Utc::now())
            .expect("create");
        let (second, _) = store
            .find_or_create_pending(OrganizationId(2), Utc::now())
            .expect("create");
        let answer = store
            .upsert_answer(first.id, IndicatorId(1), ResponseLevelId(11))
            .expect("answer")
            .answer;
        store
            .create_evidence(answer.id, "plan.pdf", "1/plan.pdf")
            .expect("evidence");
        store
            .upsert_answer(second.id, IndicatorId(1), ResponseLevelId(12))
            .expect("answer");

        store.delete_all_answers(first.id).expect("delete");

        assert!(store.list_answers(first.id).expect("list").is_empty());
        assert_eq!(store.count_for_assessment(first.id).expect("count"), 0);
        assert_eq!(store.total_score(first.id).expect("score"), 0);
        assert_eq!(store.list_answers(second.id).expect("list").len(), 1);
    }
}
