use std::sync::Arc;

use super::common::*;
use crate::workflows::assessment::catalog::CatalogSnapshot;
use crate::workflows::assessment::domain::{ChapterId, EvidenceStatus, IndicatorId, OrganizationId};
use crate::workflows::assessment::report::ReportProjection;
use crate::workflows::assessment::repository::AnswerRepository;
use crate::workflows::assessment::AssessmentError;

#[test]
fn history_lists_completed_assessments_newest_first() {
    let Harness { service, .. } = harness();
    let older = completed_assessment(&service, &[(1, 2), (2, 2), (3, 2)]);
    let cancelled = answered_assessment(&service, &[(1, 1)]);
    service.cancel(cancelled).expect("cancel");
    let newer = completed_assessment(&service, &[(1, 3), (2, 3), (3, 3)]);

    let history = service.reports().history(ORG).expect("history");
    let ids: Vec<_> = history.iter().map(|item| item.assessment_id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);

    let latest = &history[0];
    assert_eq!(latest.state, "completed");
    assert_eq!(latest.segment_name.as_deref(), Some("Boutique"));
    assert_eq!(latest.final_score, 120);
    assert_eq!(latest.max_score, 120);
    assert!((latest.percentage - 100.0).abs() < f32::EPSILON);
    assert_eq!(latest.indicators_answered, 3);

    assert!(service
        .reports()
        .history(OrganizationId(7))
        .expect("empty history")
        .is_empty());
}

#[test]
fn detail_requires_completion() {
    let Harness { service, .. } = harness();
    let pending = answered_assessment(&service, &[(1, 2)]);

    assert!(matches!(
        service.reports().detail(pending),
        Err(AssessmentError::InvalidState(_))
    ));
}

#[test]
fn detail_groups_applicable_indicators_by_chapter() {
    let harness = harness();
    let id = answered_assessment(&harness.service, &[(1, 3), (2, 1), (3, 2)]);
    let answer = harness
        .store
        .list_answers(id)
        .expect("answers")
        .into_iter()
        .find(|answer| answer.indicator_id == IndicatorId(3))
        .expect("indicator 3 answer");
    harness
        .service
        .evidence()
        .attach(id, answer.id, "cellar.pdf", &pdf_bytes())
        .expect("attach");
    harness.service.complete(id).expect("complete");

    let detail = harness.service.reports().detail(id).expect("detail");
    assert_eq!(detail.summary.final_score, 70);
    assert_eq!(detail.evidence_status, Some(EvidenceStatus::Partial));

    let chapters: Vec<ChapterId> = detail.chapters.iter().map(|c| c.chapter_id).collect();
    assert_eq!(chapters, vec![ChapterId(1), ChapterId(2)], "community has no applicable indicator");

    let vineyard = &detail.chapters[0];
    assert_eq!(vineyard.obtained_points, 40);
    assert_eq!(vineyard.max_points, 80);
    assert!((vineyard.percentage - 50.0).abs() < f32::EPSILON);
    assert_eq!(vineyard.indicators.len(), 2);
    assert_eq!(vineyard.indicators[1].level_name.as_deref(), Some("Level 1"));
    assert!(!vineyard.indicators[0].has_evidence);

    let cellar = &detail.chapters[1];
    assert_eq!(cellar.indicators[0].obtained_points, 30);
    assert!(cellar.indicators[0].has_evidence);
}

#[test]
fn latest_result_summarizes_newest_completion() {
    let Harness { service, .. } = harness();

    assert!(matches!(
        service.reports().latest_result(ORG),
        Err(AssessmentError::NotFound { .. })
    ));

    completed_assessment(&service, &[(1, 1), (2, 1), (3, 1)]);
    let newest = completed_assessment(&service, &[(1, 2), (2, 2), (3, 2)]);

    let latest = service.reports().latest_result(ORG).expect("latest");
    assert_eq!(latest.assessment_id, newest.id);
    assert_eq!(latest.final_score, 60);
    assert_eq!(latest.tier_name.as_deref(), Some("Medium"));
    assert_eq!(latest.segment_name.as_deref(), Some("Boutique"));
    assert!((latest.percentage - 50.0).abs() < f32::EPSILON);
}

#[test]
fn reports_ignore_later_catalog_edits() {
    let harness = harness();
    let completed = completed_assessment(&harness.service, &[(1, 2), (2, 2), (3, 2)]);

    let mut edited = catalog_parts();
    for level in &mut edited.response_levels {
        level.points *= 2;
    }
    for tier in &mut edited.tiers {
        tier.name = format!("Renamed {}", tier.name);
    }
    let edited = Arc::new(CatalogSnapshot::new(edited).expect("edited catalog validates"));
    let projection = ReportProjection::new(edited, harness.store.clone());

    let detail = projection.detail(completed.id).expect("detail");
    assert_eq!(detail.summary.final_score, 60);
    assert_eq!(detail.summary.max_score, 120);
    assert_eq!(
        detail.summary.tier.map(|tier| tier.name),
        Some("Medium".to_string())
    );
    assert_eq!(detail.chapters[0].indicators[0].max_points, 40);
}
