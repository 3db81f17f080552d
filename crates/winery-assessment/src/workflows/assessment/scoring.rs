use std::collections::BTreeMap;

use super::domain::{
    Answer, IndicatorId, ResponseLevel, ScoreLine, ScoreSnapshot, SustainabilityTier, TierId,
};

/// Picks the tier for a final score.
///
/// The first band containing the score wins. Scores above every band land in the band
/// with the greatest `min_score` not exceeding the score, and scores below every band
/// fall back to the first tier. Returns `None` only when no tiers are configured.
pub fn select_tier(score: i32, tiers: &[SustainabilityTier]) -> Option<&SustainabilityTier> {
    if let Some(tier) = tiers.iter().find(|tier| tier.contains(score)) {
        return Some(tier);
    }

    tiers
        .iter()
        .filter(|tier| tier.min_score <= score)
        .max_by_key(|tier| tier.min_score)
        .or_else(|| tiers.first())
}

/// Pairs of tiers whose bands share at least one score, in load order.
pub fn overlapping_bands(tiers: &[SustainabilityTier]) -> Vec<(TierId, TierId)> {
    let mut overlaps = Vec::new();
    for (index, first) in tiers.iter().enumerate() {
        for second in &tiers[index + 1..] {
            if first.min_score <= second.max_score && second.min_score <= first.max_score {
                overlaps.push((first.id, second.id));
            }
        }
    }
    overlaps
}

/// Freezes the per-indicator points of the applicable answers at completion time.
///
/// `max_points` maps each applicable indicator to its best attainable points and
/// `levels` resolves the answered response levels.
pub fn capture_snapshot(
    answers: &[Answer],
    max_points: &BTreeMap<IndicatorId, i32>,
    levels: &[ResponseLevel],
) -> ScoreSnapshot {
    let lines = answers
        .iter()
        .filter_map(|answer| {
            let max = *max_points.get(&answer.indicator_id)?;
            let points = levels
                .iter()
                .find(|level| level.id == answer.response_level_id)
                .map(|level| level.points)
                .unwrap_or(0);
            Some(ScoreLine {
                indicator_id: answer.indicator_id,
                response_level_id: answer.response_level_id,
                points,
                max_points: max,
            })
        })
        .collect::<Vec<_>>();

    ScoreSnapshot {
        lines,
        max_score: max_points.values().sum(),
    }
}
