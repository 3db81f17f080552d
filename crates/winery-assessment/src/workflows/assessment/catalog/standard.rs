use std::collections::{BTreeMap, BTreeSet};

use super::{CatalogParts, CatalogSnapshot};
use crate::workflows::assessment::domain::{
    Chapter, ChapterId, Indicator, IndicatorId, ResponseLevel, ResponseLevelId, Segment,
    SegmentId, SustainabilityTier, TierId,
};

static CHAPTERS: [(i64, &str, &str); 4] = [
    (1, "Vineyard management", "Soil, biodiversity and agrochemical practices."),
    (2, "Water", "Consumption, reuse and effluent treatment."),
    (3, "Energy", "Efficiency and renewable generation."),
    (4, "People and community", "Working conditions and local engagement."),
];

static INDICATORS: [(i64, i64, &str, &str); 8] = [
    (1, 1, "Soil cover", "Permanent or seasonal cover crops between rows."),
    (2, 1, "Integrated pest management", "Monitoring-driven, reduced agrochemical use."),
    (3, 2, "Water metering", "Metered consumption per process stage."),
    (4, 2, "Effluent treatment", "Winery effluent treated before discharge."),
    (5, 3, "Energy audit", "Periodic audit with tracked improvement actions."),
    (6, 3, "Renewable supply", "Share of energy from renewable sources."),
    (7, 4, "Occupational safety", "Documented safety plan and training."),
    (8, 4, "Community programs", "Partnerships with local schools and producers."),
];

static LEVELS: [(&str, &str, i32); 3] = [
    ("Not started", "No practice in place.", 0),
    ("In progress", "Practice partially implemented or undocumented.", 5),
    ("Established", "Practice implemented, documented and reviewed.", 10),
];

// (segment, name, min tourists, max tourists, applicable indicators, tier bands)
type SegmentSeed = (i64, &'static str, i32, Option<i32>, &'static [i64], [(i32, i32); 3]);

static SEGMENTS: [SegmentSeed; 3] = [
    (1, "Micro winery", 0, Some(2_000), &[1, 3, 5, 7, 8], [(0, 19), (20, 39), (40, 50)]),
    (2, "Small winery", 2_001, Some(10_000), &[1, 2, 3, 5, 6, 7], [(0, 24), (25, 44), (45, 60)]),
    (3, "Large winery", 10_001, None, &[1, 2, 3, 4, 5, 6, 7, 8], [(0, 31), (32, 59), (60, 80)]),
];

static TIER_NAMES: [&str; 3] = ["Initial", "Committed", "Leading"];

pub(super) fn standard_parts() -> CatalogParts {
    let chapters = CHAPTERS
        .iter()
        .map(|(id, name, description)| Chapter {
            id: ChapterId(*id),
            name: name.to_string(),
            description: description.to_string(),
            order: *id as i32,
        })
        .collect();

    let indicators = INDICATORS
        .iter()
        .map(|(id, chapter, name, description)| Indicator {
            id: IndicatorId(*id),
            chapter_id: ChapterId(*chapter),
            name: name.to_string(),
            description: description.to_string(),
            order: *id as i32,
        })
        .collect();

    let response_levels = INDICATORS
        .iter()
        .flat_map(|(indicator, ..)| {
            LEVELS
                .iter()
                .enumerate()
                .map(move |(position, (name, description, points))| ResponseLevel {
                    id: ResponseLevelId(indicator * 10 + position as i64 + 1),
                    indicator_id: IndicatorId(*indicator),
                    name: name.to_string(),
                    description: description.to_string(),
                    points: *points,
                    position: position as i32 + 1,
                })
        })
        .collect();

    let mut segments = Vec::new();
    let mut applicability = Vec::new();
    let mut tiers = Vec::new();
    for (id, name, min_tourists, max_tourists, applicable, bands) in SEGMENTS {
        segments.push(Segment {
            id: SegmentId(id),
            name: name.to_string(),
            min_tourists,
            max_tourists,
        });
        applicability.extend(
            applicable
                .iter()
                .map(|indicator| (SegmentId(id), IndicatorId(*indicator))),
        );
        for (index, (min_score, max_score)) in bands.iter().enumerate() {
            tiers.push(SustainabilityTier {
                id: TierId(id * 10 + index as i64 + 1),
                segment_id: SegmentId(id),
                name: TIER_NAMES[index].to_string(),
                min_score: *min_score,
                max_score: *max_score,
            });
        }
    }

    CatalogParts {
        segments,
        chapters,
        indicators,
        response_levels,
        applicability,
        tiers,
    }
}

/// Assembles the seed data directly; it is already ordered and known to validate.
pub(super) fn standard_catalog() -> CatalogSnapshot {
    let parts = standard_parts();
    let mut applicability: BTreeMap<SegmentId, BTreeSet<IndicatorId>> = BTreeMap::new();
    for (segment_id, indicator_id) in parts.applicability {
        applicability.entry(segment_id).or_default().insert(indicator_id);
    }

    CatalogSnapshot {
        segments: parts.segments,
        chapters: parts.chapters,
        indicators: parts.indicators,
        response_levels: parts.response_levels,
        applicability,
        tiers: parts.tiers,
    }
}
