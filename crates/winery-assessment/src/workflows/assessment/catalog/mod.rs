//! Read-only reference data: segments, chapters, indicators, response levels,
//! per-segment applicability, and sustainability tiers.

mod loader;
mod standard;

use std::collections::{BTreeMap, BTreeSet};

use super::domain::{
    Chapter, ChapterId, Indicator, IndicatorId, ResponseLevel, ResponseLevelId, Segment,
    SegmentId, SustainabilityTier, TierId,
};
use super::repository::RepositoryError;
use super::scoring::overlapping_bands;

pub use loader::load_dir;

/// Lookup contract for reference data. List operations return empty vectors when nothing matches.
pub trait CatalogProvider: Send + Sync {
    fn list_segments(&self) -> Result<Vec<Segment>, RepositoryError>;
    fn find_segment(&self, id: SegmentId) -> Result<Option<Segment>, RepositoryError>;
    fn list_chapters_ordered(&self) -> Result<Vec<Chapter>, RepositoryError>;
    fn list_indicators_for_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<Indicator>, RepositoryError>;
    fn find_indicator(&self, id: IndicatorId) -> Result<Option<Indicator>, RepositoryError>;
    fn list_response_levels_for_indicator(
        &self,
        indicator_id: IndicatorId,
    ) -> Result<Vec<ResponseLevel>, RepositoryError>;
    fn find_response_level(
        &self,
        id: ResponseLevelId,
    ) -> Result<Option<ResponseLevel>, RepositoryError>;
    fn list_applicable_indicator_ids(
        &self,
        segment_id: SegmentId,
    ) -> Result<Vec<IndicatorId>, RepositoryError>;
    /// Tiers in load order; that order is the tie-break for overlapping bands.
    fn list_tiers_for_segment(
        &self,
        segment_id: SegmentId,
    ) -> Result<Vec<SustainabilityTier>, RepositoryError>;

    /// Highest attainable points for each indicator applicable to the segment.
    fn max_points_for_segment(
        &self,
        segment_id: SegmentId,
    ) -> Result<BTreeMap<IndicatorId, i32>, RepositoryError> {
        let mut max_points = BTreeMap::new();
        for indicator_id in self.list_applicable_indicator_ids(segment_id)? {
            let best = self
                .list_response_levels_for_indicator(indicator_id)?
                .iter()
                .map(|level| level.points)
                .max()
                .unwrap_or(0);
            max_points.insert(indicator_id, best);
        }
        Ok(max_points)
    }
}

/// Raw catalog rows prior to validation.
#[derive(Debug, Clone, Default)]
pub struct CatalogParts {
    pub segments: Vec<Segment>,
    pub chapters: Vec<Chapter>,
    pub indicators: Vec<Indicator>,
    pub response_levels: Vec<ResponseLevel>,
    pub applicability: Vec<(SegmentId, IndicatorId)>,
    pub tiers: Vec<SustainabilityTier>,
}

/// Validation failures raised while assembling a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("duplicate {entity} id {id}")]
    DuplicateId { entity: &'static str, id: i64 },
    #[error("{entity} {id} references unknown {target} {target_id}")]
    DanglingReference {
        entity: &'static str,
        id: i64,
        target: &'static str,
        target_id: i64,
    },
    #[error("indicator {indicator} needs at least two response levels, found {found}")]
    TooFewLevels { indicator: IndicatorId, found: usize },
    #[error("tier {tier} has an inverted band [{min_score}, {max_score}]")]
    InvertedTierBand {
        tier: TierId,
        min_score: i32,
        max_score: i32,
    },
}

/// Validated, in-memory catalog.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    segments: Vec<Segment>,
    chapters: Vec<Chapter>,
    indicators: Vec<Indicator>,
    response_levels: Vec<ResponseLevel>,
    applicability: BTreeMap<SegmentId, BTreeSet<IndicatorId>>,
    tiers: Vec<SustainabilityTier>,
}

impl CatalogSnapshot {
    pub fn new(parts: CatalogParts) -> Result<Self, CatalogLoadError> {
        let CatalogParts {
            segments,
            mut chapters,
            mut indicators,
            mut response_levels,
            applicability,
            tiers,
        } = parts;

        let segment_ids = unique_ids("segment", segments.iter().map(|s| s.id.0))?;
        let chapter_ids = unique_ids("chapter", chapters.iter().map(|c| c.id.0))?;
        let indicator_ids = unique_ids("indicator", indicators.iter().map(|i| i.id.0))?;
        unique_ids("response level", response_levels.iter().map(|l| l.id.0))?;
        unique_ids("tier", tiers.iter().map(|t| t.id.0))?;

        for indicator in &indicators {
            ensure_known(
                "indicator",
                indicator.id.0,
                "chapter",
                indicator.chapter_id.0,
                &chapter_ids,
            )?;
        }
        for level in &response_levels {
            ensure_known(
                "response level",
                level.id.0,
                "indicator",
                level.indicator_id.0,
                &indicator_ids,
            )?;
        }
        for tier in &tiers {
            ensure_known(
                "tier",
                tier.id.0,
                "segment",
                tier.segment_id.0,
                &segment_ids,
            )?;
            if tier.min_score > tier.max_score {
                return Err(CatalogLoadError::InvertedTierBand {
                    tier: tier.id,
                    min_score: tier.min_score,
                    max_score: tier.max_score,
                });
            }
        }

        let mut applicable: BTreeMap<SegmentId, BTreeSet<IndicatorId>> = BTreeMap::new();
        for (segment_id, indicator_id) in applicability {
            ensure_known(
                "applicability",
                segment_id.0,
                "segment",
                segment_id.0,
                &segment_ids,
            )?;
            ensure_known(
                "applicability",
                segment_id.0,
                "indicator",
                indicator_id.0,
                &indicator_ids,
            )?;
            applicable.entry(segment_id).or_default().insert(indicator_id);
        }

        for indicator in &indicators {
            let found = response_levels
                .iter()
                .filter(|level| level.indicator_id == indicator.id)
                .count();
            if found < 2 {
                return Err(CatalogLoadError::TooFewLevels {
                    indicator: indicator.id,
                    found,
                });
            }
        }

        chapters.sort_by_key(|chapter| (chapter.order, chapter.id));
        indicators.sort_by_key(|indicator| (indicator.order, indicator.id));
        response_levels.sort_by_key(|level| (level.position, level.id));

        let snapshot = Self {
            segments,
            chapters,
            indicators,
            response_levels,
            applicability: applicable,
            tiers,
        };

        for (segment_id, first, second) in snapshot.tier_overlaps() {
            tracing::warn!(
                segment_id = %segment_id,
                first_tier = %first,
                second_tier = %second,
                "overlapping sustainability tier bands; first match in load order wins"
            );
        }

        Ok(snapshot)
    }

    /// Built-in catalog used when no CSV directory is configured.
    pub fn standard() -> Self {
        standard::standard_catalog()
    }

    /// Overlapping tier pairs per segment, reported at load time.
    pub fn tier_overlaps(&self) -> Vec<(SegmentId, TierId, TierId)> {
        self.segments
            .iter()
            .flat_map(|segment| {
                let tiers: Vec<SustainabilityTier> = self
                    .tiers
                    .iter()
                    .filter(|tier| tier.segment_id == segment.id)
                    .cloned()
                    .collect();
                overlapping_bands(&tiers)
                    .into_iter()
                    .map(move |(first, second)| (segment.id, first, second))
            })
            .collect()
    }

    pub fn indicator_count(&self) -> usize {
        self.indicators.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl CatalogProvider for CatalogSnapshot {
    fn list_segments(&self) -> Result<Vec<Segment>, RepositoryError> {
        Ok(self.segments.clone())
    }

    fn find_segment(&self, id: SegmentId) -> Result<Option<Segment>, RepositoryError> {
        Ok(self.segments.iter().find(|segment| segment.id == id).cloned())
    }

    fn list_chapters_ordered(&self) -> Result<Vec<Chapter>, RepositoryError> {
        Ok(self.chapters.clone())
    }

    fn list_indicators_for_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<Indicator>, RepositoryError> {
        Ok(self
            .indicators
            .iter()
            .filter(|indicator| indicator.chapter_id == chapter_id)
            .cloned()
            .collect())
    }

    fn find_indicator(&self, id: IndicatorId) -> Result<Option<Indicator>, RepositoryError> {
        Ok(self
            .indicators
            .iter()
            .find(|indicator| indicator.id == id)
            .cloned())
    }

    fn list_response_levels_for_indicator(
        &self,
        indicator_id: IndicatorId,
    ) -> Result<Vec<ResponseLevel>, RepositoryError> {
        Ok(self
            .response_levels
            .iter()
            .filter(|level| level.indicator_id == indicator_id)
            .cloned()
            .collect())
    }

    fn find_response_level(
        &self,
        id: ResponseLevelId,
    ) -> Result<Option<ResponseLevel>, RepositoryError> {
        Ok(self
            .response_levels
            .iter()
            .find(|level| level.id == id)
            .cloned())
    }

    fn list_applicable_indicator_ids(
        &self,
        segment_id: SegmentId,
    ) -> Result<Vec<IndicatorId>, RepositoryError> {
        Ok(self
            .applicability
            .get(&segment_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    fn list_tiers_for_segment(
        &self,
        segment_id: SegmentId,
    ) -> Result<Vec<SustainabilityTier>, RepositoryError> {
        Ok(self
            .tiers
            .iter()
            .filter(|tier| tier.segment_id == segment_id)
            .cloned()
            .collect())
    }
}

fn unique_ids(
    entity: &'static str,
    ids: impl Iterator<Item = i64>,
) -> Result<BTreeSet<i64>, CatalogLoadError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogLoadError::DuplicateId { entity, id });
        }
    }
    Ok(seen)
}

fn ensure_known(
    entity: &'static str,
    id: i64,
    target: &'static str,
    target_id: i64,
    known: &BTreeSet<i64>,
) -> Result<(), CatalogLoadError> {
    if known.contains(&target_id) {
        Ok(())
    } else {
        Err(CatalogLoadError::DanglingReference {
            entity,
            id,
            target,
            target_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: i64, indicator: i64, points: i32, position: i32) -> ResponseLevel {
        ResponseLevel {
            id: ResponseLevelId(id),
            indicator_id: IndicatorId(indicator),
            name: format!("level {id}"),
            description: String::new(),
            points,
            position,
        }
    }

    fn parts() -> CatalogParts {
        CatalogParts {
            segments: vec![Segment {
                id: SegmentId(1),
                name: "Micro".to_string(),
                min_tourists: 0,
                max_tourists: Some(500),
            }],
            chapters: vec![
                Chapter {
                    id: ChapterId(2),
                    name: "Water".to_string(),
                    description: String::new(),
                    order: 2,
                },
                Chapter {
                    id: ChapterId(1),
                    name: "Energy".to_string(),
                    description: String::new(),
                    order: 1,
                },
            ],
            indicators: vec![Indicator {
                id: IndicatorId(10),
                chapter_id: ChapterId(1),
                name: "Metering".to_string(),
                description: String::new(),
                order: 1,
            }],
            response_levels: vec![level(101, 10, 5, 2), level(100, 10, 0, 1)],
            applicability: vec![(SegmentId(1), IndicatorId(10))],
            tiers: vec![
                SustainabilityTier {
                    id: TierId(1),
                    segment_id: SegmentId(1),
                    name: "Low".to_string(),
                    min_score: 0,
                    max_score: 3,
                },
                SustainabilityTier {
                    id: TierId(2),
                    segment_id: SegmentId(1),
                    name: "High".to_string(),
                    min_score: 3,
                    max_score: 5,
                },
            ],
        }
    }

    #[test]
    fn orders_chapters_and_levels() {
        let catalog = CatalogSnapshot::new(parts()).expect("catalog validates");
        let chapters = catalog.list_chapters_ordered().expect("chapters");
        assert_eq!(chapters[0].name, "Energy");
        let levels = catalog
            .list_response_levels_for_indicator(IndicatorId(10))
            .expect("levels");
        assert_eq!(levels[0].id, ResponseLevelId(100));
        assert_eq!(levels[1].id, ResponseLevelId(101));
    }

    #[test]
    fn computes_max_points_per_applicable_indicator() {
        let catalog = CatalogSnapshot::new(parts()).expect("catalog validates");
        let max = catalog
            .max_points_for_segment(SegmentId(1))
            .expect("max points");
        assert_eq!(max.get(&IndicatorId(10)), Some(&5));
        assert!(catalog
            .max_points_for_segment(SegmentId(99))
            .expect("max points")
            .is_empty());
    }

    #[test]
    fn reports_overlapping_tiers_without_failing() {
        let catalog = CatalogSnapshot::new(parts()).expect("overlap is a warning");
        assert_eq!(
            catalog.tier_overlaps(),
            vec![(SegmentId(1), TierId(1), TierId(2))]
        );
    }

    #[test]
    fn rejects_dangling_applicability() {
        let mut parts = parts();
        parts.applicability.push((SegmentId(1), IndicatorId(77)));
        match CatalogSnapshot::new(parts) {
            Err(CatalogLoadError::DanglingReference {
                target, target_id, ..
            }) => {
                assert_eq!(target, "indicator");
                assert_eq!(target_id, 77);
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn rejects_single_level_indicator() {
        let mut parts = parts();
        parts.response_levels.pop();
        assert!(matches!(
            CatalogSnapshot::new(parts),
            Err(CatalogLoadError::TooFewLevels { found: 1, .. })
        ));
    }

    #[test]
    fn rejects_inverted_band() {
        let mut parts = parts();
        parts.tiers[0].min_score = 10;
        assert!(matches!(
            CatalogSnapshot::new(parts),
            Err(CatalogLoadError::InvertedTierBand { .. })
        ));
    }

    #[test]
    fn standard_catalog_is_consistent() {
        let catalog = CatalogSnapshot::standard();
        assert!(catalog.segment_count() >= 2);
        assert!(catalog.tier_overlaps().is_empty());
        for segment in catalog.list_segments().expect("segments") {
            assert!(!catalog
                .list_applicable_indicator_ids(segment.id)
                .expect("applicability")
                .is_empty());
            assert!(!catalog
                .list_tiers_for_segment(segment.id)
                .expect("tiers")
                .is_empty());
        }
    }
}
