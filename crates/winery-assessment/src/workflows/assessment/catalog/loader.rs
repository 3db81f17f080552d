use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::{CatalogLoadError, CatalogParts, CatalogSnapshot};
use crate::workflows::assessment::domain::{
    Chapter, ChapterId, Indicator, IndicatorId, ResponseLevel, ResponseLevelId, Segment,
    SegmentId, SustainabilityTier, TierId,
};

pub const SEGMENTS_FILE: &str = "segments.csv";
pub const CHAPTERS_FILE: &str = "chapters.csv";
pub const INDICATORS_FILE: &str = "indicators.csv";
pub const RESPONSE_LEVELS_FILE: &str = "response_levels.csv";
pub const APPLICABILITY_FILE: &str = "applicability.csv";
pub const TIERS_FILE: &str = "tiers.csv";

/// Loads and validates a catalog from a directory holding one CSV file per entity.
pub fn load_dir(dir: &Path) -> Result<CatalogSnapshot, CatalogLoadError> {
    let segments = read_file::<SegmentRow>(dir, SEGMENTS_FILE)?;
    let chapters = read_file::<ChapterRow>(dir, CHAPTERS_FILE)?;
    let indicators = read_file::<IndicatorRow>(dir, INDICATORS_FILE)?;
    let response_levels = read_file::<ResponseLevelRow>(dir, RESPONSE_LEVELS_FILE)?;
    let applicability = read_file::<ApplicabilityRow>(dir, APPLICABILITY_FILE)?;
    let tiers = read_file::<TierRow>(dir, TIERS_FILE)?;

    let snapshot = CatalogSnapshot::new(CatalogParts {
        segments: segments.into_iter().map(Into::into).collect(),
        chapters: chapters.into_iter().map(Into::into).collect(),
        indicators: indicators.into_iter().map(Into::into).collect(),
        response_levels: response_levels.into_iter().map(Into::into).collect(),
        applicability: applicability
            .into_iter()
            .map(|row| (SegmentId(row.segment_id), IndicatorId(row.indicator_id)))
            .collect(),
        tiers: tiers.into_iter().map(Into::into).collect(),
    })?;

    tracing::info!(
        path = %dir.display(),
        segments = snapshot.segment_count(),
        indicators = snapshot.indicator_count(),
        "catalog loaded"
    );

    Ok(snapshot)
}

fn read_file<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Vec<T>, CatalogLoadError> {
    let path = dir.join(name);
    let file = File::open(&path).map_err(|source| CatalogLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_rows(file).map_err(|source| CatalogLoadError::Csv {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn parse_rows<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader.deserialize::<T>().collect()
}

#[derive(Debug, Deserialize)]
struct SegmentRow {
    id: i64,
    name: String,
    min_tourists: i32,
    #[serde(default, deserialize_with = "empty_as_none")]
    max_tourists: Option<i32>,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Segment {
            id: SegmentId(row.id),
            name: row.name,
            min_tourists: row.min_tourists,
            max_tourists: row.max_tourists,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChapterRow {
    id: i64,
    name: String,
    #[serde(default)]
    description: String,
    order: i32,
}

impl From<ChapterRow> for Chapter {
    fn from(row: ChapterRow) -> Self {
        Chapter {
            id: ChapterId(row.id),
            name: row.name,
            description: row.description,
            order: row.order,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndicatorRow {
    id: i64,
    chapter_id: i64,
    name: String,
    #[serde(default)]
    description: String,
    order: i32,
}

impl From<IndicatorRow> for Indicator {
    fn from(row: IndicatorRow) -> Self {
        Indicator {
            id: IndicatorId(row.id),
            chapter_id: ChapterId(row.chapter_id),
            name: row.name,
            description: row.description,
            order: row.order,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseLevelRow {
    id: i64,
    indicator_id: i64,
    name: String,
    #[serde(default)]
    description: String,
    points: i32,
    position: i32,
}

impl From<ResponseLevelRow> for ResponseLevel {
    fn from(row: ResponseLevelRow) -> Self {
        ResponseLevel {
            id: ResponseLevelId(row.id),
            indicator_id: IndicatorId(row.indicator_id),
            name: row.name,
            description: row.description,
            points: row.points,
            position: row.position,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApplicabilityRow {
    segment_id: i64,
    indicator_id: i64,
}

#[derive(Debug, Deserialize)]
struct TierRow {
    id: i64,
    segment_id: i64,
    name: String,
    min_score: i32,
    max_score: i32,
}

impl From<TierRow> for SustainabilityTier {
    fn from(row: TierRow) -> Self {
        SustainabilityTier {
            id: TierId(row.id),
            segment_id: SegmentId(row.segment_id),
            name: row.name,
            min_score: row.min_score,
            max_score: row.max_score,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
