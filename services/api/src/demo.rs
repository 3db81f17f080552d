use crate::infra::load_catalog;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use winery_assessment::config::CatalogConfig;
use winery_assessment::error::AppError;
use winery_assessment::workflows::assessment::{
    AnswerSubmission, AssessmentError, AssessmentService, CatalogProvider, CatalogSnapshot,
    DetailedResult, InMemoryStore, MemoryBlobStore, OrganizationId, SegmentId,
    StructureIndicator, DEFAULT_MAX_EVIDENCE_BYTES,
};

const SAMPLE_EVIDENCE: &[u8] = b"%PDF-1.4\n% sample sustainability plan\n";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Organization id to run the assessment for
    #[arg(long, default_value_t = 1)]
    pub(crate) organization: i64,
    /// Segment id to select (defaults to the first catalog segment)
    #[arg(long)]
    pub(crate) segment: Option<i64>,
    /// Answer every indicator with its highest-scoring level
    #[arg(long)]
    pub(crate) best_practice: bool,
    /// Print the detailed result as JSON instead of a text summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct CatalogCheckArgs {
    /// Directory holding the catalog CSV files (defaults to the built-in catalog)
    #[arg(long)]
    pub(crate) dir: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let catalog = Arc::new(CatalogSnapshot::standard());
    let store = Arc::new(InMemoryStore::new(catalog.clone()));
    let service = AssessmentService::new(
        catalog.clone(),
        store,
        Arc::new(MemoryBlobStore::default()),
        DEFAULT_MAX_EVIDENCE_BYTES,
    );

    let organization = OrganizationId(args.organization);
    let outcome = service.get_or_create(organization)?;
    let id = outcome.assessment.id;
    println!("Winery self-assessment demo");
    println!("  assessment {id} for organization {organization}: {}", outcome.message);

    let segment = match args.segment {
        Some(segment) => SegmentId(segment),
        None => catalog
            .list_segments()
            .map_err(AssessmentError::from)?
            .first()
            .map(|segment| segment.id)
            .ok_or_else(|| AssessmentError::not_found("segment", 0))?,
    };
    service.select_segment(id, segment)?;

    let structure = service.structure(id)?;
    println!("  segment: {}", structure.segment.name);
    let submissions: Vec<AnswerSubmission> = structure
        .chapters
        .iter()
        .flat_map(|chapter| chapter.indicators.iter())
        .filter(|indicator| indicator.applicable)
        .enumerate()
        .filter_map(|(index, indicator)| choose_level(indicator, index, args.best_practice))
        .collect();
    let answers = service.submit_answers(id, &submissions)?;
    println!("  answered {} applicable indicators", answers.len());

    if let Some(first) = answers.first() {
        let evidence =
            service
                .evidence()
                .attach(id, first.id, "sustainability-plan.pdf", SAMPLE_EVIDENCE)?;
        println!("  evidence stored at {}", evidence.storage_location);
    }

    service.complete(id)?;
    let detail = service.reports().detail(id)?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&detail).map_err(std::io::Error::from)?;
        println!("{rendered}");
    } else {
        render_detail(&detail);
    }

    let next = service.get_or_create(organization)?;
    println!(
        "\nNext assessment {} is ready (new: {})",
        next.assessment.id, next.is_new
    );
    Ok(())
}

pub(crate) fn run_catalog_check(args: CatalogCheckArgs) -> Result<(), AppError> {
    let source = args
        .dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "built-in catalog".to_string());
    let catalog = load_catalog(&CatalogConfig { dir: args.dir })?;

    println!("Catalog check: {source}");
    println!("  segments:   {}", catalog.segment_count());
    println!("  indicators: {}", catalog.indicator_count());

    let overlaps = catalog.tier_overlaps();
    if overlaps.is_empty() {
        println!("  tier bands: no overlaps");
    } else {
        for (segment, first, second) in overlaps {
            println!("  tier bands: segment {segment} tiers {first} and {second} overlap");
        }
    }
    Ok(())
}

/// Cycles through levels so the sample lands mid-table unless best practice is requested.
fn choose_level(
    indicator: &StructureIndicator,
    index: usize,
    best_practice: bool,
) -> Option<AnswerSubmission> {
    let level = if best_practice {
        indicator.levels.iter().max_by_key(|level| level.points)
    } else {
        indicator.levels.get(index % indicator.levels.len().max(1))
    }?;
    Some(AnswerSubmission {
        indicator_id: indicator.indicator.id,
        response_level_id: level.id,
    })
}

fn render_detail(detail: &DetailedResult) {
    let summary = &detail.summary;
    println!(
        "\nResult: {}/{} points ({:.1}%)",
        summary.final_score, summary.max_score, summary.percentage
    );
    match &summary.tier {
        Some(tier) => println!("Tier: {}", tier.name),
        None => println!("Tier: none configured"),
    }
    if let Some(status) = detail.evidence_status {
        println!("Evidence: {}", status.label());
    }

    for chapter in &detail.chapters {
        println!(
            "\n{} - {}/{} ({:.1}%)",
            chapter.name, chapter.obtained_points, chapter.max_points, chapter.percentage
        );
        for indicator in &chapter.indicators {
            let marker = if indicator.has_evidence { " [evidence]" } else { "" };
            println!(
                "  - {}: {} ({}/{}){marker}",
                indicator.name,
                indicator.level_name.as_deref().unwrap_or("unanswered"),
                indicator.obtained_points,
                indicator.max_points
            );
        }
    }
}
