use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};
use winery_assessment::config::{CatalogConfig, EvidenceConfig};
use winery_assessment::error::AppError;
use winery_assessment::workflows::assessment::{
    load_dir, AssessmentService, CatalogSnapshot, FsBlobStore, InMemoryStore,
};

pub(crate) type ServerService = AssessmentService<CatalogSnapshot, InMemoryStore, FsBlobStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Reads the configured catalog directory, falling back to the built-in catalog.
pub(crate) fn load_catalog(config: &CatalogConfig) -> Result<CatalogSnapshot, AppError> {
    let catalog = match &config.dir {
        Some(dir) => load_dir(dir)?,
        None => {
            info!("no catalog directory configured; using built-in catalog");
            CatalogSnapshot::standard()
        }
    };

    for (segment, first, second) in catalog.tier_overlaps() {
        warn!(%segment, %first, %second, "tier bands overlap; the earlier tier wins");
    }

    Ok(catalog)
}

pub(crate) fn build_service(
    config: &EvidenceConfig,
    catalog: CatalogSnapshot,
) -> Arc<ServerService> {
    let catalog = Arc::new(catalog);
    let store = Arc::new(InMemoryStore::new(catalog.clone()));
    let blobs = Arc::new(FsBlobStore::new(config.root.clone()));
    Arc::new(AssessmentService::new(
        catalog,
        store,
        blobs,
        config.max_bytes,
    ))
}
