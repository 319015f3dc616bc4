use chrono::Utc;
use polio_metrics::MetricsService;
use polio_models::{FeatureCollection, PolioError, RefreshSummary};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument};

use crate::merge;
use crate::sources::{BoundarySource, CountrySource, BOUNDARY_SOURCE, WORDPRESS_SOURCE};

/// Holds the merged dataset and knows how to rebuild it from the sources.
pub struct PolioService {
    countries: Arc<dyn CountrySource>,
    boundaries: Arc<dyn BoundarySource>,
    metrics: Arc<MetricsService>,
    merged: RwLock<Option<Arc<FeatureCollection>>>,
    last_refresh: RwLock<Option<RefreshSummary>>,
    refresh_lock: Mutex<()>,
}

impl PolioService {
    pub fn new(
        countries: Arc<dyn CountrySource>,
        boundaries: Arc<dyn BoundarySource>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            countries,
            boundaries,
            metrics,
            merged: RwLock::new(None),
            last_refresh: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn current(&self) -> Option<Arc<FeatureCollection>> {
        self.merged.read().await.clone()
    }

    pub async fn last_refresh(&self) -> Option<RefreshSummary> {
        self.last_refresh.read().await.clone()
    }

    /// Returns the cached dataset, fetching it first when nothing is cached.
    /// `None` means the fetch failed and there was nothing to fall back on.
    pub async fn get_or_load(&self) -> Option<Arc<FeatureCollection>> {
        if let Some(collection) = self.current().await {
            return Some(collection);
        }

        let _guard = self.refresh_lock.lock().await;
        // another request may have loaded it while we waited
        if let Some(collection) = self.current().await {
            return Some(collection);
        }
        if let Err(e) = self.refresh_locked().await {
            error!("Initial load failed: {}", e);
        }
        self.current().await
    }

    /// Fetches both sources and replaces the cached dataset. On failure the
    /// previous dataset stays in place.
    pub async fn refresh(&self) -> Result<RefreshSummary, PolioError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    #[instrument(skip(self))]
    async fn refresh_locked(&self) -> Result<RefreshSummary, PolioError> {
        let started = Instant::now();
        let (countries, boundaries) = tokio::join!(
            self.countries.fetch_countries(),
            self.boundaries.fetch_boundaries()
        );

        let (countries, boundaries) = match (countries, boundaries) {
            (Ok(countries), Ok(boundaries)) => (countries, boundaries),
            (Err(e), _) | (_, Err(e)) => {
                self.metrics.record_refresh_failure(e.error_type());
                return Err(e);
            }
        };

        let empty = if countries.is_empty() {
            Some(WORDPRESS_SOURCE)
        } else if boundaries.is_empty() {
            Some(BOUNDARY_SOURCE)
        } else {
            None
        };
        if let Some(source_name) = empty {
            error!(source = source_name, "One of the data sources is empty. Cannot proceed with merging.");
            let e = PolioError::EmptySource { source_name: source_name.to_string() };
            self.metrics.record_refresh_failure(e.error_type());
            return Err(e);
        }

        let collection = merge::merge(&countries, &boundaries);
        let summary = RefreshSummary {
            countries: countries.len(),
            boundaries: boundaries.len(),
            features: collection.len(),
            refreshed_at: Utc::now(),
        };

        *self.merged.write().await = Some(Arc::new(collection));
        *self.last_refresh.write().await = Some(summary.clone());

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_refresh(elapsed_ms, summary.features);
        info!(
            countries = summary.countries,
            boundaries = summary.boundaries,
            features = summary.features,
            duration_ms = elapsed_ms,
            "Dataset refreshed"
        );
        Ok(summary)
    }
}
