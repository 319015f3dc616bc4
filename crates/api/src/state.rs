use polio_ingest::PolioService;
use polio_metrics::MetricsService;
use polio_models::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<PolioService>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<PolioService>, metrics: Arc<MetricsService>) -> Self {
        Self {
            config,
            service,
            metrics,
        }
    }
}
