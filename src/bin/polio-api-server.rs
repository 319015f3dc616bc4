use anyhow::Result;
use polio_api::AppState;
use polio_ingest::{build_client, GeoJsonBoundarySource, PolioService, WordPressSource};
use polio_metrics::{MetricsService, TracingService};
use polio_models::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => warn!("Unable to listen for shutdown signal: {}", err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    TracingService::init().map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::load()?;
    info!("Configuration loaded: {:?}", config);

    let metrics = Arc::new(MetricsService::new()?);
    let client = build_client(&config.sources)?;
    let service = Arc::new(PolioService::new(
        Arc::new(WordPressSource::from_config(client.clone(), &config.sources)),
        Arc::new(GeoJsonBoundarySource::from_config(client, &config.sources)),
        metrics.clone(),
    ));

    if config.refresh.on_startup {
        let result = service.refresh().await;
        TracingService::log_refresh_result("startup", &result);
    }

    let refresher = (config.refresh.interval_secs > 0).then(|| {
        let service = service.clone();
        let period = Duration::from_secs(config.refresh.interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let result = service.refresh().await;
                TracingService::log_refresh_result("interval", &result);
            }
        })
    });

    TracingService::log_service_started(&config.service.name, &config.bind_addr());
    let state = AppState::new(config, service, metrics);
    polio_api::start_server(state, shutdown_signal()).await?;

    if let Some(handle) = refresher {
        handle.abort();
    }
    info!("PolioAPI server shutdown complete");
    Ok(())
}
