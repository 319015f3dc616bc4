use polio_models::{PolioError, RefreshSummary};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,tower_http=debug";

pub struct TracingService;

impl TracingService {
    /// JSON lines with RFC 3339 UTC timestamps; `RUST_LOG` overrides the filter.
    pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .try_init()?;

        Ok(())
    }

    /// Plain human-readable output for the CLI.
    pub fn init_compact() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()?;

        Ok(())
    }

    pub fn log_service_started(name: &str, bind_addr: &str) {
        info!(
            service_name = %name,
            bind_addr = %bind_addr,
            "Service started"
        );
    }

    pub fn log_refresh_result(trigger: &str, result: &Result<RefreshSummary, PolioError>) {
        match result {
            Ok(summary) => {
                info!(
                    trigger = %trigger,
                    countries = summary.countries,
                    boundaries = summary.boundaries,
                    features = summary.features,
                    "Refresh completed"
                );
            }
            Err(e) if e.is_upstream() => {
                warn!(
                    trigger = %trigger,
                    error_type = %e.error_type(),
                    error_message = %e,
                    "Refresh skipped, keeping previous data"
                );
            }
            Err(e) => {
                error!(
                    trigger = %trigger,
                    error_type = %e.error_type(),
                    error_message = %e,
                    "Refresh failed"
                );
            }
        }
    }
}
