use polio_models::PolioError;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::debug;

pub struct MetricsService {
    registry: Registry,
    requests_total: CounterVec,
    refreshes_total: Counter,
    refresh_failures_total: CounterVec,
    features: Gauge,
    refresh_duration_ms: Histogram,
}

impl MetricsService {
    pub fn new() -> Result<Self, PolioError> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("polio_requests_total", "Total number of API requests"),
            &["route"],
        )
        .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        let refreshes_total = Counter::new(
            "polio_refreshes_total",
            "Total number of successful dataset refreshes",
        )
        .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        let refresh_failures_total = CounterVec::new(
            Opts::new("polio_refresh_failures_total", "Total number of failed dataset refreshes"),
            &["error_type"],
        )
        .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        let features = Gauge::new("polio_features", "Features in the cached FeatureCollection")
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        let refresh_duration_ms = Histogram::with_opts(
            HistogramOpts::new(
                "polio_refresh_duration_ms",
                "Time to fetch and merge both sources in milliseconds",
            )
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]),
        )
        .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;
        registry
            .register(Box::new(refreshes_total.clone()))
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;
        registry
            .register(Box::new(refresh_failures_total.clone()))
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;
        registry
            .register(Box::new(features.clone()))
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;
        registry
            .register(Box::new(refresh_duration_ms.clone()))
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        Ok(Self {
            registry,
            requests_total,
            refreshes_total,
            refresh_failures_total,
            features,
            refresh_duration_ms,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.requests_total.with_label_values(&[route]).inc();
    }

    pub fn record_refresh(&self, duration_ms: f64, features: usize) {
        self.refreshes_total.inc();
        self.refresh_duration_ms.observe(duration_ms);
        self.features.set(features as f64);
        debug!("Recorded refresh: {} features in {}ms", features, duration_ms);
    }

    pub fn record_refresh_failure(&self, error_type: &str) {
        self.refresh_failures_total.with_label_values(&[error_type]).inc();
        debug!("Recorded refresh failure: {}", error_type);
    }

    pub fn get_prometheus_metrics(&self) -> Result<String, PolioError> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PolioError::InternalError { reason: e.to_string() })?;

        String::from_utf8(buffer).map_err(|e| PolioError::InternalError { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_recorded_values() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_request("/polio");
        metrics.record_request("/polio");
        metrics.record_refresh(120.0, 42);
        metrics.record_refresh_failure("UpstreamError");

        let text = metrics.get_prometheus_metrics().unwrap();
        assert!(text.contains("polio_requests_total{route=\"/polio\"} 2"));
        assert!(text.contains("polio_refreshes_total 1"));
        assert!(text.contains("polio_features 42"));
        assert!(text.contains("polio_refresh_failures_total{error_type=\"UpstreamError\"} 1"));
        assert!(text.contains("polio_refresh_duration_ms_count 1"));
    }

    #[test]
    fn registries_are_independent() {
        let a = MetricsService::new().unwrap();
        let b = MetricsService::new().unwrap();
        a.record_request("/healthz");
        assert!(!b.get_prometheus_metrics().unwrap().contains("/healthz"));
    }
}
