use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use polio_metrics::TracingService;
use polio_models::ErrorShape;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::AppState;

pub const UPDATE_MESSAGE: &str = "Data updated successfully";

/// The merged FeatureCollection, loaded on first use. Serializes to `null`
/// when nothing could be loaded.
#[instrument(skip(state))]
pub async fn get_polio_data(State(state): State<AppState>) -> Response {
    state.metrics.record_request("/polio");

    let collection = state.service.get_or_load().await;
    Json(collection.as_deref()).into_response()
}

/// Re-fetches both sources. The outcome is logged and counted; the response
/// is the same either way.
#[instrument(skip(state))]
pub async fn update_polio_data(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    state.metrics.record_request("/polio/update");
    info!("Updating polio data");

    let result = state.service.refresh().await;
    TracingService::log_refresh_result("api", &result);

    (StatusCode::OK, Json(json!({ "message": UPDATE_MESSAGE })))
}

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_request("/healthz");

    let loaded = state.service.current().await.is_some();
    let last_refresh = state.service.last_refresh().await;
    Json(json!({
        "status": "ok",
        "name": state.config.service.name,
        "loaded": loaded,
        "last_refresh": last_refresh,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Response, (StatusCode, Json<ErrorShape>)> {
    match state.metrics.get_prometheus_metrics() {
        Ok(text) => Ok((
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response()),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            let error_shape = e.to_error_shape();
            Err((
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(error_shape),
            ))
        }
    }
}
