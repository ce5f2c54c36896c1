use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use flux_metrics::ReplicationMetrics;
use std::sync::Arc;
use tracing::error;

/// 指标端点，只暴露 `GET /metrics`
pub fn create_router(metrics: Arc<ReplicationMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(export_metrics))
        .with_state(metrics)
}

async fn export_metrics(State(metrics): State<Arc<ReplicationMetrics>>) -> Response {
    match metrics.export() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
