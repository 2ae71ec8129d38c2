//! 桥接指标快照。
//!
//! - GET /metrics

use axum::{Json, http::StatusCode, response::IntoResponse};
use bearing_telemetry::metrics;

pub async fn get_metrics() -> impl IntoResponse {
    (StatusCode::OK, Json(metrics().snapshot()))
}
