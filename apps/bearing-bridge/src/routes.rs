//! 路由定义
//!
//! - 事件流：/events（兼容直接访问 /）
//! - 健康检查：/health
//! - 指标快照：/metrics

use super::handlers::*;
use super::{AppState, health, request_context};
use axum::{Router, http::Method, middleware, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// 创建 HTTP 路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(stream_events))
        .route("/events", get(stream_events))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 事件流面向浏览器页面，允许任意来源
        .layer(CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]))
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}
