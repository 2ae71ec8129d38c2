//! MQTT → SSE 桥接服务：订阅传感器 topic，规整后按到达顺序推送给唯一的事件流消费者。

mod handlers;
mod ingest;
mod routes;

use axum::{
    Json,
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bearing_config::AppConfig;
use bearing_pipeline::{Pipeline, PipelineConfig};
use bearing_telemetry::{init_tracing, new_request_ids};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{Instrument, info};

#[derive(Clone)]
pub struct AppState {
    pipeline: Pipeline,
    keep_alive: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 进程级流水线：队列、规整器与投递端
    let pipeline = Pipeline::with_config(PipelineConfig {
        record_cap: config.batch_record_cap,
        queue_warn_depth: config.queue_warn_depth,
    });
    let ingest = ingest::spawn_ingest(&config, pipeline.clone());

    let state = AppState {
        pipeline: pipeline.clone(),
        keep_alive: Duration::from_secs(config.sse_keep_alive_seconds.max(1)),
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("sse server listening on {}", config.http_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_after(shutdown_signal(), pipeline))
    .await?;

    ingest.abort();
    info!("bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl_c listener failed: {}", err);
        std::future::pending::<()>().await;
    }
}

/// 收到退出信号后摘除当前消费者。
///
/// 事件流只在会话通道关闭时结束，不摘除的话优雅退出会一直等待该连接。
async fn shutdown_after(signal: impl Future<Output = ()>, pipeline: Pipeline) {
    signal.await;
    let detached = pipeline.sink().detach();
    info!(detached = detached, "shutdown signal received");
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn request_context(req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[tokio::test]
    async fn shutdown_ends_open_event_stream() {
        let pipeline = Pipeline::new();
        let state = AppState {
            pipeline: pipeline.clone(),
            keep_alive: Duration::from_secs(15),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(
            axum::serve(
                listener,
                routes::create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_after(
                async move {
                    let _ = signal_rx.await;
                },
                pipeline.clone(),
            ))
            .into_future(),
        );

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client
            .write_all(b"GET /events HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .expect("request");
        let mut received = String::new();
        let mut buf = [0u8; 1024];
        while !received.contains("connected") {
            let n = timeout(Duration::from_secs(3), client.read(&mut buf))
                .await
                .expect("read in time")
                .expect("read");
            assert!(n > 0, "stream closed before greeting");
            received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(pipeline.sink().is_attached());

        signal_tx.send(()).expect("signal");
        let served = timeout(Duration::from_secs(3), server)
            .await
            .expect("server stopped after signal")
            .expect("server task");
        assert!(served.is_ok());
        assert!(!pipeline.sink().is_attached());
    }
}
