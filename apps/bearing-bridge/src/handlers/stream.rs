//! SSE 推送 handler
//!
//! - GET /events（以及 GET /）
//!
//! 每个连接创建一个会话并接入投递端，新连接会替换旧连接；
//! 被替换的连接在通道关闭后自然结束。连接断开时按会话 ID 摘除，
//! 不会误摘后来接入的会话。

use crate::AppState;
use axum::{
    extract::{ConnectInfo, State},
    response::sse::{Event, KeepAlive, Sse},
};
use bearing_pipeline::{ChannelSession, Pipeline, Session};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 连接存活期间持有；被丢弃时摘除对应会话。
struct SessionGuard {
    pipeline: Pipeline,
    session_id: Uuid,
    peer: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let detached = self.pipeline.sink().detach_session(self.session_id);
        info!(
            target: "bearing.stream",
            session_id = %self.session_id,
            peer = %self.peer,
            detached = detached,
            "consumer_disconnected"
        );
    }
}

pub async fn stream_events(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let (session, rx) = ChannelSession::open();
    let session_id = session.id();
    state.pipeline.sink().attach(Arc::new(session));
    info!(
        target: "bearing.stream",
        session_id = %session_id,
        peer = %peer,
        "consumer_connected"
    );

    let guard = SessionGuard {
        pipeline: state.pipeline.clone(),
        session_id,
        peer,
    };
    let greeting = stream::once(async { Ok::<_, Infallible>(Event::default().comment("connected")) });
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let payload = rx.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().data(payload)), (rx, guard)))
    });

    Sse::new(greeting.chain(events)).keep_alive(KeepAlive::new().interval(state.keep_alive))
}
