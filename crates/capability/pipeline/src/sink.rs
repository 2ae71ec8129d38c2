//! 单消费者投递。
//!
//! 同一时刻最多持有一个会话；没有会话时事件直接丢弃，不缓存、不重放。

use bearing_telemetry::{
    record_delivery_fault, record_event_delivered, record_event_discarded,
    record_session_attached, record_session_detached,
};
use domain::OutboundEvent;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// 会话推送错误。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session closed")]
    Closed,
}

/// 投递错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("delivery fault on session {session_id}: {source}")]
    Delivery {
        session_id: Uuid,
        #[source]
        source: SessionError,
    },
}

/// 下游消费者会话抽象。
///
/// `push` 不得阻塞：传输层自行负责分帧与保活。
pub trait Session: Send + Sync {
    fn id(&self) -> Uuid;
    fn push(&self, payload: String) -> Result<(), SessionError>;
}

/// 基于无界通道的会话（SSE 连接与测试共用）。
#[derive(Debug, Clone)]
pub struct ChannelSession {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSession {
    /// 创建会话，返回会话与事件接收端。
    pub fn open() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }
}

impl Session for ChannelSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn push(&self, payload: String) -> Result<(), SessionError> {
        self.tx.send(payload).map_err(|_| SessionError::Closed)
    }
}

/// 单次投递结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// 没有会话，事件被丢弃。
    NoConsumer,
    /// 推送失败，会话已被摘除。
    Dropped,
}

/// 持有至多一个会话的投递端。
#[derive(Default)]
pub struct DeliverySink {
    current: Mutex<Option<Arc<dyn Session>>>,
}

impl DeliverySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接入新会话，替换已有会话（后到者生效）。返回被替换的会话 ID。
    pub fn attach(&self, session: Arc<dyn Session>) -> Option<Uuid> {
        let session_id = session.id();
        let replaced = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session)
            .map(|old| old.id());
        record_session_attached();
        if replaced.is_some() {
            record_session_detached();
        }
        info!(
            target: "bearing.sink",
            session_id = %session_id,
            replaced = ?replaced,
            "session_attached"
        );
        replaced
    }

    /// 摘除当前会话。
    pub fn detach(&self) -> bool {
        let removed = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match removed {
            Some(session) => {
                record_session_detached();
                info!(target: "bearing.sink", session_id = %session.id(), "session_detached");
                true
            }
            None => false,
        }
    }

    /// 仅当当前会话就是 `session_id` 时摘除，旧连接关闭不会影响新连接。
    pub fn detach_session(&self, session_id: Uuid) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().map(|session| session.id()) != Some(session_id) {
            return false;
        }
        current.take();
        drop(current);
        record_session_detached();
        info!(target: "bearing.sink", session_id = %session_id, "session_detached");
        true
    }

    pub fn is_attached(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn current_session_id(&self) -> Option<Uuid> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.id())
    }

    /// 尽力推送一个事件；失败时摘除会话并记录日志，不向上传播。
    pub fn send(&self, event: &OutboundEvent) -> SendOutcome {
        match self.try_send(event) {
            Ok(outcome) => {
                match outcome {
                    SendOutcome::Delivered => record_event_delivered(),
                    SendOutcome::NoConsumer => record_event_discarded(),
                    SendOutcome::Dropped => {}
                }
                outcome
            }
            Err(err) => {
                record_delivery_fault();
                if let SinkError::Delivery { session_id, .. } = &err {
                    self.detach_session(*session_id);
                }
                warn!(target: "bearing.sink", error = %err, "event_dropped");
                SendOutcome::Dropped
            }
        }
    }

    fn try_send(&self, event: &OutboundEvent) -> Result<SendOutcome, SinkError> {
        // 推送时不持锁
        let session = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(session) = session else {
            return Ok(SendOutcome::NoConsumer);
        };
        let payload =
            serde_json::to_string(event).map_err(|err| SinkError::Encode(err.to_string()))?;
        session
            .push(payload)
            .map_err(|source| SinkError::Delivery {
                session_id: session.id(),
                source,
            })?;
        Ok(SendOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(value: serde_json::Value) -> OutboundEvent {
        OutboundEvent::Label(value)
    }

    #[test]
    fn send_without_session_is_silent() {
        let sink = DeliverySink::new();
        assert_eq!(sink.send(&label(json!(1))), SendOutcome::NoConsumer);
        assert!(!sink.is_attached());
    }

    #[test]
    fn attach_replaces_previous_session() {
        let sink = DeliverySink::new();
        let (first, mut first_rx) = ChannelSession::open();
        let (second, mut second_rx) = ChannelSession::open();
        let first_id = first.id();

        assert_eq!(sink.attach(Arc::new(first)), None);
        assert_eq!(sink.attach(Arc::new(second.clone())), Some(first_id));
        assert_eq!(sink.send(&label(json!("x"))), SendOutcome::Delivered);

        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().expect("payload"), "\"x\"");
        assert_eq!(sink.current_session_id(), Some(second.id()));
    }

    #[test]
    fn stale_detach_keeps_newer_session() {
        let sink = DeliverySink::new();
        let (old, _old_rx) = ChannelSession::open();
        let (new, _new_rx) = ChannelSession::open();
        let old_id = old.id();
        sink.attach(Arc::new(old));
        sink.attach(Arc::new(new.clone()));

        assert!(!sink.detach_session(old_id));
        assert_eq!(sink.current_session_id(), Some(new.id()));
        assert!(sink.detach_session(new.id()));
        assert!(!sink.detach());
    }

    #[test]
    fn closed_session_is_detached_on_push_failure() {
        let sink = DeliverySink::new();
        let (session, rx) = ChannelSession::open();
        sink.attach(Arc::new(session));
        drop(rx);

        assert_eq!(sink.send(&label(json!({"a": 1}))), SendOutcome::Dropped);
        assert!(!sink.is_attached());
        assert_eq!(sink.send(&label(json!({"a": 2}))), SendOutcome::NoConsumer);
    }
}
