//! 追踪、请求 ID 生成与桥接指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub raw_messages: u64,
    pub ignored_messages: u64,
    pub malformed_payloads: u64,
    pub batches_enqueued: u64,
    pub queue_depth: u64,
    pub queue_depth_peak: u64,
    pub record_faults: u64,
    pub truncated_rows: u64,
    pub events_normalized: u64,
    pub events_delivered: u64,
    pub events_discarded: u64,
    pub delivery_faults: u64,
    pub sessions_attached: u64,
    pub sessions_detached: u64,
}

/// 桥接指标（进程级计数器）。
pub struct TelemetryMetrics {
    raw_messages: AtomicU64,
    ignored_messages: AtomicU64,
    malformed_payloads: AtomicU64,
    batches_enqueued: AtomicU64,
    queue_depth: AtomicU64,
    queue_depth_peak: AtomicU64,
    record_faults: AtomicU64,
    truncated_rows: AtomicU64,
    events_normalized: AtomicU64,
    events_delivered: AtomicU64,
    events_discarded: AtomicU64,
    delivery_faults: AtomicU64,
    sessions_attached: AtomicU64,
    sessions_detached: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            raw_messages: AtomicU64::new(0),
            ignored_messages: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            batches_enqueued: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            queue_depth_peak: AtomicU64::new(0),
            record_faults: AtomicU64::new(0),
            truncated_rows: AtomicU64::new(0),
            events_normalized: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            delivery_faults: AtomicU64::new(0),
            sessions_attached: AtomicU64::new(0),
            sessions_detached: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            raw_messages: self.raw_messages.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            queue_depth_peak: self.queue_depth_peak.load(Ordering::Relaxed),
            record_faults: self.record_faults.load(Ordering::Relaxed),
            truncated_rows: self.truncated_rows.load(Ordering::Relaxed),
            events_normalized: self.events_normalized.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            delivery_faults: self.delivery_faults.load(Ordering::Relaxed),
            sessions_attached: self.sessions_attached.load(Ordering::Relaxed),
            sessions_detached: self.sessions_detached.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录 MQTT 原始消息接收次数。
pub fn record_raw_message() {
    metrics().raw_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录未识别 topic 的忽略次数。
pub fn record_ignored_message() {
    metrics().ignored_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录报文解析失败次数。
pub fn record_malformed_payload() {
    metrics().malformed_payloads.fetch_add(1, Ordering::Relaxed);
}

/// 记录入队批次数。
pub fn record_batch_enqueued() {
    metrics().batches_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 更新当前队列深度（同时维护峰值）。
pub fn record_queue_depth(depth: usize) {
    let metrics = metrics();
    let depth = depth as u64;
    metrics.queue_depth.store(depth, Ordering::Relaxed);
    metrics.queue_depth_peak.fetch_max(depth, Ordering::Relaxed);
}

/// 记录单行格式错误次数。
pub fn record_record_fault() {
    metrics().record_faults.fetch_add(1, Ordering::Relaxed);
}

/// 记录因截断丢弃的行数。
pub fn record_truncated_rows(rows: usize) {
    metrics()
        .truncated_rows
        .fetch_add(rows as u64, Ordering::Relaxed);
}

/// 记录规整输出事件数。
pub fn record_event_normalized() {
    metrics().events_normalized.fetch_add(1, Ordering::Relaxed);
}

/// 记录推送成功次数。
pub fn record_event_delivered() {
    metrics().events_delivered.fetch_add(1, Ordering::Relaxed);
}

/// 记录无消费者时丢弃的事件数。
pub fn record_event_discarded() {
    metrics().events_discarded.fetch_add(1, Ordering::Relaxed);
}

/// 记录推送失败次数。
pub fn record_delivery_fault() {
    metrics().delivery_faults.fetch_add(1, Ordering::Relaxed);
}

/// 记录会话接入次数。
pub fn record_session_attached() {
    metrics().sessions_attached.fetch_add(1, Ordering::Relaxed);
}

/// 记录会话断开次数。
pub fn record_session_detached() {
    metrics().sessions_detached.fetch_add(1, Ordering::Relaxed);
}
