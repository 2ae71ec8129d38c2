//! 有序队列 → 规整 → 单消费者投递的排空驱动。
//!
//! 队列与排空状态共用一把锁：空队列检查与 Draining → Idle 切换在同一临界区内完成，
//! 因此任意时刻最多只有一个排空任务，投递顺序与入队顺序一致。

pub mod queue;
pub mod sink;

pub use queue::OrderedQueue;
pub use sink::{ChannelSession, DeliverySink, SendOutcome, Session, SessionError, SinkError};

use bearing_normalize::{DEFAULT_RECORD_CAP, Normalizer};
use bearing_telemetry::{
    record_batch_enqueued, record_event_normalized, record_queue_depth, record_record_fault,
    record_truncated_rows,
};
use domain::DecodedBatch;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

/// 排空驱动状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Draining,
}

/// Pipeline 参数。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 每个时序批次保留的最大行数。
    pub record_cap: usize,
    /// 队列深度每达到该值的整数倍记录一次告警，0 表示关闭。
    pub queue_warn_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            record_cap: DEFAULT_RECORD_CAP,
            queue_warn_depth: 1000,
        }
    }
}

impl PipelineConfig {
    fn sanitized(mut self) -> Self {
        if self.record_cap == 0 {
            self.record_cap = 1;
        }
        self
    }
}

struct DriverQueue {
    queue: OrderedQueue,
    state: DriverState,
}

struct PipelineInner {
    normalizer: Normalizer,
    sink: DeliverySink,
    config: PipelineConfig,
    queue: Mutex<DriverQueue>,
    state_tx: watch::Sender<DriverState>,
}

/// 进程级桥接上下文：持有队列、规整器与投递端。
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let config = config.sanitized();
        let (state_tx, _) = watch::channel(DriverState::Idle);
        let inner = PipelineInner {
            normalizer: Normalizer::new(config.record_cap),
            sink: DeliverySink::new(),
            config,
            queue: Mutex::new(DriverQueue {
                queue: OrderedQueue::new(),
                state: DriverState::Idle,
            }),
            state_tx,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn sink(&self) -> &DeliverySink {
        &self.inner.sink
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn state(&self) -> DriverState {
        *self.inner.state_tx.borrow()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.queue.lock().await.queue.len()
    }

    /// 入队一个批次；驱动空闲时启动一次排空。
    ///
    /// 必须在 tokio 运行时内调用。
    pub async fn submit(&self, batch: DecodedBatch) {
        let mut guard = self.inner.queue.lock().await;
        let was_empty = guard.queue.enqueue(batch);
        let depth = guard.queue.len();
        record_batch_enqueued();
        record_queue_depth(depth);

        let warn_depth = self.inner.config.queue_warn_depth;
        if warn_depth > 0 && depth % warn_depth == 0 {
            warn!(target: "bearing.pipeline", depth = depth, "queue_depth_high");
        }

        if guard.state == DriverState::Draining {
            return;
        }
        debug_assert!(was_empty, "idle driver with non-empty queue");
        guard.state = DriverState::Draining;
        self.inner.state_tx.send_replace(DriverState::Draining);
        drop(guard);

        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.drain().await });
    }

    /// 等待驱动回到 Idle。
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == DriverState::Idle).await;
    }

    async fn drain(&self) {
        debug!(target: "bearing.pipeline", "drain_started");
        let mut batches = 0usize;
        loop {
            let batch = {
                let mut guard = self.inner.queue.lock().await;
                match guard.queue.dequeue() {
                    Some(batch) => {
                        record_queue_depth(guard.queue.len());
                        batch
                    }
                    None => {
                        guard.state = DriverState::Idle;
                        self.inner.state_tx.send_replace(DriverState::Idle);
                        break;
                    }
                }
            };
            self.process(batch);
            batches += 1;
        }
        debug!(target: "bearing.pipeline", batches = batches, "drain_finished");
    }

    /// 规整一个批次并逐条投递；单条失败只影响该条。
    fn process(&self, batch: DecodedBatch) {
        let kind = batch.kind();
        let rows = batch.len();
        let outcome = self.inner.normalizer.normalize(batch);

        for _ in &outcome.faults {
            record_record_fault();
        }
        if outcome.truncated > 0 {
            record_truncated_rows(outcome.truncated);
            debug!(
                target: "bearing.pipeline",
                rows = rows,
                dropped = outcome.truncated,
                "batch_truncated"
            );
        }

        let mut delivered = 0usize;
        for event in &outcome.events {
            record_event_normalized();
            if self.inner.sink.send(event) == SendOutcome::Delivered {
                delivered += 1;
            }
        }
        debug!(
            target: "bearing.pipeline",
            kind = kind.as_str(),
            rows = rows,
            events = outcome.events.len(),
            faults = outcome.faults.len(),
            delivered = delivered,
            "batch_processed"
        );
    }
}
