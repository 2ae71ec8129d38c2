pub mod data;

pub use data::{
    BatchKind, DecodedBatch, LabelRecord, OutboundEvent, RawMessage, SampleEvent, SampleRecord,
    SampleRow,
};

/// 当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
