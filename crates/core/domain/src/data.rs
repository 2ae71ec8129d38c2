use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 接入层收到的原始消息。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// 采样数据的一行（按发布方原样字段，尚未校验）。
///
/// 字段在此阶段均为可选，逐行校验由规整器完成。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleRow {
    #[serde(default)]
    pub h: Option<Value>,
    #[serde(default)]
    pub m: Option<Value>,
    #[serde(default)]
    pub s: Option<Value>,
    #[serde(default)]
    pub ms: Option<Value>,
    #[serde(rename = "Hacc", default)]
    pub hacc: Option<Value>,
    #[serde(rename = "Vacc", default)]
    pub vacc: Option<Value>,
    #[serde(rename = "Directory", default)]
    pub directory: Option<Value>,
}

/// 校验后的采样记录。
///
/// 精度字段已确认是有限数值，但保留发布方的原值（整数、小数或数字字符串），
/// 推送时原样输出。
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
    pub horizontal_accuracy: Value,
    pub vertical_accuracy: Value,
    pub directory: String,
}

/// 标签记录（topic 相关的任意 JSON 值，不做规整）。
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord(pub Value);

/// 批次类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    TimeSeries,
    Label,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::TimeSeries => "time_series",
            BatchKind::Label => "label",
        }
    }
}

/// 解码后的批次，类型仅由来源 topic 决定。
#[derive(Debug, Clone)]
pub enum DecodedBatch {
    TimeSeries(Vec<SampleRow>),
    Label(LabelRecord),
}

impl DecodedBatch {
    pub fn kind(&self) -> BatchKind {
        match self {
            DecodedBatch::TimeSeries(_) => BatchKind::TimeSeries,
            DecodedBatch::Label(_) => BatchKind::Label,
        }
    }

    /// 批次内记录数（标签批次恒为 1）。
    pub fn len(&self) -> usize {
        match self {
            DecodedBatch::TimeSeries(rows) => rows.len(),
            DecodedBatch::Label(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 单条采样的推送体。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEvent {
    #[serde(rename = "Hacc")]
    pub horizontal_accuracy: Value,
    #[serde(rename = "Vacc")]
    pub vertical_accuracy: Value,
    #[serde(rename = "Directory")]
    pub directory: String,
    #[serde(rename = "Time")]
    pub time: String,
}

/// 推送给消费者的事件。
///
/// 标签事件按原值序列化，不做包装。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Sample(SampleEvent),
    Label(Value),
}
