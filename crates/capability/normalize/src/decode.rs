//! MQTT 报文解码。
//!
//! 批次类型只由来源 topic 决定：数据 topic 产出时序批次，标签 topic 产出标签记录，
//! 其余 topic 直接忽略。

use domain::{DecodedBatch, LabelRecord, SampleRow};
use serde_json::{Map, Value};
use tracing::debug;

/// 解码错误。
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload on {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },
}

impl DecodeError {
    fn malformed(topic: &str, reason: impl Into<String>) -> Self {
        DecodeError::MalformedPayload {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}

/// 可识别的 topic。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRoutes {
    pub data_topic: String,
    pub label_topic: String,
}

impl Default for TopicRoutes {
    fn default() -> Self {
        Self {
            data_topic: "bearing/sendData".to_string(),
            label_topic: "bearing/label".to_string(),
        }
    }
}

impl TopicRoutes {
    pub fn new(data_topic: impl Into<String>, label_topic: impl Into<String>) -> Self {
        Self {
            data_topic: data_topic.into(),
            label_topic: label_topic.into(),
        }
    }

    /// 需要订阅的 topic 列表。
    pub fn subscriptions(&self) -> [&str; 2] {
        [self.data_topic.as_str(), self.label_topic.as_str()]
    }
}

/// 报文解码器。
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    routes: TopicRoutes,
}

impl Decoder {
    pub fn new(routes: TopicRoutes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &TopicRoutes {
        &self.routes
    }

    /// 解码一条消息。未识别的 topic 返回 `Ok(None)`，不尝试解析。
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<Option<DecodedBatch>, DecodeError> {
        if topic == self.routes.data_topic {
            decode_time_series(topic, payload).map(Some)
        } else if topic == self.routes.label_topic {
            decode_label(topic, payload).map(Some)
        } else {
            Ok(None)
        }
    }
}

fn decode_time_series(topic: &str, payload: &[u8]) -> Result<DecodedBatch, DecodeError> {
    // 先按对象数组解析，避免 serde 把嵌套数组当成按位置排列的行
    let objects: Vec<Map<String, Value>> = serde_json::from_slice(payload)
        .map_err(|err| DecodeError::malformed(topic, err.to_string()))?;
    let rows = objects
        .into_iter()
        .map(|object| serde_json::from_value::<SampleRow>(Value::Object(object)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| DecodeError::malformed(topic, err.to_string()))?;
    let Some(first) = rows.first() else {
        return Err(DecodeError::malformed(topic, "empty batch"));
    };
    debug!(
        target: "bearing.decode",
        rows = rows.len(),
        first_h = ?first.h,
        first_m = ?first.m,
        first_s = ?first.s,
        directory = ?first.directory,
        "time_series_decoded"
    );
    Ok(DecodedBatch::TimeSeries(rows))
}

fn decode_label(topic: &str, payload: &[u8]) -> Result<DecodedBatch, DecodeError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|err| DecodeError::malformed(topic, err.to_string()))?;
    Ok(DecodedBatch::Label(LabelRecord(value)))
}
