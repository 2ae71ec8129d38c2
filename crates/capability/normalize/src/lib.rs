//! 报文解码与批次规整。

pub mod decode;

pub use decode::{DecodeError, Decoder, TopicRoutes};

use domain::{DecodedBatch, OutboundEvent, SampleEvent, SampleRecord, SampleRow};
use serde_json::Value;
use tracing::warn;

/// 每个时序批次默认保留的行数。
pub const DEFAULT_RECORD_CAP: usize = 20;

/// 单行格式错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordFault {
    #[error("row {index}: missing field {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("row {index}: field {field} is not an integer: {value}")]
    NotInteger {
        index: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {index}: field {field} out of range: {value}")]
    OutOfRange {
        index: usize,
        field: &'static str,
        value: i64,
    },
    #[error("row {index}: field {field} is not numeric: {value}")]
    NotNumeric {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// 规整结果。
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub events: Vec<OutboundEvent>,
    /// 被跳过的行（不影响同批次其他行）。
    pub faults: Vec<RecordFault>,
    /// 超出上限被丢弃的行数。
    pub truncated: usize,
}

/// DecodedBatch -> OutboundEvent 的规整器。
#[derive(Debug, Clone)]
pub struct Normalizer {
    record_cap: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_CAP)
    }
}

impl Normalizer {
    pub fn new(record_cap: usize) -> Self {
        Self {
            record_cap: record_cap.max(1),
        }
    }

    pub fn record_cap(&self) -> usize {
        self.record_cap
    }

    pub fn normalize(&self, batch: DecodedBatch) -> NormalizeOutcome {
        match batch {
            DecodedBatch::Label(label) => NormalizeOutcome {
                events: vec![OutboundEvent::Label(label.0)],
                ..NormalizeOutcome::default()
            },
            DecodedBatch::TimeSeries(rows) => self.normalize_rows(rows),
        }
    }

    fn normalize_rows(&self, rows: Vec<SampleRow>) -> NormalizeOutcome {
        let truncated = rows.len().saturating_sub(self.record_cap);
        let mut outcome = NormalizeOutcome {
            events: Vec::with_capacity(rows.len().min(self.record_cap)),
            faults: Vec::new(),
            truncated,
        };
        for (index, row) in rows.iter().take(self.record_cap).enumerate() {
            match sample_record(index, row) {
                Ok(record) => outcome.events.push(OutboundEvent::Sample(sample_event(record))),
                Err(fault) => {
                    warn!(target: "bearing.normalize", error = %fault, "record_skipped");
                    outcome.faults.push(fault);
                }
            }
        }
        outcome
    }
}

/// 按 `HH:MM:SS.mmm` 拼接时间。
pub fn format_time(hour: u8, minute: u8, second: u8, millisecond: u16) -> String {
    format!("{:02}:{:02}:{:02}.{:03}", hour, minute, second, millisecond)
}

/// 校验一行采样数据。缺失 `ms` 视为 0。
pub fn sample_record(index: usize, row: &SampleRow) -> Result<SampleRecord, RecordFault> {
    let hour = time_field(index, "h", row.h.as_ref(), 23)?;
    let minute = time_field(index, "m", row.m.as_ref(), 59)?;
    let second = time_field(index, "s", row.s.as_ref(), 59)?;
    let millisecond = match row.ms.as_ref() {
        Some(value) => time_field(index, "ms", Some(value), 999)?,
        None => 0,
    };
    let horizontal_accuracy = numeric_field(index, "Hacc", row.hacc.as_ref())?;
    let vertical_accuracy = numeric_field(index, "Vacc", row.vacc.as_ref())?;
    let directory = match row.directory.as_ref() {
        Some(Value::String(directory)) => directory.clone(),
        Some(other) => other.to_string(),
        None => {
            return Err(RecordFault::MissingField {
                index,
                field: "Directory",
            });
        }
    };

    Ok(SampleRecord {
        hour: hour as u8,
        minute: minute as u8,
        second: second as u8,
        millisecond: millisecond as u16,
        horizontal_accuracy,
        vertical_accuracy,
        directory,
    })
}

fn sample_event(record: SampleRecord) -> SampleEvent {
    SampleEvent {
        time: format_time(
            record.hour,
            record.minute,
            record.second,
            record.millisecond,
        ),
        horizontal_accuracy: record.horizontal_accuracy,
        vertical_accuracy: record.vertical_accuracy,
        directory: record.directory,
    }
}

fn time_field(
    index: usize,
    field: &'static str,
    value: Option<&Value>,
    max: i64,
) -> Result<i64, RecordFault> {
    let value = value.ok_or(RecordFault::MissingField { index, field })?;
    let parsed = integer_like(value).ok_or_else(|| RecordFault::NotInteger {
        index,
        field,
        value: value.to_string(),
    })?;
    if !(0..=max).contains(&parsed) {
        return Err(RecordFault::OutOfRange {
            index,
            field,
            value: parsed,
        });
    }
    Ok(parsed)
}

/// 校验精度字段是有限数值（数字或数字字符串），返回原值。
fn numeric_field(index: usize, field: &'static str, value: Option<&Value>) -> Result<Value, RecordFault> {
    let value = value.ok_or(RecordFault::MissingField { index, field })?;
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(value.clone()),
        _ => Err(RecordFault::NotNumeric {
            index,
            field,
            value: value.to_string(),
        }),
    }
}

/// 整数、整值浮点数与数字字符串都视为整数。
fn integer_like(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
                .map(|v| v as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(h: Value, m: Value, s: Value, ms: Option<Value>) -> SampleRow {
        SampleRow {
            h: Some(h),
            m: Some(m),
            s: Some(s),
            ms,
            hacc: Some(json!(0.1)),
            vacc: Some(json!(0.2)),
            directory: Some(json!("Bearing1_1")),
        }
    }

    #[test]
    fn format_time_pads_every_component() {
        assert_eq!(format_time(3, 5, 9, 7), "03:05:09.007");
        assert_eq!(format_time(23, 59, 59, 999), "23:59:59.999");
        assert_eq!(format_time(0, 0, 0, 0), "00:00:00.000");
    }

    #[test]
    fn integer_like_accepts_integral_values() {
        assert_eq!(integer_like(&json!(7)), Some(7));
        assert_eq!(integer_like(&json!(7.0)), Some(7));
        assert_eq!(integer_like(&json!(" 12 ")), Some(12));
        assert_eq!(integer_like(&json!(7.5)), None);
        assert_eq!(integer_like(&json!(true)), None);
    }

    #[test]
    fn missing_ms_formats_as_zero() {
        let record = sample_record(0, &row(json!(1), json!(2), json!(3), None)).expect("record");
        assert_eq!(record.millisecond, 0);
    }

    #[test]
    fn out_of_range_hour_is_a_fault() {
        let err = sample_record(4, &row(json!(24), json!(0), json!(0), None)).expect_err("fault");
        assert_eq!(
            err,
            RecordFault::OutOfRange {
                index: 4,
                field: "h",
                value: 24
            }
        );
    }

    #[test]
    fn label_passes_through_unchanged() {
        let value = json!({ "prediction": "normal", "confidence": 0.97 });
        let outcome = Normalizer::default().normalize(DecodedBatch::Label(domain::LabelRecord(
            value.clone(),
        )));
        assert_eq!(outcome.events, vec![OutboundEvent::Label(value)]);
        assert!(outcome.faults.is_empty());
        assert_eq!(outcome.truncated, 0);
    }

    #[test]
    fn accuracy_keeps_published_value() {
        let mut input = row(json!(1), json!(2), json!(3), Some(json!(4)));
        input.hacc = Some(json!(1));
        input.vacc = Some(json!("0.5"));
        let record = sample_record(0, &input).expect("record");
        assert_eq!(record.horizontal_accuracy, json!(1));
        assert_eq!(record.vertical_accuracy, json!("0.5"));

        input.vacc = Some(json!("NaN"));
        assert!(matches!(
            sample_record(0, &input),
            Err(RecordFault::NotNumeric { field: "Vacc", .. })
        ));
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        assert_eq!(Normalizer::new(0).record_cap(), 1);
    }
}
