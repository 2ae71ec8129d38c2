//! 桥接服务运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 桥接服务运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    /// 未设置时由接入层生成 `bearing-bridge-<uuid>`。
    pub mqtt_client_id: Option<String>,
    pub mqtt_data_topic: String,
    pub mqtt_label_topic: String,
    pub ingest_enabled: bool,
    pub batch_record_cap: usize,
    pub queue_warn_depth: usize,
    pub sse_keep_alive_seconds: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("BRIDGE_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:5001".to_string());
        let mqtt_host = env::var("BRIDGE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("BRIDGE_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("BRIDGE_MQTT_USERNAME");
        let mqtt_password = read_optional("BRIDGE_MQTT_PASSWORD");
        let mqtt_client_id = read_optional("BRIDGE_MQTT_CLIENT_ID");
        let mqtt_data_topic = read_topic_with_default("BRIDGE_MQTT_DATA_TOPIC", "bearing/sendData")?;
        let mqtt_label_topic = read_topic_with_default("BRIDGE_MQTT_LABEL_TOPIC", "bearing/label")?;
        if mqtt_data_topic == mqtt_label_topic {
            return Err(ConfigError::Invalid(
                "BRIDGE_MQTT_LABEL_TOPIC".to_string(),
                mqtt_label_topic,
            ));
        }
        let ingest_enabled = read_bool_with_default("BRIDGE_INGEST", true);
        let batch_record_cap = read_usize_with_default("BRIDGE_BATCH_RECORD_CAP", 20)?;
        if batch_record_cap == 0 {
            return Err(ConfigError::Invalid(
                "BRIDGE_BATCH_RECORD_CAP".to_string(),
                "0".to_string(),
            ));
        }
        let queue_warn_depth = read_usize_with_default("BRIDGE_QUEUE_WARN_DEPTH", 1000)?;
        let sse_keep_alive_seconds = read_u64_with_default("BRIDGE_SSE_KEEP_ALIVE_SECONDS", 15)?;

        Ok(Self {
            http_addr,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_data_topic,
            mqtt_label_topic,
            ingest_enabled,
            batch_record_cap,
            queue_warn_depth,
            sse_keep_alive_seconds,
        })
    }
}

fn read_topic_with_default(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default.to_string()),
    };
    // 只去掉首尾空白；MQTT 中首尾的 `/` 属于 topic 本身
    let topic = value.trim();
    // 订阅的是精确 topic，不允许通配符
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(ConfigError::Invalid(key.to_string(), value));
    }
    Ok(topic.to_string())
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
