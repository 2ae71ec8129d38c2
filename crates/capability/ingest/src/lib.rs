use async_trait::async_trait;
use domain::{RawMessage, now_epoch_ms};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
}

/// RawMessage 处理器。
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError>;
}

/// 采集源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn RawMessageHandler>) -> Result<(), IngestError>;
}

/// 占位源（采集关闭时使用）。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl Source for NoopSource {
    async fn run(&self, _handler: Arc<dyn RawMessageHandler>) -> Result<(), IngestError> {
        Ok(())
    }
}

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    /// 精确订阅的 topic（不含通配符）。
    pub topics: Vec<String>,
}

/// MQTT 采集源。
#[derive(Debug, Clone)]
pub struct MqttSource {
    config: MqttSourceConfig,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttSourceConfig {
        &self.config
    }

    fn options(&self) -> rumqttc::MqttOptions {
        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("bearing-bridge-{}", uuid::Uuid::new_v4()));
        let mut options =
            rumqttc::MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        // 报文是整批 JSON，放宽默认的包大小上限
        options.set_max_packet_size(1024 * 1024, 1024 * 1024);
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(&self, handler: Arc<dyn RawMessageHandler>) -> Result<(), IngestError> {
        if self.config.topics.is_empty() {
            return Err(IngestError::Source("no topics configured".to_string()));
        }
        let (client, mut eventloop) = rumqttc::AsyncClient::new(self.options(), 10);

        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    // 每次 (重)连接后重新订阅
                    info!(
                        target: "bearing.ingest",
                        host = %self.config.host,
                        port = self.config.port,
                        "mqtt_connected"
                    );
                    for topic in &self.config.topics {
                        client
                            .subscribe(topic.as_str(), rumqttc::QoS::AtMostOnce)
                            .await
                            .map_err(|err| IngestError::Source(err.to_string()))?;
                        info!(target: "bearing.ingest", topic = %topic, "mqtt_subscribed");
                    }
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    let message = RawMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                        received_at_ms: now_epoch_ms(),
                    };
                    if let Err(err) = handler.handle(message).await {
                        warn!(target: "bearing.ingest", error = %err, "raw_message_handler_failed");
                    }
                }
                Ok(event) => {
                    debug!(target: "bearing.ingest", event = ?event, "mqtt_event");
                }
                Err(err) => {
                    warn!(target: "bearing.ingest", error = %err, "mqtt_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(client_id: Option<&str>) -> MqttSourceConfig {
        MqttSourceConfig {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: client_id.map(str::to_string),
            topics: vec!["bearing/sendData".to_string(), "bearing/label".to_string()],
        }
    }

    #[test]
    fn explicit_client_id_is_used() {
        let source = MqttSource::new(config(Some("bridge-1")));
        assert_eq!(source.options().client_id(), "bridge-1");
    }

    #[test]
    fn generated_client_id_has_prefix() {
        let source = MqttSource::new(config(None));
        assert!(source.options().client_id().starts_with("bearing-bridge-"));
    }

    #[tokio::test]
    async fn source_without_topics_fails_fast() {
        let mut config = config(None);
        config.topics.clear();
        let source = MqttSource::new(config);

        struct Ignore;
        #[async_trait]
        impl RawMessageHandler for Ignore {
            async fn handle(&self, _message: RawMessage) -> Result<(), IngestError> {
                Ok(())
            }
        }

        let err = source.run(Arc::new(Ignore)).await.expect_err("no topics");
        assert!(matches!(err, IngestError::Source(_)));
    }
}
