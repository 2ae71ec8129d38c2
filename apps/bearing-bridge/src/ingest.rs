//! 采集链路装配模块
//!
//! 将 MQTT 采集源、报文解码器与排空流水线组装在一起：
//! 采集源收到消息后交给 `BridgeHandler` 解码，成功的批次进入有序队列，
//! 由流水线规整后推送给当前的 SSE 消费者。

use bearing_config::AppConfig;
use bearing_ingest::{IngestError, MqttSource, MqttSourceConfig, NoopSource, RawMessageHandler, Source};
use bearing_normalize::{Decoder, TopicRoutes};
use bearing_pipeline::Pipeline;
use bearing_telemetry::{record_ignored_message, record_malformed_payload, record_raw_message};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 桥接处理器
///
/// 实现 `RawMessageHandler`，负责解码原始消息并把批次交给流水线。
/// 解码失败只丢弃当前消息，不影响后续处理。
pub(crate) struct BridgeHandler {
    /// 报文解码器，按 topic 决定批次类型
    decoder: Decoder,
    /// 排空流水线（队列 + 规整 + 投递）
    pipeline: Pipeline,
}

impl BridgeHandler {
    pub(crate) fn new(decoder: Decoder, pipeline: Pipeline) -> Self {
        Self { decoder, pipeline }
    }
}

#[async_trait::async_trait]
impl RawMessageHandler for BridgeHandler {
    async fn handle(&self, message: domain::RawMessage) -> Result<(), IngestError> {
        record_raw_message();
        info!(
            target: "bearing.ingest",
            topic = %message.topic,
            payload_size = message.payload.len(),
            received_at_ms = message.received_at_ms,
            "raw_message_received"
        );

        match self.decoder.decode(&message.topic, &message.payload) {
            Ok(Some(batch)) => {
                info!(
                    target: "bearing.ingest",
                    topic = %message.topic,
                    kind = batch.kind().as_str(),
                    records = batch.len(),
                    "batch_accepted"
                );
                self.pipeline.submit(batch).await;
            }
            Ok(None) => {
                record_ignored_message();
                debug!(target: "bearing.ingest", topic = %message.topic, "topic_ignored");
            }
            Err(err) => {
                // 解析失败的报文直接丢弃，流水线不受影响
                record_malformed_payload();
                warn!(target: "bearing.ingest", error = %err, "payload_dropped");
            }
        }
        Ok(())
    }
}

/// 启动采集任务
///
/// 根据配置选择 MQTT 采集源或空操作源，并在后台任务中运行。
pub fn spawn_ingest(config: &AppConfig, pipeline: Pipeline) -> tokio::task::JoinHandle<()> {
    let routes = TopicRoutes::new(
        config.mqtt_data_topic.clone(),
        config.mqtt_label_topic.clone(),
    );
    let topics = routes
        .subscriptions()
        .iter()
        .map(|topic| topic.to_string())
        .collect();
    let handler = Arc::new(BridgeHandler::new(Decoder::new(routes), pipeline));

    let source: Arc<dyn Source> = if config.ingest_enabled {
        let mqtt_config = MqttSourceConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            client_id: config.mqtt_client_id.clone(),
            topics,
        };
        info!(
            "ingest source: mqtt {}:{} topics={:?}",
            mqtt_config.host, mqtt_config.port, mqtt_config.topics
        );
        Arc::new(MqttSource::new(mqtt_config))
    } else {
        info!("ingest source: noop (BRIDGE_INGEST=off)");
        Arc::new(NoopSource)
    };

    tokio::spawn(async move {
        if let Err(err) = source.run(handler).await {
            warn!("ingest stopped: {}", err);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bearing_pipeline::{ChannelSession, DriverState};
    use domain::RawMessage;

    fn message(topic: &str, payload: &[u8]) -> RawMessage {
        RawMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            received_at_ms: domain::now_epoch_ms(),
        }
    }

    fn handler() -> (BridgeHandler, Pipeline) {
        let pipeline = Pipeline::new();
        (
            BridgeHandler::new(Decoder::default(), pipeline.clone()),
            pipeline,
        )
    }

    #[tokio::test]
    async fn malformed_payload_never_reaches_consumer() {
        let (handler, pipeline) = handler();
        let (session, mut rx) = ChannelSession::open();
        pipeline.sink().attach(Arc::new(session));

        handler
            .handle(message("bearing/sendData", b"[{\"h\":1"))
            .await
            .expect("handled");
        handler
            .handle(message("bearing/label", b"not json"))
            .await
            .expect("handled");

        assert_eq!(pipeline.queue_len().await, 0);
        assert_eq!(pipeline.state(), DriverState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_topic_is_ignored() {
        let (handler, pipeline) = handler();
        let (session, mut rx) = ChannelSession::open();
        pipeline.sink().attach(Arc::new(session));

        handler
            .handle(message("bearing/other", b"{\"label\":1}"))
            .await
            .expect("handled");

        assert_eq!(pipeline.state(), DriverState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accepted_messages_reach_consumer_in_order() {
        let (handler, pipeline) = handler();
        let (session, mut rx) = ChannelSession::open();
        pipeline.sink().attach(Arc::new(session));

        handler
            .handle(message(
                "bearing/sendData",
                br#"[{"h":9,"m":39,"s":39,"ms":65,"Hacc":0.552,"Vacc":-0.146,"Directory":"Bearing1_1"}]"#,
            ))
            .await
            .expect("handled");
        handler
            .handle(message("bearing/label", br#"{"Bearing1_1":"normal"}"#))
            .await
            .expect("handled");
        pipeline.wait_idle().await;

        assert_eq!(
            rx.try_recv().expect("sample"),
            r#"{"Hacc":0.552,"Vacc":-0.146,"Directory":"Bearing1_1","Time":"09:39:39.065"}"#
        );
        assert_eq!(rx.try_recv().expect("label"), r#"{"Bearing1_1":"normal"}"#);
    }
}
