use std::sync::Arc;

use rumqttc::v5::{AsyncClient, mqttbytes::QoS};

use super::MqttOutMessage;

#[derive(Clone)]
pub struct MqttSender {
    client: Arc<AsyncClient>,
}

impl MqttSender {
    pub(super) fn new(client: Arc<AsyncClient>) -> Self {
        Self { client }
    }

    #[tracing::instrument(skip_all, fields(topic = %msg.topic, otel.name = format!("MQTT publish {}", msg.topic)))]
    pub async fn send(&self, msg: MqttOutMessage) -> anyhow::Result<()> {
        tracing::debug!(
            "Publishing MQTT message to {} (retain={}): {:?}",
            msg.topic,
            msg.retain,
            msg.payload
        );

        let MqttOutMessage { topic, payload, retain } = msg;

        if let Err(e) = self.client.publish(topic.clone(), QoS::AtLeastOnce, retain, payload).await {
            tracing::error!("Error publishing MQTT message to {}: {}", topic, e);
            return Err(e.into());
        }

        Ok(())
    }
}
