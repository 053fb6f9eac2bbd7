use std::sync::Arc;

use rumqttc::v5::{
    AsyncClient, EventLoop, MqttOptions,
    mqttbytes::{
        QoS,
        v5::{ConnectProperties, LastWill, Packet, Publish, SubscribeProperties},
    },
};

use rumqttc::v5::Event::Incoming;
use tokio::sync::{mpsc, watch};

use super::*;

pub struct Mqtt {
    client: Arc<AsyncClient>,
    event_loop: EventLoop,
    subscriptions: Vec<MqttSubscriptionHandle>,
    connections: watch::Sender<u64>,
}

pub struct MqttSubscription {
    rx: mpsc::Receiver<MqttInMessage>,
}

impl MqttSubscription {
    pub async fn recv(&mut self) -> Option<MqttInMessage> {
        self.rx.recv().await
    }
}

struct MqttSubscriptionHandle {
    topic: String,
    tx: mpsc::Sender<MqttInMessage>,
}

impl Mqtt {
    pub fn connect(
        host: &str,
        port: u16,
        client_id: &str,
        credentials: Option<(String, String)>,
        last_will: Option<MqttLastWill>,
    ) -> Self {
        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(::std::time::Duration::from_secs(5));
        mqttoptions.set_clean_start(false);

        if let Some((user, password)) = credentials {
            mqttoptions.set_credentials(user, password);
        }

        if let Some(will) = last_will {
            tracing::debug!("Registering MQTT last will on {}", will.topic);
            mqttoptions.set_last_will(LastWill::new(will.topic, will.payload, QoS::AtLeastOnce, true, None));
        }

        let mut connect_props = ConnectProperties::new();
        connect_props.session_expiry_interval = 60.into();
        connect_props.max_packet_size = Some(1024 * 1024);
        mqttoptions.set_connect_properties(connect_props);

        let (client, event_loop) = AsyncClient::new(mqttoptions, 64);

        Mqtt {
            client: Arc::new(client),
            event_loop,
            subscriptions: vec![],
            connections: watch::channel(0).0,
        }
    }

    /// Subscribes to a topic filter. Every subscription gets its own identifier, which the broker
    /// echoes back on matching publishes, so overlapping filters are routed independently.
    pub async fn subscribe(&mut self, topic: impl Into<String>) -> anyhow::Result<MqttSubscription> {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel::<MqttInMessage>(32);

        tracing::info!("Subscribing to MQTT topic {}", topic);

        self.subscriptions.push(MqttSubscriptionHandle {
            topic: topic.clone(),
            tx,
        });

        self.client
            .subscribe_with_properties(
                topic,
                QoS::AtLeastOnce,
                SubscribeProperties {
                    id: Some(self.subscriptions.len()), //must be > 0
                    user_properties: vec![],
                },
            )
            .await?;

        Ok(MqttSubscription { rx })
    }

    /// Changes on every connection to the broker, including reconnects.
    /// Retained messages may be gone after a reconnect and have to be published again.
    pub fn connections(&self) -> MqttConnections {
        self.connections.subscribe()
    }

    pub fn sender(&self) -> MqttSender {
        MqttSender::new(self.client.clone())
    }

    pub async fn run(mut self) {
        loop {
            match self.event_loop.poll().await {
                Ok(Incoming(Packet::Publish(publish))) => {
                    self.dispatch(publish).await;
                }
                Ok(Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("Connected to MQTT broker");
                    self.connections.send_modify(|count| *count += 1);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("MQTT error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn dispatch(&self, msg: Publish) {
        let mqtt_in_message = match MqttInMessage::try_from(&msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Error parsing MQTT message: {}", e);
                return;
            }
        };

        tracing::trace!("Received MQTT message on topic {}", mqtt_in_message.topic);

        let subscription_ids = match msg.properties {
            Some(p) => p.subscription_identifiers,
            None => {
                tracing::error!("No subscription identifiers in MQTT message");
                return;
            }
        };

        for id in subscription_ids {
            let Some(sub) = self.subscriptions.get(id - 1) else {
                tracing::error!("No subscription for id: {}", id);
                continue;
            };

            if let Err(e) = sub
                .tx
                .send_timeout(mqtt_in_message.clone(), std::time::Duration::from_secs(5))
                .await
            {
                tracing::error!("Failed to forward MQTT message of {}: {}", sub.topic, e);
            }
        }
    }
}
