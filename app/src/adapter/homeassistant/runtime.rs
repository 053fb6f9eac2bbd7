use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Local};
use infrastructure::{
    EventListener, MqttConnections, MqttInMessage, MqttOutMessage, MqttSender, MqttSubscription,
};

use super::{HaTopics, PAYLOAD_OFFLINE, PAYLOAD_ONLINE, discovery::discovery_payload};
use crate::{
    coordinator::{CoordinatorClient, CoordinatorEvent},
    core::DeviceSnapshot,
    entity::{DeviceInfo, EntityContext, EntityDescription},
};

pub struct HomeAssistantRunner {
    coordinator: CoordinatorClient,
    events: EventListener<CoordinatorEvent>,
    commands: MqttSubscription,
    connections: MqttConnections,
    publisher: EntityPublisher<MqttSender>,
}

impl HomeAssistantRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entities: Vec<EntityDescription>,
        topics: HaTopics,
        device: DeviceInfo,
        dimmer_name: String,
        coordinator: CoordinatorClient,
        events: EventListener<CoordinatorEvent>,
        commands: MqttSubscription,
        connections: MqttConnections,
        mqtt_sender: MqttSender,
    ) -> Self {
        Self {
            coordinator,
            events,
            commands,
            connections,
            publisher: EntityPublisher::new(entities, topics, device, dimmer_name, mqtt_sender),
        }
    }

    pub async fn run(mut self) {
        self.publisher.snapshot = self.coordinator.snapshot().await;
        self.publisher.last_backup = self.coordinator.last_backup().await;
        self.publisher.available = self.coordinator.last_update_success().await;

        loop {
            tokio::select! {
                Ok(()) = self.connections.changed() => {
                    self.publisher.announce().await;
                }

                Some(msg) = self.commands.recv() => {
                    self.handle_command(msg);
                }

                event = self.events.recv() => match event {
                    Some(event) => self.publisher.handle_event(event).await,
                    None => {
                        tracing::error!("Coordinator event channel closed, stopping Home Assistant bridge");
                        return;
                    }
                }
            }
        }
    }

    fn handle_command(&self, msg: MqttInMessage) {
        let Some(entity) = entity_for_topic(&self.publisher.entities, &self.publisher.topics, &msg.topic) else {
            tracing::warn!("Received command for unknown entity on {}", msg.topic);
            return;
        };

        let action = match entity.command(&msg.payload) {
            Ok(action) => action,
            Err(e) => {
                tracing::error!("Error parsing Home Assistant command {:?} on {}: {:?}", msg.payload, msg.topic, e);
                return;
            }
        };

        tracing::info!("Received Home Assistant command for {}: {:?}", entity.key, action);

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.execute(action.clone()).await {
                tracing::error!("Error executing PV dimmer action {:?}: {:?}", action, e);
            }
        });
    }
}

fn entity_for_topic<'a>(
    entities: &'a [EntityDescription],
    topics: &HaTopics,
    topic: &str,
) -> Option<&'a EntityDescription> {
    entities.iter().find(|e| !e.is_read_only() && topics.command(e) == topic)
}

trait MqttPublish {
    async fn publish(&self, msg: MqttOutMessage) -> anyhow::Result<()>;
}

impl MqttPublish for MqttSender {
    async fn publish(&self, msg: MqttOutMessage) -> anyhow::Result<()> {
        self.send(msg).await
    }
}

/// Mirrors the coordinator into retained MQTT messages. State payloads that did not change
/// since the last publish are skipped until the next (re)connect.
struct EntityPublisher<P> {
    entities: Vec<EntityDescription>,
    topics: HaTopics,
    device: DeviceInfo,
    dimmer_name: String,
    mqtt: P,
    snapshot: Option<Arc<DeviceSnapshot>>,
    last_backup: Option<DateTime<Local>>,
    available: bool,
    last_sent: HashMap<String, String>,
}

impl<P: MqttPublish> EntityPublisher<P> {
    fn new(
        entities: Vec<EntityDescription>,
        topics: HaTopics,
        device: DeviceInfo,
        dimmer_name: String,
        mqtt: P,
    ) -> Self {
        Self {
            entities,
            topics,
            device,
            dimmer_name,
            mqtt,
            snapshot: None,
            last_backup: None,
            available: false,
            last_sent: HashMap::new(),
        }
    }

    /// Registers all entities and publishes the current state from scratch.
    async fn announce(&mut self) {
        tracing::info!(
            "Registering {} PV dimmer entities with Home Assistant",
            self.entities.len()
        );

        self.last_sent.clear();

        for entity in self.entities.iter() {
            let payload = discovery_payload(entity, &self.topics, &self.device, &self.dimmer_name);
            let msg = MqttOutMessage::retained(self.topics.config(entity), payload.to_string());

            if let Err(e) = self.mqtt.publish(msg).await {
                tracing::error!("Error registering entity {} with Home Assistant: {:?}", entity.key, e);
            }
        }

        self.publish_current().await;
    }

    async fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Updated(snapshot) => {
                self.snapshot = Some(snapshot);
                self.available = true;
            }
            CoordinatorEvent::UpdateFailed(e) => {
                tracing::warn!("PV dimmer unavailable: {}", e);
                self.available = false;
            }
            CoordinatorEvent::BackupChanged(time) => {
                self.last_backup = Some(time);
            }
        }

        self.publish_current().await;
    }

    async fn publish_current(&mut self) {
        let Some(snapshot) = self.snapshot.clone().filter(|_| self.available) else {
            self.send(self.topics.availability(), PAYLOAD_OFFLINE).await;
            return;
        };

        let ctx = EntityContext {
            snapshot: Some(&snapshot),
            last_backup: self.last_backup,
        };

        let states: Vec<(String, String)> = self
            .entities
            .iter()
            .filter_map(|entity| entity.state(&ctx).map(|state| (self.topics.state(entity), state)))
            .collect();

        self.send(self.topics.availability(), PAYLOAD_ONLINE).await;

        for (topic, state) in states {
            self.send(topic, state).await;
        }
    }

    async fn send(&mut self, topic: String, payload: impl Into<String>) {
        let payload = payload.into();

        if self.last_sent.get(&topic) == Some(&payload) {
            tracing::trace!("Skipping unchanged state on {}", topic);
            return;
        }

        match self.mqtt.publish(MqttOutMessage::retained(topic.clone(), payload.clone())).await {
            Ok(()) => {
                self.last_sent.insert(topic, payload);
            }
            Err(e) => {
                tracing::error!("Error publishing state to {}: {:?}", topic, e);
            }
        }
    }
}
