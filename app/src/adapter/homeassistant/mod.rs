mod discovery;
mod runtime;

use infrastructure::{Mqtt, MqttLastWill};
use serde::Deserialize;

pub use runtime::HomeAssistantRunner;

use crate::{
    coordinator::CoordinatorRunner,
    dimmer::DimmerSettings,
    entity::{DeviceInfo, EntityDescription, Platform, all_entities},
};

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";

#[derive(Debug, Deserialize, Clone)]
pub struct HomeAssistant {
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
}

impl Default for HomeAssistant {
    fn default() -> Self {
        Self {
            discovery_prefix: default_discovery_prefix(),
            base_topic: default_base_topic(),
        }
    }
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_base_topic() -> String {
    "pvdimmer".to_string()
}

impl HomeAssistant {
    pub fn topics(&self, dimmer_name: &str) -> HaTopics {
        HaTopics {
            discovery_prefix: self.discovery_prefix.clone(),
            base_topic: self.base_topic.clone(),
            node: node_id(dimmer_name),
        }
    }

    pub fn last_will(&self, dimmer_name: &str) -> MqttLastWill {
        MqttLastWill {
            topic: self.topics(dimmer_name).availability(),
            payload: PAYLOAD_OFFLINE.to_string(),
        }
    }

    pub async fn new_runner(
        &self,
        mqtt: &mut Mqtt,
        coordinator: &CoordinatorRunner,
        dimmer: &DimmerSettings,
        dimmer_name: &str,
    ) -> anyhow::Result<HomeAssistantRunner> {
        let topics = self.topics(dimmer_name);
        let commands = mqtt.subscribe(topics.command_subscription()).await?;

        let device = DeviceInfo::new(dimmer_name, &dimmer.configuration_url(), dimmer.mac_address.as_deref());

        Ok(HomeAssistantRunner::new(
            all_entities(dimmer.include_state_entities),
            topics,
            device,
            dimmer_name.to_string(),
            coordinator.client(),
            coordinator.subscribe(),
            commands,
            mqtt.connections(),
            mqtt.sender(),
        ))
    }
}

/// Component the entity is announced as. MQTT discovery has no time entity, times are texts.
fn component(entity: &EntityDescription) -> Platform {
    match entity.platform() {
        Platform::Time => Platform::Text,
        platform => platform,
    }
}

fn node_id(dimmer_name: &str) -> String {
    dimmer_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct HaTopics {
    discovery_prefix: String,
    base_topic: String,
    node: String,
}

impl HaTopics {
    pub fn availability(&self) -> String {
        format!("{}/{}/availability", self.base_topic, self.node)
    }

    pub fn config(&self, entity: &EntityDescription) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix,
            component(entity),
            self.node,
            entity.object_id()
        )
    }

    pub fn state(&self, entity: &EntityDescription) -> String {
        format!("{}/state", self.entity_base(entity))
    }

    pub fn command(&self, entity: &EntityDescription) -> String {
        format!("{}/set", self.entity_base(entity))
    }

    pub fn command_subscription(&self) -> String {
        format!("{}/{}/+/+/set", self.base_topic, self.node)
    }

    fn entity_base(&self, entity: &EntityDescription) -> String {
        format!("{}/{}/{}/{}", self.base_topic, self.node, component(entity), entity.object_id())
    }
}
