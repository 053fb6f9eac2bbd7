use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::path;

/// Merged result of one complete poll of the dimmer, keyed by section
/// (`state`, `config`, `mqtt`, `dimmer_timer`, `relay1_timer`, `relay2_timer`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DeviceSnapshot(Value);

impl DeviceSnapshot {
    pub fn from_sections(sections: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self(Value::Object(sections.into_iter().collect()))
    }

    pub fn get(&self, key_chain: &str) -> Option<&Value> {
        path::lookup(&self.0, key_chain)
    }

    pub fn get_or<'a>(&'a self, key_chain: &str, default: &'a Value) -> &'a Value {
        path::lookup_or(&self.0, key_chain, default)
    }

    pub fn dimmer_name(&self) -> Option<&str> {
        self.get("config.dimmername")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn to_value(&self) -> Value {
        self.0.clone()
    }
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl From<DeviceSnapshot> for Value {
    fn from(snapshot: DeviceSnapshot) -> Self {
        snapshot.0
    }
}

impl TryFrom<Value> for DeviceSnapshot {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(_) => Ok(Self(value)),
            other => anyhow::bail!("Device snapshot must be a JSON object, got {}", other),
        }
    }
}
