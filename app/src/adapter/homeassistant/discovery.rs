use serde_json::{Map, Value, json};

use super::{HaTopics, PAYLOAD_OFFLINE, PAYLOAD_ONLINE};
use crate::entity::{DeviceInfo, EntityDescription, EntityKind};

const TIME_PATTERN: &str = "^([01]?[0-9]|2[0-3]):[0-5][0-9]$";

/// Discovery config announcing `entity` to Home Assistant.
pub fn discovery_payload(
    entity: &EntityDescription,
    topics: &HaTopics,
    device: &DeviceInfo,
    dimmer_name: &str,
) -> Value {
    let mut payload = Map::new();

    payload.insert("name".to_string(), json!(entity.name));
    payload.insert("unique_id".to_string(), json!(entity.unique_id(dimmer_name)));
    payload.insert("availability_topic".to_string(), json!(topics.availability()));
    payload.insert("payload_available".to_string(), json!(PAYLOAD_ONLINE));
    payload.insert("payload_not_available".to_string(), json!(PAYLOAD_OFFLINE));
    payload.insert("device".to_string(), json!(device));

    insert_opt(&mut payload, "icon", entity.icon);
    insert_opt(&mut payload, "device_class", entity.device_class);
    insert_opt(&mut payload, "unit_of_measurement", entity.unit);

    if !matches!(entity.kind, EntityKind::Button(_)) {
        payload.insert("state_topic".to_string(), json!(topics.state(entity)));
    }

    if !entity.is_read_only() {
        payload.insert("command_topic".to_string(), json!(topics.command(entity)));
    }

    match &entity.kind {
        EntityKind::Number { range, mode, .. } => {
            payload.insert("min".to_string(), json!(range.min));
            payload.insert("max".to_string(), json!(range.max));
            payload.insert("step".to_string(), json!(range.step));
            payload.insert("mode".to_string(), json!(mode));
        }
        EntityKind::Select { options } => {
            let labels: Vec<&str> = options.iter().map(|(_, label)| *label).collect();
            payload.insert("options".to_string(), json!(labels));
        }
        EntityKind::Sensor { state_class } => {
            insert_opt(&mut payload, "state_class", *state_class);
        }
        EntityKind::Text { mode } => {
            payload.insert("mode".to_string(), json!(mode));
        }
        EntityKind::Time => {
            payload.insert("pattern".to_string(), json!(TIME_PATTERN));
            payload.insert("min".to_string(), json!(4));
            payload.insert("max".to_string(), json!(5));
        }
        EntityKind::BinarySensor | EntityKind::Switch | EntityKind::Button(_) => {}
    }

    Value::Object(payload)
}

fn insert_opt(payload: &mut Map<String, Value>, key: &str, value: Option<&'static str>) {
    if let Some(value) = value {
        payload.insert(key.to_string(), json!(value));
    }
}
