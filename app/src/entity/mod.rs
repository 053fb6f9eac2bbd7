mod config;

pub use config::all_entities;

use chrono::{DateTime, Local, NaiveTime};
use serde::Serialize;
use serde_json::Value;

use crate::coordinator::DeviceAction;
use crate::core::DeviceSnapshot;
use crate::dimmer::{DOMAIN, DimmerCommand, MANUFACTURER, param_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Platform {
    #[display("binary_sensor")]
    BinarySensor,
    #[display("button")]
    Button,
    #[display("number")]
    Number,
    #[display("select")]
    Select,
    #[display("sensor")]
    Sensor,
    #[display("switch")]
    Switch,
    #[display("text")]
    Text,
    #[display("time")]
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Restart,
    Refresh,
    ResetWifi,
    Backup,
    Restore,
}

/// Where a number entity writes its value to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberTarget {
    Config,
    Power,
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberMode {
    Auto,
    Box,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    Text,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for NumberRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
            step: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    BinarySensor,
    Button(ButtonAction),
    Number {
        target: NumberTarget,
        range: NumberRange,
        mode: NumberMode,
    },
    Select {
        options: &'static [(&'static str, &'static str)],
    },
    Sensor {
        state_class: Option<&'static str>,
    },
    Switch,
    Text {
        mode: TextMode,
    },
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Snapshot,
    LastBackup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    Float,
    NoProblemIfEmpty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: Option<&'static str>,
    pub unique_id_key: Option<&'static str>,
    pub config_key: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub source: ValueSource,
    pub cast: Option<Cast>,
    pub kind: EntityKind,
    pub state_entity: bool,
}

/// Data an entity reads its state from.
#[derive(Debug, Clone, Copy)]
pub struct EntityContext<'a> {
    pub snapshot: Option<&'a DeviceSnapshot>,
    pub last_backup: Option<DateTime<Local>>,
}

impl EntityDescription {
    fn new(key: &'static str, name: &'static str, kind: EntityKind) -> Self {
        Self {
            key,
            name,
            icon: None,
            unique_id_key: None,
            config_key: None,
            device_class: None,
            unit: None,
            source: ValueSource::Snapshot,
            cast: None,
            kind,
            state_entity: false,
        }
    }

    fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    fn unique_id_key(mut self, unique_id_key: &'static str) -> Self {
        self.unique_id_key = Some(unique_id_key);
        self
    }

    fn config_key(mut self, config_key: &'static str) -> Self {
        self.config_key = Some(config_key);
        self
    }

    fn device_class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }

    fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    fn source(mut self, source: ValueSource) -> Self {
        self.source = source;
        self
    }

    fn cast(mut self, cast: Cast) -> Self {
        self.cast = Some(cast);
        self
    }

    fn state_entity(mut self) -> Self {
        self.state_entity = true;
        self
    }

    pub fn platform(&self) -> Platform {
        match self.kind {
            EntityKind::BinarySensor => Platform::BinarySensor,
            EntityKind::Button(_) => Platform::Button,
            EntityKind::Number { .. } => Platform::Number,
            EntityKind::Select { .. } => Platform::Select,
            EntityKind::Sensor { .. } => Platform::Sensor,
            EntityKind::Switch => Platform::Switch,
            EntityKind::Text { .. } => Platform::Text,
            EntityKind::Time => Platform::Time,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.kind, EntityKind::Sensor { .. } | EntityKind::BinarySensor)
    }

    /// Identifier of the entity within its device.
    pub fn object_id(&self) -> String {
        match self.unique_id_key {
            Some(key) => key.to_string(),
            None => self.key.replace('.', "_"),
        }
    }

    pub fn unique_id(&self, dimmer_name: &str) -> String {
        format!("{}_{}", dimmer_name, self.object_id())
    }

    pub fn config_key_or_default(&self) -> &'static str {
        self.config_key
            .unwrap_or_else(|| self.key.rsplit('.').next().unwrap_or(self.key))
    }

    /// Timer a timer entity belongs to (`relay1_timer.temperature` -> `relay1`).
    pub fn timer(&self) -> &'static str {
        self.key.split('_').next().unwrap_or(self.key)
    }

    pub fn native_value(&self, ctx: &EntityContext) -> Option<Value> {
        let value = match self.source {
            ValueSource::Snapshot => ctx.snapshot?.get_or(self.key, &Value::Null).clone(),
            ValueSource::LastBackup => ctx.last_backup.map_or(Value::Null, |time| Value::String(time.to_rfc3339())),
        };

        if value.is_null() {
            return None;
        }

        match self.cast {
            None => Some(value),
            Some(Cast::Float) => as_float(&value).map(Value::from),
            Some(Cast::NoProblemIfEmpty) if is_truthy(&value) => Some(value),
            Some(Cast::NoProblemIfEmpty) => Some(Value::String("No problem".to_string())),
        }
    }

    /// State payload as published for this entity. `None` means unknown.
    pub fn state(&self, ctx: &EntityContext) -> Option<String> {
        match &self.kind {
            EntityKind::Button(_) => None,
            EntityKind::BinarySensor | EntityKind::Switch => {
                let on = self.native_value(ctx).is_some_and(|v| is_truthy(&v));
                Some(if on { "ON" } else { "OFF" }.to_string())
            }
            EntityKind::Number { .. } => self
                .native_value(ctx)
                .and_then(|v| as_float(&v))
                .map(|v| v.to_string()),
            EntityKind::Select { options } => {
                let raw = param_value(&self.native_value(ctx)?);
                options
                    .iter()
                    .find(|(value, _)| *value == raw)
                    .map(|(_, label)| label.to_string())
            }
            EntityKind::Time => {
                let raw = self.native_value(ctx)?;
                match parse_time(&param_value(&raw)) {
                    Some(time) => Some(time.format("%H:%M").to_string()),
                    None => {
                        tracing::warn!("Invalid time {} for {}", raw, self.key);
                        None
                    }
                }
            }
            EntityKind::Sensor { .. } | EntityKind::Text { .. } => {
                self.native_value(ctx).map(|v| param_value(&v))
            }
        }
    }

    /// Translates a command payload into the action the coordinator runs.
    pub fn command(&self, payload: &str) -> anyhow::Result<DeviceAction> {
        let payload = payload.trim();

        let command = match &self.kind {
            EntityKind::BinarySensor | EntityKind::Sensor { .. } => {
                anyhow::bail!("{} is read-only", self.key)
            }
            EntityKind::Button(action) => {
                return Ok(match action {
                    ButtonAction::Restart => DeviceAction::Command(DimmerCommand::Restart),
                    ButtonAction::ResetWifi => DeviceAction::Command(DimmerCommand::ResetWifi),
                    ButtonAction::Refresh => DeviceAction::Refresh,
                    ButtonAction::Backup => DeviceAction::Backup,
                    ButtonAction::Restore => DeviceAction::Restore,
                });
            }
            EntityKind::Number { target, range, .. } => {
                let value: f64 = payload
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid number {:?} for {}: {}", payload, self.key, e))?;

                if !value.is_finite() || value < range.min || value > range.max {
                    anyhow::bail!(
                        "Number {} for {} is outside {}..={}",
                        payload,
                        self.key,
                        range.min,
                        range.max
                    );
                }

                match target {
                    NumberTarget::Config => DimmerCommand::set_config(self.config_key_or_default(), value.trunc() as i64),
                    NumberTarget::Power => DimmerCommand::SetPower(value),
                    NumberTarget::Timer => {
                        DimmerCommand::set_timer(self.timer(), self.config_key_or_default(), value.trunc() as i64)
                    }
                }
            }
            EntityKind::Switch => {
                let on = match payload.to_ascii_uppercase().as_str() {
                    "ON" | "1" | "TRUE" => true,
                    "OFF" | "0" | "FALSE" => false,
                    _ => anyhow::bail!("Invalid switch payload {:?} for {}", payload, self.key),
                };
                DimmerCommand::set_config(self.config_key_or_default(), on as u8)
            }
            EntityKind::Select { options } => {
                let Some((value, _)) = options.iter().find(|(_, label)| *label == payload) else {
                    anyhow::bail!("Unknown option {:?} for {}", payload, self.key)
                };
                DimmerCommand::set_config(self.config_key_or_default(), value)
            }
            EntityKind::Text { .. } => DimmerCommand::set_config(self.config_key_or_default(), payload),
            EntityKind::Time => {
                let Some(time) = parse_time(payload) else {
                    anyhow::bail!("Invalid time {:?} for {}", payload, self.key)
                };
                DimmerCommand::set_timer(self.timer(), self.config_key_or_default(), time.format("%H:%M"))
            }
        };

        Ok(DeviceAction::Command(command))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub configuration_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<(String, String)>,
}

impl DeviceInfo {
    pub fn new(dimmer_name: &str, configuration_url: &str, mac_address: Option<&str>) -> Self {
        Self {
            name: dimmer_name.to_string(),
            identifiers: vec![format!("{}_{}", DOMAIN, dimmer_name)],
            manufacturer: MANUFACTURER.to_string(),
            configuration_url: configuration_url.to_string(),
            connections: mac_address
                .map(|mac| vec![("mac".to_string(), mac.to_lowercase())])
                .unwrap_or_default(),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn find(key: &str, platform: Platform) -> EntityDescription {
        all_entities(true)
            .into_iter()
            .find(|e| e.key == key && e.platform() == platform)
            .unwrap()
    }

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot::try_from(json!({
            "state": {"power": "42", "temperature": 51.5, "onoff": 1, "relay1": 0, "alerte": "", "minuteur": true},
            "config": {"delester": "equal", "maxtemp": 60, "dimmername": "pvrouter"},
            "mqtt": {"topic": "domoticz/in", "password": "secret"},
            "relay1_timer": {"heure_demarrage": "7:05"}
        }))
        .unwrap()
    }

    fn ctx(snapshot: &DeviceSnapshot) -> EntityContext<'_> {
        EntityContext {
            snapshot: Some(snapshot),
            last_backup: None,
        }
    }

    #[test]
    fn unique_id_uses_explicit_key_or_path() {
        assert_eq!(find("config.charge1", Platform::Number).unique_id("pvrouter"), "pvrouter_config_load1");
        assert_eq!(find("config.maxtemp", Platform::Number).unique_id("pvrouter"), "pvrouter_config_maxtemp");
    }

    #[test]
    fn config_key_defaults_to_last_path_segment() {
        assert_eq!(find("config.maxtemp", Platform::Number).config_key_or_default(), "maxtemp");
        assert_eq!(find("mqtt.server", Platform::Text).config_key_or_default(), "hostname");
    }

    #[test]
    fn casts_values() {
        let snapshot = snapshot();
        let ctx = ctx(&snapshot);

        assert_eq!(find("state.power", Platform::Sensor).native_value(&ctx), Some(json!(42.0)));
        assert_eq!(find("state.alerte", Platform::Sensor).native_value(&ctx), Some(json!("No problem")));
        assert_eq!(find("state.Ptotal", Platform::Sensor).native_value(&ctx), None);
    }

    #[test]
    fn missing_warning_stays_unknown() {
        let snapshot = DeviceSnapshot::try_from(json!({"state": {"power": 1}})).unwrap();

        assert_eq!(find("state.alerte", Platform::Sensor).native_value(&ctx(&snapshot)), None);
        assert_eq!(find("state.alerte", Platform::Sensor).state(&ctx(&snapshot)), None);
    }

    #[test]
    fn domoticz_topic_shows_configured_value() {
        let snapshot = snapshot();
        assert_eq!(
            find("mqtt.topic", Platform::Text).state(&ctx(&snapshot)),
            Some("domoticz/in".to_string())
        );
    }

    #[test]
    fn renders_states_per_platform() {
        let snapshot = snapshot();
        let ctx = ctx(&snapshot);

        assert_eq!(find("state.onoff", Platform::Switch).state(&ctx), Some("ON".to_string()));
        assert_eq!(find("state.relay1", Platform::Switch).state(&ctx), Some("OFF".to_string()));
        assert_eq!(find("state.relay2", Platform::Switch).state(&ctx), Some("OFF".to_string()));
        assert_eq!(find("state.minuteur", Platform::BinarySensor).state(&ctx), Some("ON".to_string()));
        assert_eq!(find("config.delester", Platform::Select).state(&ctx), Some("Equal".to_string()));
        assert_eq!(find("config.maxtemp", Platform::Number).state(&ctx), Some("60".to_string()));
        assert_eq!(find("relay1_timer.heure_demarrage", Platform::Time).state(&ctx), Some("07:05".to_string()));
        assert_eq!(find("relay2_timer.heure_arret", Platform::Time).state(&ctx), None);
        assert_eq!(find("restart", Platform::Button).state(&ctx), None);
    }

    #[test]
    fn last_backup_sensor_reads_backup_time() {
        let time = DateTime::parse_from_rfc3339("2024-05-01T10:22:33+02:00")
            .unwrap()
            .with_timezone(&Local);
        let ctx = EntityContext {
            snapshot: None,
            last_backup: Some(time),
        };

        assert_eq!(
            find("last_backup", Platform::Sensor).state(&ctx),
            Some(time.to_rfc3339())
        );
    }

    #[test]
    fn parses_number_commands() {
        assert_eq!(
            find("config.maxtemp", Platform::Number).command("65.7").unwrap(),
            DeviceAction::Command(DimmerCommand::set_config("maxtemp", 65))
        );
        assert_eq!(
            find("state.power", Platform::Number).command("45.5").unwrap(),
            DeviceAction::Command(DimmerCommand::SetPower(45.5))
        );
        assert_eq!(
            find("relay2_timer.temperature", Platform::Number).command("40").unwrap(),
            DeviceAction::Command(DimmerCommand::set_timer("relay2", "temperature", 40))
        );
        assert!(find("config.maxtemp", Platform::Number).command("hot").is_err());
        assert!(find("config.maxtemp", Platform::Number).command("NaN").is_err());
        assert!(find("config.maxtemp", Platform::Number).command("inf").is_err());
        assert!(find("config.maxtemp", Platform::Number).command("101").is_err());
        assert!(find("mqtt.port", Platform::Number).command("0").is_err());
    }

    #[test]
    fn parses_switch_select_text_and_time_commands() {
        assert_eq!(
            find("state.onoff", Platform::Switch).command("ON").unwrap(),
            DeviceAction::Command(DimmerCommand::set_config("dimmer_on_off", 1))
        );
        assert_eq!(
            find("config.delester", Platform::Select).command("Unload").unwrap(),
            DeviceAction::Command(DimmerCommand::set_config("mode", "delester"))
        );
        assert!(find("config.delester", Platform::Select).command("Maybe").is_err());
        assert_eq!(
            find("mqtt.user", Platform::Text).command("bob").unwrap(),
            DeviceAction::Command(DimmerCommand::set_config("mqttuser", "bob"))
        );
        assert_eq!(
            find("dimmer_timer.heure_arret", Platform::Time).command("6:30").unwrap(),
            DeviceAction::Command(DimmerCommand::set_timer("dimmer", "heure_arret", "06:30"))
        );
    }

    #[test]
    fn buttons_map_to_actions_and_sensors_are_read_only() {
        assert_eq!(
            find("restart", Platform::Button).command("PRESS").unwrap(),
            DeviceAction::Command(DimmerCommand::Restart)
        );
        assert_eq!(find("backup", Platform::Button).command("PRESS").unwrap(), DeviceAction::Backup);
        assert!(find("state.temperature", Platform::Sensor).command("12").is_err());
    }

    #[test]
    fn device_info_carries_identifiers() {
        let info = DeviceInfo::new("pvrouter", "http://192.168.1.40", Some("24:6F:28:AA:BB:CC"));

        assert_eq!(info.identifiers, vec!["appersolaire_pvdimmer_pvrouter".to_string()]);
        assert_eq!(info.connections, vec![("mac".to_string(), "24:6f:28:aa:bb:cc".to_string())]);
    }
}
