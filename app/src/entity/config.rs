use super::{
    ButtonAction, Cast, EntityDescription, EntityKind, NumberMode, NumberRange, NumberTarget, TextMode, ValueSource,
};

const CHILD_MODE_OPTIONS: &[(&str, &str)] = &[("off", "Off"), ("delester", "Unload"), ("equal", "Equal")];

/// Every entity of the dimmer. State entities are left out unless `include_state_entities` is set.
pub fn all_entities(include_state_entities: bool) -> Vec<EntityDescription> {
    [
        binary_sensors(),
        buttons(),
        numbers(),
        selects(),
        sensors(),
        switches(),
        texts(),
        times(),
    ]
    .into_iter()
    .flatten()
    .filter(|e| include_state_entities || !e.state_entity)
    .collect()
}

fn binary_sensors() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new("state.minuteur", "Timer", EntityKind::BinarySensor)
            .unique_id_key("timer")
            .icon("mdi:timer")
            .device_class("running"),
    ]
}

fn buttons() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new("restart", "Restart", EntityKind::Button(ButtonAction::Restart)).icon("mdi:restart-alert"),
        EntityDescription::new("refresh", "Refresh", EntityKind::Button(ButtonAction::Refresh)).icon("mdi:refresh-circle"),
        EntityDescription::new("resetwifi", "Reset WIFI settings", EntityKind::Button(ButtonAction::ResetWifi))
            .icon("mdi:wifi-cog"),
        EntityDescription::new("backup", "Backup configuration", EntityKind::Button(ButtonAction::Backup))
            .icon("mdi:content-save-cog"),
        EntityDescription::new("restore", "Restore configuration", EntityKind::Button(ButtonAction::Restore))
            .icon("mdi:backup-restore"),
    ]
}

fn config_number(max: f64) -> EntityKind {
    EntityKind::Number {
        target: NumberTarget::Config,
        range: NumberRange {
            max,
            ..NumberRange::default()
        },
        mode: NumberMode::Box,
    }
}

fn timer_number() -> EntityKind {
    EntityKind::Number {
        target: NumberTarget::Timer,
        range: NumberRange::default(),
        mode: NumberMode::Box,
    }
}

fn mqtt_number() -> EntityKind {
    EntityKind::Number {
        target: NumberTarget::Config,
        range: NumberRange {
            min: 1.0,
            max: 65535.0,
            step: 1.0,
        },
        mode: NumberMode::Box,
    }
}

fn numbers() -> Vec<EntityDescription> {
    vec![
        //
        // GENERAL CONFIGURATION
        //
        EntityDescription::new("config.trigger", "Trigger", config_number(100.0))
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent"),
        EntityDescription::new("config.charge1", "Load 1 (Dimmer)", config_number(10000.0))
            .unique_id_key("config_load1")
            .unit("W")
            .device_class("power")
            .icon("mdi:meter-electric"),
        EntityDescription::new("config.charge2", "Load 2 (Jotta)", config_number(10000.0))
            .unique_id_key("config_load2")
            .unit("W")
            .device_class("power")
            .icon("mdi:meter-electric"),
        EntityDescription::new("config.charge3", "Load 3 (relay 2)", config_number(10000.0))
            .unique_id_key("config_load3")
            .unit("W")
            .device_class("power")
            .icon("mdi:meter-electric"),
        //
        // MQTT
        //
        EntityDescription::new("mqtt.port", "MQTT port", mqtt_number())
            .unique_id_key("config_mqtt_port")
            .icon("mdi:network"),
        EntityDescription::new("mqtt.idxtemp", "MQTT Domoticz IDX temperature", mqtt_number())
            .unique_id_key("config_mqtt_domoticz_idx_temperature")
            .icon("mdi:numeric"),
        EntityDescription::new("mqtt.IDX", "MQTT Domoticz IDX power", mqtt_number())
            .unique_id_key("config_mqtt_domoticz_idx_power")
            .icon("mdi:numeric"),
        EntityDescription::new("mqtt.IDXAlarme", "MQTT Domoticz IDX alarm", mqtt_number())
            .unique_id_key("config_mqtt_domoticz_idx_alarm")
            .icon("mdi:numeric"),
        //
        // TIMERS
        //
        EntityDescription::new("dimmer_timer.temperature", "Dimmer timer temperature", timer_number())
            .unique_id_key("config_dimmer_timer_temperature")
            .unit("°C")
            .device_class("temperature")
            .icon("mdi:thermometer"),
        EntityDescription::new("relay1_timer.temperature", "Relay 1 timer temperature", timer_number())
            .unique_id_key("config_relay1_timer_temperature")
            .unit("°C")
            .device_class("temperature")
            .icon("mdi:thermometer"),
        EntityDescription::new("relay2_timer.temperature", "Relay 2 timer temperature", timer_number())
            .unique_id_key("config_relay2_timer_temperature")
            .unit("°C")
            .device_class("temperature")
            .icon("mdi:thermometer"),
        EntityDescription::new("dimmer_timer.puissance", "Dimmer timer puissance", timer_number())
            .unique_id_key("config_dimmer_timer_puissance")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent"),
        EntityDescription::new("relay1_timer.puissance", "Relay 1 timer puissance", timer_number())
            .unique_id_key("config_relay1_timer_puissance")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent"),
        EntityDescription::new("relay2_timer.puissance", "Relay 2 timer puissance", timer_number())
            .unique_id_key("config_relay2_timer_puissance")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent"),
        //
        // STATE
        //
        EntityDescription::new(
            "state.power",
            "Power",
            EntityKind::Number {
                target: NumberTarget::Power,
                range: NumberRange::default(),
                mode: NumberMode::Auto,
            },
        )
        .unique_id_key("power")
        .unit("%")
        .device_class("power_factor")
        .icon("mdi:percent")
        .cast(Cast::Float)
        .state_entity(),
        EntityDescription::new("config.startingpow", "MQTT Dimmer starting power", config_number(100.0))
            .unique_id_key("config_mqtt_dimmer_start_power")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent")
            .state_entity(),
        EntityDescription::new("config.minpow", "Min power", config_number(100.0))
            .unique_id_key("config_minpower")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent")
            .state_entity(),
        EntityDescription::new("config.maxpow", "Max power", config_number(100.0))
            .unique_id_key("config_maxpower")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent")
            .state_entity(),
        EntityDescription::new("config.maxtemp", "Max temperature", config_number(100.0))
            .unit("°C")
            .device_class("temperature")
            .icon("mdi:thermometer")
            .state_entity(),
    ]
}

fn selects() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new(
            "config.delester",
            "Child mode",
            EntityKind::Select {
                options: CHILD_MODE_OPTIONS,
            },
        )
        .config_key("mode")
        .unique_id_key("config_child_mode")
        .icon("mdi:ip-network")
        .state_entity(),
    ]
}

fn measurement() -> EntityKind {
    EntityKind::Sensor {
        state_class: Some("measurement"),
    }
}

fn sensors() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new("state.temperature", "Temperature", measurement())
            .unique_id_key("temperature")
            .unit("°C")
            .device_class("temperature")
            .icon("mdi:thermometer")
            .cast(Cast::Float)
            .state_entity(),
        EntityDescription::new("state.power", "Power", measurement())
            .unique_id_key("power")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent")
            .cast(Cast::Float)
            .state_entity(),
        EntityDescription::new("state.Ptotal", "Total power", measurement())
            .unique_id_key("total_power")
            .unit("%")
            .device_class("power_factor")
            .icon("mdi:percent")
            .cast(Cast::Float)
            .state_entity(),
        EntityDescription::new("state.alerte", "Warning", EntityKind::Sensor { state_class: None })
            .unique_id_key("warning")
            .icon("mdi:alert-circle")
            .cast(Cast::NoProblemIfEmpty)
            .state_entity(),
        EntityDescription::new("last_backup", "Last backup", EntityKind::Sensor { state_class: None })
            .source(ValueSource::LastBackup)
            .device_class("timestamp")
            .icon("mdi:archive-clock-outline")
            .state_entity(),
    ]
}

fn switches() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new("state.onoff", "Dimmer", EntityKind::Switch)
            .config_key("dimmer_on_off")
            .unique_id_key("dimmer")
            .device_class("switch")
            .icon("mdi:toggle-switch-variant-off")
            .state_entity(),
        EntityDescription::new("state.relay1", "Relay 1", EntityKind::Switch)
            .config_key("relay1")
            .unique_id_key("relay1")
            .device_class("switch")
            .icon("mdi:toggle-switch-variant-off")
            .state_entity(),
        EntityDescription::new("state.relay2", "Relay 2", EntityKind::Switch)
            .config_key("relay2")
            .unique_id_key("relay2")
            .device_class("switch")
            .icon("mdi:toggle-switch-variant-off")
            .state_entity(),
    ]
}

fn text() -> EntityKind {
    EntityKind::Text { mode: TextMode::Text }
}

fn texts() -> Vec<EntityDescription> {
    vec![
        EntityDescription::new("config.child", "Child address", text())
            .unique_id_key("config_child_address")
            .icon("mdi:ip-network"),
        EntityDescription::new("config.dimmername", "Hostname", text())
            .unique_id_key("config_hostname")
            .icon("mdi:form-textbox"),
        EntityDescription::new("config.SubscribePV", "MQTT Dimmer power subscription", text())
            .unique_id_key("config_mqtt_dimmer_power_subscription")
            .icon("mdi:form-textbox"),
        EntityDescription::new("config.SubscribeTEMP", "MQTT Dimmer temperature subscription", text())
            .unique_id_key("config_mqtt_dimmer_temp_subscription")
            .icon("mdi:form-textbox"),
        EntityDescription::new("config.DALLAS", "Master DALLAS address", text())
            .unique_id_key("config_master_dallas_address")
            .icon("mdi:form-textbox"),
        EntityDescription::new("mqtt.server", "MQTT Server", text())
            .config_key("hostname")
            .unique_id_key("config_mqtt_server")
            .icon("mdi:ip-network"),
        EntityDescription::new("mqtt.user", "MQTT user", text())
            .config_key("mqttuser")
            .unique_id_key("config_mqtt_user")
            .icon("mdi:shield-account"),
        EntityDescription::new(
            "mqtt.password",
            "MQTT password",
            EntityKind::Text {
                mode: TextMode::Password,
            },
        )
        .config_key("mqttpassword")
        .unique_id_key("config_mqtt_password")
        .icon("mdi:form-textbox-password"),
        EntityDescription::new("mqtt.topic", "MQTT Domoticz topic", text())
            .config_key("Publish")
            .unique_id_key("config_mqtt_domoticz_topic")
            .icon("mdi:form-textbox"),
    ]
}

fn time(key: &'static str, name: &'static str, unique_id_key: &'static str) -> EntityDescription {
    EntityDescription::new(key, name, EntityKind::Time)
        .unique_id_key(unique_id_key)
        .icon("mdi:hours-24")
}

fn times() -> Vec<EntityDescription> {
    vec![
        time("dimmer_timer.heure_demarrage", "Dimmer timer start hour", "config_dimmer_timer_start_hour"),
        time("dimmer_timer.heure_arret", "Dimmer timer stop hour", "config_dimmer_timer_stop_hour"),
        time("relay1_timer.heure_demarrage", "Relay 1 timer start hour", "config_relay1_timer_start_hour"),
        time("relay1_timer.heure_arret", "Relay 1 timer stop hour", "config_relay1_timer_stop_hour"),
        time("relay2_timer.heure_demarrage", "Relay 2 timer start hour", "config_relay2_timer_start_hour"),
        time("relay2_timer.heure_arret", "Relay 2 timer stop hour", "config_relay2_timer_stop_hour"),
    ]
}
