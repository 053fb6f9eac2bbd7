use config::{Config, ConfigError, Environment, File};
use infrastructure::{HttpServerConfig, MonitoringConfig, MqttConfig};
use serde::Deserialize;

use crate::{adapter::homeassistant::HomeAssistant, dimmer::DimmerSettings};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub dimmer: DimmerSettings,
    pub mqtt: MqttConfig,
    pub http_server: HttpServerConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub homeassistant: HomeAssistant,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml"))
            .add_source(Environment::with_prefix("PVDIMMER").separator("__"));

        builder.build()?.try_deserialize()
    }

    #[cfg(test)]
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn reads_settings_with_defaults() {
        let settings = Settings::from_toml(
            r#"
            [dimmer]
            host = "192.168.1.40"

            [mqtt]
            host = "broker.local"
            port = 1883
            client_id = "pvdimmer-bridge"

            [http_server]
            port = 8080

            [monitoring]
            service_name = "pvdimmer-bridge"
            "#,
        )
        .unwrap();

        assert_eq!(settings.dimmer.host, "192.168.1.40");
        assert_eq!(settings.dimmer.refresh_rate, 60);
        assert_eq!(settings.dimmer.timeout, 5);
        assert!(settings.dimmer.include_state_entities);
        assert_eq!(settings.dimmer.mac_address, None);
        assert_eq!(settings.dimmer.backup_dir, PathBuf::from("."));
        assert_eq!(settings.http_server.bind_address, "0.0.0.0");
        assert_eq!(settings.homeassistant.discovery_prefix, "homeassistant");
        assert_eq!(settings.homeassistant.base_topic, "pvdimmer");
    }

    #[test]
    fn fails_without_dimmer_host() {
        let result = Settings::from_toml(
            r#"
            [dimmer]
            refresh_rate = 30
            "#,
        );

        assert!(result.is_err());
    }
}
