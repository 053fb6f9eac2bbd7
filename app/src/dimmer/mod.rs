mod client;

pub use client::DimmerClient;

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_json::Value;

pub const DOMAIN: &str = "appersolaire_pvdimmer";
pub const MANUFACTURER: &str = "APPER Solaire";

#[derive(Debug, Deserialize, Clone)]
pub struct DimmerSettings {
    pub host: String,
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_include_state_entities")]
    pub include_state_entities: bool,
    pub mac_address: Option<String>,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_refresh_rate() -> u64 {
    60
}

fn default_timeout() -> u64 {
    5
}

fn default_include_state_entities() -> bool {
    true
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(".")
}

impl DimmerSettings {
    pub fn new_client(&self) -> anyhow::Result<DimmerClient> {
        DimmerClient::new(&self.host, self.options().timeout)
    }

    pub fn options(&self) -> DimmerOptions {
        DimmerOptions {
            refresh_rate: Duration::from_secs(self.refresh_rate.max(1)),
            timeout: Duration::from_secs(self.timeout.max(1)),
        }
    }

    pub fn configuration_url(&self) -> String {
        format!("http://{}", self.host)
    }

    /// Identifier used in the backup file name: the MAC address without colons
    /// when configured, otherwise the host with separators flattened.
    pub fn backup_id(&self) -> String {
        match &self.mac_address {
            Some(mac) => mac.replace(':', "").to_lowercase(),
            None => self
                .host
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect(),
        }
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_dir
            .join(format!("{}_{}_config.json", DOMAIN, self.backup_id()))
    }
}

/// Runtime-adjustable part of the dimmer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimmerOptions {
    pub refresh_rate: Duration,
    pub timeout: Duration,
}

/// Write operations supported by the dimmer HTTP API.
#[derive(Debug, Clone, PartialEq)]
pub enum DimmerCommand {
    SetConfig(Vec<(String, String)>),
    SaveConfig,
    SetPower(f64),
    SetTimer { timer: String, params: Vec<(String, String)> },
    Restart,
    ResetWifi,
}

impl DimmerCommand {
    pub fn set_config(key: impl Into<String>, value: impl ToString) -> Self {
        DimmerCommand::SetConfig(vec![(key.into(), value.to_string())])
    }

    pub fn set_timer(timer: impl Into<String>, key: impl Into<String>, value: impl ToString) -> Self {
        DimmerCommand::SetTimer {
            timer: timer.into(),
            params: vec![(key.into(), value.to_string())],
        }
    }

    /// Whether the device state is worth re-reading once the command went through.
    pub fn refreshes_state(&self) -> bool {
        !matches!(self, DimmerCommand::Restart | DimmerCommand::ResetWifi)
    }
}

/// Renders a snapshot value the way the device expects it in a query string.
pub fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
