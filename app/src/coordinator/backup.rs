use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::DeviceSnapshot;
use crate::dimmer::{DimmerCommand, param_value};

/// Configuration snapshot of the dimmer as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub data: DeviceSnapshot,
    #[serde(with = "backup_time")]
    pub time: DateTime<Local>,
}

impl Backup {
    pub fn new(data: DeviceSnapshot) -> Self {
        Self {
            data,
            time: Local::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    pub async fn load(&self) -> anyhow::Result<Backup> {
        tracing::debug!("Load last backup from {}", self.path.display());

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Error reading backup file {}", self.path.display()))?;

        serde_json::from_str(&content).with_context(|| format!("Invalid backup file {}", self.path.display()))
    }

    /// Writes the backup file. A failed write does not leave a truncated file behind.
    pub async fn save(&self, backup: &Backup) -> anyhow::Result<()> {
        let result = self.write(backup).await;

        match &result {
            Ok(()) => tracing::debug!("PV dimmer configuration backup in {}", self.path.display()),
            Err(e) => {
                tracing::error!("Failed to backup configuration in {}: {:?}", self.path.display(), e);
                if self.exists().await {
                    if let Err(e) = tokio::fs::remove_file(&self.path).await {
                        tracing::warn!("Error removing incomplete backup {}: {}", self.path.display(), e);
                    }
                }
            }
        }

        result
    }

    async fn write(&self, backup: &Backup) -> anyhow::Result<()> {
        let content = serde_json::to_string(backup)?;

        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Error writing backup file {}", self.path.display()))
    }
}

struct RestoreGroup {
    title: &'static str,
    timer: Option<&'static str>,
    //write parameter <- snapshot path
    params: &'static [(&'static str, &'static str)],
}

const RESTORE_GROUPS: [RestoreGroup; 5] = [
    RestoreGroup {
        title: "General configuration",
        timer: None,
        params: &[
            ("maxtemp", "config.maxtemp"),
            ("startingpow", "config.startingpow"),
            ("minpow", "config.minpow"),
            ("maxpow", "config.maxpow"),
            ("child", "config.child"),
            ("SubscribePV", "config.SubscribePV"),
            ("SubscribeTEMP", "config.SubscribeTEMP"),
            ("mode", "config.delester"),
            ("charge1", "config.charge1"),
            ("charge2", "config.charge2"),
            ("charge3", "config.charge3"),
            ("DALLAS", "config.DALLAS"),
            ("dimmername", "config.dimmername"),
            ("trigger", "config.trigger"),
        ],
    },
    RestoreGroup {
        title: "MQTT configuration",
        timer: None,
        params: &[
            ("hostname", "mqtt.server"),
            ("port", "mqtt.port"),
            ("Publish", "mqtt.topic"),
            ("mqttuser", "mqtt.user"),
            ("mqttpassword", "mqtt.password"),
            ("idxtemp", "mqtt.idxtemp"),
            ("IDXAlarme", "mqtt.IDXAlarme"),
            ("IDX", "mqtt.IDX"),
        ],
    },
    RestoreGroup {
        title: "Dimmer timer configuration",
        timer: Some("dimmer"),
        params: &[
            ("heure_demarrage", "dimmer_timer.heure_demarrage"),
            ("heure_arret", "dimmer_timer.heure_arret"),
            ("temperature", "dimmer_timer.temperature"),
            ("puissance", "dimmer_timer.puissance"),
        ],
    },
    RestoreGroup {
        title: "Relay 1 timer configuration",
        timer: Some("relay1"),
        params: &[
            ("heure_demarrage", "relay1_timer.heure_demarrage"),
            ("heure_arret", "relay1_timer.heure_arret"),
            ("temperature", "relay1_timer.temperature"),
            ("puissance", "relay1_timer.puissance"),
        ],
    },
    RestoreGroup {
        title: "Relay 2 timer configuration",
        timer: Some("relay2"),
        params: &[
            ("heure_demarrage", "relay2_timer.heure_demarrage"),
            ("heure_arret", "relay2_timer.heure_arret"),
            ("temperature", "relay2_timer.temperature"),
            ("puissance", "relay2_timer.puissance"),
        ],
    },
];

/// Device writes that replay `backup`, in order, with their titles.
/// Configuration groups without any value in the backup are left out. Timer groups are
/// always written since the timer selector is a parameter of its own.
pub fn restore_commands(backup: &Backup) -> Vec<(&'static str, DimmerCommand)> {
    RESTORE_GROUPS
        .iter()
        .filter_map(|group| {
            let params: Vec<(String, String)> = group
                .params
                .iter()
                .filter_map(|(dst, src)| backup.data.get(src).map(|v| (dst.to_string(), param_value(v))))
                .collect();

            let command = match group.timer {
                Some(timer) => DimmerCommand::SetTimer {
                    timer: timer.to_string(),
                    params,
                },
                None if params.is_empty() => {
                    tracing::warn!("No {} to restore", group.title);
                    return None;
                }
                None => DimmerCommand::SetConfig(params),
            };

            Some((group.title, command))
        })
        .collect()
}

mod backup_time {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339())
    }

    //older backups carry naive local timestamps like 2024-05-01T10:22:33.123456
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(deserializer)?;

        if let Ok(time) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(time.with_timezone(&Local));
        }

        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| D::Error::custom(format!("invalid backup time {:?}: {}", raw, e)))?;

        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| D::Error::custom(format!("backup time {:?} does not exist locally", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot::try_from(json!({
            "config": {
                "maxtemp": 65,
                "delester": "equal",
                "dimmername": "pvrouter",
                "charge1": 2000,
                "unrelated": "ignored"
            },
            "mqtt": {},
            "dimmer_timer": {"heure_demarrage": "22:00", "heure_arret": "06:00", "temperature": 50, "puissance": 80},
            "relay1_timer": {},
            "relay2_timer": {"temperature": 45}
        }))
        .unwrap()
    }

    #[test]
    fn builds_restore_commands_from_backup() {
        let commands = restore_commands(&Backup::new(snapshot()));

        let titles: Vec<&str> = commands.iter().map(|(title, _)| *title).collect();
        assert_eq!(
            titles,
            vec![
                "General configuration",
                "Dimmer timer configuration",
                "Relay 1 timer configuration",
                "Relay 2 timer configuration"
            ]
        );

        assert_eq!(
            commands[0].1,
            DimmerCommand::SetConfig(vec![
                ("maxtemp".to_string(), "65".to_string()),
                ("mode".to_string(), "equal".to_string()),
                ("charge1".to_string(), "2000".to_string()),
                ("dimmername".to_string(), "pvrouter".to_string()),
            ])
        );

        assert_eq!(
            commands[2].1,
            DimmerCommand::SetTimer {
                timer: "relay1".to_string(),
                params: vec![],
            }
        );

        assert_eq!(
            commands[3].1,
            DimmerCommand::SetTimer {
                timer: "relay2".to_string(),
                params: vec![("temperature".to_string(), "45".to_string())],
            }
        );
    }

    #[test]
    fn empty_backup_restores_only_timers() {
        let commands = restore_commands(&Backup::new(DeviceSnapshot::default()));

        let timers: Vec<&str> = commands
            .iter()
            .filter_map(|(_, command)| match command {
                DimmerCommand::SetTimer { timer, params } if params.is_empty() => Some(timer.as_str()),
                _ => None,
            })
            .collect();

        assert_eq!(commands.len(), 3);
        assert_eq!(timers, vec!["dimmer", "relay1", "relay2"]);
    }

    #[tokio::test]
    async fn saves_and_loads_backup_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("backup.json"));
        let backup = Backup::new(snapshot());

        assert!(!store.exists().await);
        store.save(&backup).await.unwrap();
        assert!(store.exists().await);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.data, backup.data);
        assert_eq!(loaded.time.timestamp(), backup.time.timestamp());
    }

    #[tokio::test]
    async fn loads_backup_with_naive_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(
            &path,
            json!({"data": {"config": {"maxtemp": 60}}, "time": "2024-05-01T10:22:33.123456"}).to_string(),
        )
        .unwrap();

        let loaded = BackupStore::new(&path).load().await.unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(10, 22, 33, 123456)
            .unwrap();
        assert_eq!(loaded.time, Local.from_local_datetime(&expected).earliest().unwrap());
        assert_eq!(loaded.data.get("config.maxtemp"), Some(&json!(60)));
    }

    #[tokio::test]
    async fn rejects_corrupted_backup_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(BackupStore::new(&path).load().await.is_err());
    }

    #[tokio::test]
    async fn failed_save_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("missing-dir").join("backup.json"));

        assert!(store.save(&Backup::new(snapshot())).await.is_err());
        assert!(!store.exists().await);
    }
}
