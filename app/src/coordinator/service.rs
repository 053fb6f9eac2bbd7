use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use infrastructure::{EventEmitter, meter};
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock, watch};

use super::{
    CoordinatorEvent, DeviceAction, RestoreError, UpdateFailed,
    backup::{self, Backup, BackupStore},
};
use crate::core::DeviceSnapshot;
use crate::dimmer::{DimmerClient, DimmerCommand, DimmerOptions};

#[derive(Default)]
struct CoordinatorState {
    snapshot: Option<Arc<DeviceSnapshot>>,
    last_update_success: bool,
    last_backup: Option<Backup>,
}

pub struct CoordinatorService {
    client: RwLock<DimmerClient>,
    store: BackupStore,
    state: RwLock<CoordinatorState>,
    options: RwLock<DimmerOptions>,
    refresh_lock: Mutex<()>,
    refresh_requested: Notify,
    interval_tx: watch::Sender<Duration>,
    event_tx: EventEmitter<CoordinatorEvent>,
}

impl CoordinatorService {
    pub fn new(
        client: DimmerClient,
        store: BackupStore,
        options: DimmerOptions,
        event_tx: EventEmitter<CoordinatorEvent>,
    ) -> Self {
        let (interval_tx, _) = watch::channel(options.refresh_rate);

        Self {
            client: RwLock::new(client.with_timeout(options.timeout)),
            store,
            state: RwLock::new(CoordinatorState::default()),
            options: RwLock::new(options),
            refresh_lock: Mutex::new(()),
            refresh_requested: Notify::new(),
            interval_tx,
            event_tx,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<DeviceSnapshot>, UpdateFailed> {
        let _guard = self.refresh_lock.lock().await;

        self.load_missing_backup().await;

        let client = self.client.read().await.clone();
        let result = client.fetch_snapshot().await;

        let mut state = self.state.write().await;

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                state.snapshot = Some(snapshot.clone());
                state.last_update_success = true;
                drop(state);

                meter::increment("dimmer_poll", &[("result", "success")]);
                tracing::debug!("PV dimmer data refreshed");

                self.event_tx.send(CoordinatorEvent::Updated(snapshot.clone()));
                Ok(snapshot)
            }
            Err(e) => {
                state.last_update_success = false;
                drop(state);

                meter::increment("dimmer_poll", &[("result", "failure")]);
                tracing::error!("Error refreshing PV dimmer data: {:?}", e);

                let error = UpdateFailed {
                    reason: format!("{:#}", e),
                };
                self.event_tx.send(CoordinatorEvent::UpdateFailed(error.clone()));
                Err(error)
            }
        }
    }

    pub async fn probe(&self) -> anyhow::Result<String> {
        let client = self.client.read().await.clone();
        client.probe().await
    }

    pub fn request_refresh(&self) {
        tracing::debug!("Refresh of PV dimmer data requested");
        self.refresh_requested.notify_one();
    }

    pub async fn refresh_requested(&self) {
        self.refresh_requested.notified().await
    }

    pub fn watch_interval(&self) -> watch::Receiver<Duration> {
        self.interval_tx.subscribe()
    }

    pub async fn snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.state.read().await.snapshot.clone()
    }

    pub async fn get_item(&self, key_chain: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.snapshot.as_ref()?.get(key_chain).cloned()
    }

    pub async fn last_update_success(&self) -> bool {
        self.state.read().await.last_update_success
    }

    pub async fn last_backup(&self) -> Option<DateTime<Local>> {
        self.state.read().await.last_backup.as_ref().map(|b| b.time)
    }

    pub async fn options(&self) -> DimmerOptions {
        *self.options.read().await
    }

    pub async fn update_configuration(&self, options: DimmerOptions) {
        tracing::info!(
            "Updating PV dimmer options: refresh every {:?}, timeout {:?}",
            options.refresh_rate,
            options.timeout
        );

        {
            let mut client = self.client.write().await;
            *client = client.with_timeout(options.timeout);
        }
        *self.options.write().await = options;
        self.interval_tx.send_replace(options.refresh_rate);

        self.request_refresh();
    }

    pub async fn execute(&self, action: DeviceAction) -> anyhow::Result<()> {
        match action {
            DeviceAction::Command(command) => {
                self.execute_command(&command).await?;
                if command.refreshes_state() {
                    self.request_refresh();
                }
                Ok(())
            }
            DeviceAction::Refresh => {
                self.request_refresh();
                Ok(())
            }
            DeviceAction::Backup => self.backup_device().await.map(|_| ()),
            DeviceAction::Restore => Ok(self.restore_device().await?),
        }
    }

    async fn execute_command(&self, command: &DimmerCommand) -> anyhow::Result<()> {
        let client = self.client.read().await.clone();
        client.execute(command).await
    }

    /// Takes a fresh configuration snapshot from the device and writes it to the backup file.
    #[tracing::instrument(skip(self))]
    pub async fn backup_device(&self) -> anyhow::Result<DateTime<Local>> {
        let client = self.client.read().await.clone();
        let backup = Backup::new(client.fetch_snapshot().await?);

        self.store.save(&backup).await?;

        let time = backup.time;
        self.state.write().await.last_backup = Some(backup);

        tracing::info!("PV dimmer configuration backed up to {}", self.store.path().display());
        self.event_tx.send(CoordinatorEvent::BackupChanged(time));

        Ok(time)
    }

    /// Writes the last backup back to the device and saves it to flash.
    #[tracing::instrument(skip(self))]
    pub async fn restore_device(&self) -> Result<(), RestoreError> {
        let Some(backup) = self.state.read().await.last_backup.clone() else {
            return Err(RestoreError::NoBackup);
        };

        for (title, command) in backup::restore_commands(&backup) {
            tracing::info!("Restoring {}", title);
            self.execute_command(&command)
                .await
                .map_err(|e| RestoreError::Device {
                    title,
                    reason: format!("{:#}", e),
                })?;
        }

        self.execute_command(&DimmerCommand::SaveConfig)
            .await
            .map_err(|e| RestoreError::Device {
                title: "Save configuration",
                reason: format!("{:#}", e),
            })?;

        tracing::info!("PV dimmer configuration restored from backup of {}", backup.time);
        self.request_refresh();

        Ok(())
    }

    /// Loads the backup file while none is in memory, so a file placed later is picked up.
    async fn load_missing_backup(&self) {
        if self.state.read().await.last_backup.is_some() {
            return;
        }

        if !self.store.exists().await {
            tracing::trace!("No PV dimmer backup found at {}", self.store.path().display());
            return;
        }

        match self.store.load().await {
            Ok(backup) => {
                let time = backup.time;
                self.state.write().await.last_backup = Some(backup);
                tracing::info!("Loaded PV dimmer backup of {}", time);
                self.event_tx.send(CoordinatorEvent::BackupChanged(time));
            }
            Err(e) => {
                tracing::error!("Error loading PV dimmer backup: {:?}", e);
            }
        }
    }
}
