mod backup;
mod service;

use std::sync::Arc;

use chrono::{DateTime, Local};
use derive_more::{Display, Error};
use infrastructure::{EventBus, EventListener};
use serde_json::Value;
use service::CoordinatorService;

use crate::core::DeviceSnapshot;
use crate::dimmer::{DimmerCommand, DimmerOptions, DimmerSettings};

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Updated(Arc<DeviceSnapshot>),
    UpdateFailed(UpdateFailed),
    BackupChanged(DateTime<Local>),
}

/// Something an entity or the admin API asks the coordinator to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    Command(DimmerCommand),
    Refresh,
    Backup,
    Restore,
}

#[derive(Debug, Clone, Display, Error)]
#[display("Error communicating with API: {reason}")]
pub struct UpdateFailed {
    pub reason: String,
}

#[derive(Debug, Clone, Display, Error)]
pub enum RestoreError {
    #[display("No available backup to restore")]
    NoBackup,
    #[display("Error restoring {title}: {reason}")]
    Device { title: &'static str, reason: String },
}

pub struct CoordinatorRunner {
    service: Arc<CoordinatorService>,
    event_bus: EventBus<CoordinatorEvent>,
}

#[derive(Clone)]
pub struct CoordinatorClient {
    service: Arc<CoordinatorService>,
}

impl CoordinatorRunner {
    pub fn new(settings: &DimmerSettings) -> anyhow::Result<Self> {
        let event_bus = EventBus::new(32);

        let service = Arc::new(CoordinatorService::new(
            settings.new_client()?,
            backup::BackupStore::new(settings.backup_path()),
            settings.options(),
            event_bus.emitter(),
        ));

        Ok(Self { service, event_bus })
    }

    pub fn client(&self) -> CoordinatorClient {
        CoordinatorClient {
            service: self.service.clone(),
        }
    }

    pub fn subscribe(&self) -> EventListener<CoordinatorEvent> {
        self.event_bus.subscribe()
    }

    /// Checks that the configured host is a PV dimmer and returns its name.
    pub async fn probe(&self) -> anyhow::Result<String> {
        self.service.probe().await
    }

    /// Initial poll. Succeeds only when the device answered every section and reports its name.
    pub async fn first_refresh(&self) -> anyhow::Result<String> {
        let snapshot = self.service.refresh().await?;

        match snapshot.dimmer_name() {
            Some(name) => Ok(name.to_string()),
            None => anyhow::bail!("PV dimmer did not report a dimmer name"),
        }
    }

    pub async fn run(self) {
        let mut interval_rx = self.service.watch_interval();

        loop {
            let period = *interval_rx.borrow_and_update();

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = self.service.refresh_requested() => {}
                Ok(()) = interval_rx.changed() => {
                    tracing::info!("PV dimmer refresh interval changed to {:?}", *interval_rx.borrow());
                    continue;
                }
            }

            //failures are logged and published by the service
            let _ = self.service.refresh().await;
        }
    }
}

impl CoordinatorClient {
    pub async fn snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.service.snapshot().await
    }

    pub async fn get_item(&self, key_chain: &str) -> Option<Value> {
        self.service.get_item(key_chain).await
    }

    pub async fn get_item_or(&self, key_chain: &str, default: Value) -> Value {
        self.get_item(key_chain).await.unwrap_or(default)
    }

    pub async fn dimmer_name(&self) -> Option<String> {
        self.snapshot().await.and_then(|s| s.dimmer_name().map(str::to_string))
    }

    pub async fn last_update_success(&self) -> bool {
        self.service.last_update_success().await
    }

    pub async fn last_backup(&self) -> Option<DateTime<Local>> {
        self.service.last_backup().await
    }

    pub async fn options(&self) -> DimmerOptions {
        self.service.options().await
    }

    pub async fn refresh(&self) -> Result<Arc<DeviceSnapshot>, UpdateFailed> {
        self.service.refresh().await
    }

    pub fn request_refresh(&self) {
        self.service.request_refresh()
    }

    pub async fn update_configuration(&self, options: DimmerOptions) {
        self.service.update_configuration(options).await
    }

    pub async fn execute(&self, action: DeviceAction) -> anyhow::Result<()> {
        self.service.execute(action).await
    }

    pub async fn backup_device(&self) -> anyhow::Result<DateTime<Local>> {
        self.service.backup_device().await
    }

    pub async fn restore_device(&self) -> Result<(), RestoreError> {
        self.service.restore_device().await
    }
}
