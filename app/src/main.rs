use coordinator::CoordinatorRunner;
use settings::Settings;

mod adapter;
mod coordinator;
mod core;
mod dimmer;
mod entity;
mod settings;

const STARTUP_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");

    settings.monitoring.init().expect("Error initializing monitoring");

    let coordinator = CoordinatorRunner::new(&settings.dimmer).expect("Error initializing PV dimmer client");

    tracing::info!("Connecting to PV dimmer at {}", settings.dimmer.host);
    let dimmer_name = loop {
        match connect(&coordinator).await {
            Ok(name) => break name,
            Err(e) => {
                tracing::warn!(
                    "PV dimmer at {} not ready, retrying in {:?}: {:#}",
                    settings.dimmer.host,
                    STARTUP_RETRY_DELAY,
                    e
                );
                tokio::time::sleep(STARTUP_RETRY_DELAY).await;
            }
        }
    };
    tracing::info!("Connected to PV dimmer {}", dimmer_name);

    let mut mqtt_client = settings
        .mqtt
        .new_client(Some(settings.homeassistant.last_will(&dimmer_name)));

    let homeassistant_runner = settings
        .homeassistant
        .new_runner(&mut mqtt_client, &coordinator, &settings.dimmer, &dimmer_name)
        .await
        .expect("Error initializing Home Assistant bridge");

    let http_server_exec = {
        let http_coordinator = coordinator.client();

        async move {
            settings
                .http_server
                .run_server(move || vec![adapter::http::new_routes(http_coordinator.clone())])
                .await
                .expect("HTTP server execution failed");
        }
    };

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = mqtt_client.run() => {},
        _ = coordinator.run() => {},
        _ = homeassistant_runner.run() => {},
        _ = http_server_exec => {},
    );
}

async fn connect(coordinator: &CoordinatorRunner) -> anyhow::Result<String> {
    let name = coordinator.probe().await?;
    tracing::debug!("Found PV dimmer {}", name);

    coordinator.first_refresh().await
}
