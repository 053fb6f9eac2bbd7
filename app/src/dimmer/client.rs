use std::time::Duration;

use anyhow::Context;
use infrastructure::HttpClientConfig;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;

use super::DimmerCommand;
use crate::core::DeviceSnapshot;

/// Snapshot section and the endpoint it is read from, in poll order.
const POLL_SECTIONS: [(&str, &str); 6] = [
    ("state", "state"),
    ("config", "config"),
    ("mqtt", "getmqtt"),
    ("dimmer_timer", "getminuteur?dimmer"),
    ("relay1_timer", "getminuteur?relay1"),
    ("relay2_timer", "getminuteur?relay2"),
];

#[derive(Debug, Clone)]
pub struct DimmerClient {
    client: ClientWithMiddleware,
    base_url: String,
    timeout: Duration,
}

impl DimmerClient {
    pub fn new(host: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(timeout).new_tracing_client()?;

        Ok(Self {
            client,
            base_url: format!("http://{}", host.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub async fn request(&self, path: &str, params: &[(String, String)]) -> anyhow::Result<Value> {
        let body = self.request_text(path, params).await?;

        serde_json::from_str(&body).with_context(|| format!("Invalid JSON returned by /{}: {:?}", path, body))
    }

    #[tracing::instrument(skip(self))]
    pub async fn request_text(&self, path: &str, params: &[(String, String)]) -> anyhow::Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("Request: {} - {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Error requesting {}", url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Error reading response of {}", url))?;

        tracing::debug!("Result ({}): {}", status, body);

        if !status.is_success() {
            anyhow::bail!("Request to {} failed with status {}", url, status);
        }

        Ok(body)
    }

    /// Reads every section of the device in a fixed order. One failing
    /// request fails the whole snapshot.
    pub async fn fetch_snapshot(&self) -> anyhow::Result<DeviceSnapshot> {
        let mut sections = Vec::with_capacity(POLL_SECTIONS.len());

        for (section, path) in POLL_SECTIONS {
            let value = self
                .request(path, &[])
                .await
                .with_context(|| format!("Error fetching {} section", section))?;
            sections.push((section.to_string(), value));
        }

        Ok(DeviceSnapshot::from_sections(sections))
    }

    /// Checks that the host answers like a PV dimmer and returns its name.
    pub async fn probe(&self) -> anyhow::Result<String> {
        let config = self.request("config", &[]).await?;

        match config.get("dimmername").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => anyhow::bail!("Device at {} does not report a dimmer name", self.base_url),
        }
    }

    #[tracing::instrument(name = "execute_command DIMMER", skip(self))]
    pub async fn execute(&self, command: &DimmerCommand) -> anyhow::Result<()> {
        match command {
            DimmerCommand::SetConfig(params) => self.request("get", params).await.map(|_| ()),
            DimmerCommand::SaveConfig => self
                .request("get", &[("save".to_string(), "yes".to_string())])
                .await
                .map(|_| ()),
            DimmerCommand::SetPower(value) => self
                .request("", &[("POWER".to_string(), value.to_string())])
                .await
                .map(|_| ()),
            DimmerCommand::SetTimer { timer, params } => {
                let mut query = vec![(timer.clone(), String::new())];
                query.extend(params.iter().cloned());
                self.request("setminuteur", &query).await.map(|_| ())
            }
            DimmerCommand::Restart => self.request_text("reset", &[]).await.map(|_| ()),
            DimmerCommand::ResetWifi => self.request_text("resetwifi", &[]).await.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> DimmerClient {
        DimmerClient::new(&server.host_with_port(), Duration::from_secs(2)).unwrap()
    }

    async fn mock_section(server: &mut Server, path: &str, query: Matcher, body: Value) -> mockito::Mock {
        server
            .mock("GET", path)
            .match_query(query)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn fetch_snapshot_merges_all_sections() {
        let mut server = Server::new_async().await;

        let mocks = vec![
            mock_section(&mut server, "/state", Matcher::Any, json!({"power": 35, "temperature": "51.2"})).await,
            mock_section(&mut server, "/config", Matcher::Any, json!({"dimmername": "pvrouter", "maxtemp": 65}))
                .await,
            mock_section(&mut server, "/getmqtt", Matcher::Any, json!({"server": "10.0.0.2", "port": 1883})).await,
            mock_section(
                &mut server,
                "/getminuteur",
                Matcher::UrlEncoded("dimmer".into(), "".into()),
                json!({"heure_demarrage": "22:00", "heure_arret": "06:00"}),
            )
            .await,
            mock_section(
                &mut server,
                "/getminuteur",
                Matcher::UrlEncoded("relay1".into(), "".into()),
                json!({"temperature": 40}),
            )
            .await,
            mock_section(
                &mut server,
                "/getminuteur",
                Matcher::UrlEncoded("relay2".into(), "".into()),
                json!({"puissance": 80}),
            )
            .await,
        ];

        let snapshot = client(&server).fetch_snapshot().await.unwrap();

        assert_eq!(snapshot.get("state.power"), Some(&json!(35)));
        assert_eq!(snapshot.dimmer_name(), Some("pvrouter"));
        assert_eq!(snapshot.get("mqtt.port"), Some(&json!(1883)));
        assert_eq!(snapshot.get("dimmer_timer.heure_demarrage"), Some(&json!("22:00")));
        assert_eq!(snapshot.get("relay1_timer.temperature"), Some(&json!(40)));
        assert_eq!(snapshot.get("relay2_timer.puissance"), Some(&json!(80)));

        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn fetch_snapshot_fails_when_one_section_fails() {
        let mut server = Server::new_async().await;
        let _state = mock_section(&mut server, "/state", Matcher::Any, json!({"power": 0})).await;
        let _config = server.mock("GET", "/config").with_status(500).create_async().await;

        let result = client(&server).fetch_snapshot().await;

        let error = format!("{:#}", result.unwrap_err());
        assert!(error.contains("config section"), "unexpected error: {}", error);
    }

    #[tokio::test]
    async fn request_rejects_invalid_json() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/state")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        assert!(client(&server).request("state", &[]).await.is_err());
    }

    #[tokio::test]
    async fn probe_returns_dimmer_name() {
        let mut server = Server::new_async().await;
        let _mock = mock_section(&mut server, "/config", Matcher::Any, json!({"dimmername": "garage"})).await;

        assert_eq!(client(&server).probe().await.unwrap(), "garage");
    }

    #[tokio::test]
    async fn probe_fails_without_dimmer_name() {
        let mut server = Server::new_async().await;
        let _mock = mock_section(&mut server, "/config", Matcher::Any, json!({"maxtemp": 60})).await;

        assert!(client(&server).probe().await.is_err());
    }

    #[tokio::test]
    async fn set_config_sends_query_parameters() {
        let mut server = Server::new_async().await;
        let mock = mock_section(
            &mut server,
            "/get",
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxtemp".into(), "70".into()),
                Matcher::UrlEncoded("mode".into(), "equal".into()),
            ]),
            json!({}),
        )
        .await;

        let command = DimmerCommand::SetConfig(vec![
            ("maxtemp".to_string(), "70".to_string()),
            ("mode".to_string(), "equal".to_string()),
        ]);
        client(&server).execute(&command).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn set_timer_prefixes_timer_parameter() {
        let mut server = Server::new_async().await;
        let mock = mock_section(
            &mut server,
            "/setminuteur",
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("relay1".into(), "".into()),
                Matcher::UrlEncoded("heure_arret".into(), "06:30".into()),
            ]),
            json!({}),
        )
        .await;

        client(&server)
            .execute(&DimmerCommand::set_timer("relay1", "heure_arret", "06:30"))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn set_power_targets_root_endpoint() {
        let mut server = Server::new_async().await;
        let mock = mock_section(
            &mut server,
            "/",
            Matcher::UrlEncoded("POWER".into(), "45".into()),
            json!({"power": 45}),
        )
        .await;

        client(&server).execute(&DimmerCommand::SetPower(45.0)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn restart_accepts_plain_text_answer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/reset")
            .with_status(200)
            .with_body("Restarting...")
            .create_async()
            .await;

        client(&server).execute(&DimmerCommand::Restart).await.unwrap();

        mock.assert_async().await;
    }
}
