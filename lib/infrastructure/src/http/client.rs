use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use reqwest_tracing::TracingMiddleware;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,
    #[serde(default)]
    user_agent: Option<String>,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: None,
        }
    }
}

impl HttpClientConfig {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout_secs: connect_timeout.as_secs().max(1),
            user_agent: None,
        }
    }

    pub fn new_tracing_client(&self) -> anyhow::Result<ClientWithMiddleware> {
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(self.connect_timeout_secs));

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        Ok(reqwest_middleware::ClientBuilder::new(builder.build()?)
            .with(TracingMiddleware::default())
            .build())
    }
}
