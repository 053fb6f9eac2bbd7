mod client;
mod message;
mod sender;

pub use client::{Mqtt, MqttSubscription};
pub use message::{MqttInMessage, MqttOutMessage};
pub use sender::MqttSender;

use serde::Deserialize;

/// Number of connections established with the broker so far.
pub type MqttConnections = tokio::sync::watch::Receiver<u64>;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
}

/// Message the broker publishes on our behalf when the connection drops.
#[derive(Debug, Clone)]
pub struct MqttLastWill {
    pub topic: String,
    pub payload: String,
}

impl MqttConfig {
    pub fn new_client(&self, last_will: Option<MqttLastWill>) -> Mqtt {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };

        Mqtt::connect(&self.host, self.port, &self.client_id, credentials, last_will)
    }
}
