use std::io;

use thiserror::Error;

/// Errors surfaced by the bridge's transports and configuration.
///
/// Malformed meter input never shows up here: bad lines are dropped by the
/// decoder and unknown codes degrade to defaults.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Serial error `{0}`")]
    Serial(#[from] tokio_serial::Error),
    #[error("IO error `{0}`")]
    Io(#[from] io::Error),
    #[error("MQTT client error `{0}`")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("MQTT broker not connected")]
    NotConnected,
    #[error("Invalid configuration for `{name}`: {reason}")]
    Config { name: &'static str, reason: String },
}

impl BridgeError {
    pub fn config(name: &'static str, reason: impl Into<String>) -> Self {
        BridgeError::Config {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
