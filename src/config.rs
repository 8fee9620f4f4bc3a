use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde_derive::Serialize;

use crate::error::{BridgeError, Result};
use crate::mqtt_client::MqttSettings;
use crate::serial_device::{Parity, SerialSettings};

/// Process configuration, read from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub serial: SerialSettings,
    pub mqtt: MqttSettings,
    /// Minimum delay between two published frames.
    pub publish_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            mqtt: MqttSettings::default(),
            publish_interval: Duration::from_secs(15),
        }
    }
}

/// Optional environment file read at startup, relative to the working directory.
pub const ENV_FILE: &str = ".env";

/// Loads `KEY=value` lines from `path` into the process environment.
///
/// Variables already set in the environment keep their value. Returns false
/// when the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenv::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(BridgeError::config(ENV_FILE, e.to_string())),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup, unset or empty
    /// variables keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let serial = SerialSettings {
            port: get("SERIAL_PORT").unwrap_or(defaults.serial.port),
            baud_rate: parse_or(&get, "SERIAL_BAUD", defaults.serial.baud_rate)?,
            data_bits: parse_in_range(&get, "SERIAL_BITS", defaults.serial.data_bits, 5..=8)?,
            parity: match get("SERIAL_PARITY") {
                Some(v) => v.parse::<Parity>()?,
                None => defaults.serial.parity,
            },
            stop_bits: parse_in_range(&get, "SERIAL_STOPS", defaults.serial.stop_bits, 1..=2)?,
            read_timeout: seconds_or(&get, "SERIAL_TIMEOUT", defaults.serial.read_timeout)?,
            retry_delay: seconds_or(&get, "SERIAL_RETRY_DELAY", defaults.serial.retry_delay)?,
        };

        let mqtt = MqttSettings {
            host: get("MQTT_HOST").unwrap_or(defaults.mqtt.host),
            port: parse_or(&get, "MQTT_PORT", defaults.mqtt.port)?,
            username: get("MQTT_USER").unwrap_or_default(),
            password: get("MQTT_PASS").unwrap_or_default(),
            client_id: get("MQTT_CLIENT").unwrap_or(defaults.mqtt.client_id),
            prefix: get("MQTT_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.mqtt.prefix),
            qos: parse_in_range(&get, "MQTT_QOS", defaults.mqtt.qos, 0..=2)?,
            keep_alive: seconds_or(&get, "MQTT_KEEPALIVE", defaults.mqtt.keep_alive)?,
            connect_timeout: seconds_or(
                &get,
                "MQTT_CONNECT_TIMEOUT",
                defaults.mqtt.connect_timeout,
            )?,
        };

        Ok(Config {
            serial,
            mqtt,
            publish_interval: seconds_or(&get, "PUBLISH_INTERVAL", defaults.publish_interval)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BridgeError::config(name, format!("`{raw}`: {e}"))),
        None => Ok(default),
    }
}

fn parse_in_range<G>(
    get: &G,
    name: &'static str,
    default: u8,
    range: std::ops::RangeInclusive<u8>,
) -> Result<u8>
where
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, name, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(BridgeError::config(
            name,
            format!("{value} is outside {}..={}", range.start(), range.end()),
        ))
    }
}

/// Fractional seconds, e.g. `0.5`.
fn seconds_or<G>(get: &G, name: &'static str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let seconds: f64 = parse_or(get, name, default.as_secs_f64())?;
    Duration::try_from_secs_f64(seconds).map_err(|e| BridgeError::config(name, e.to_string()))
}
