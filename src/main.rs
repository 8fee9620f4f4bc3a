use std::path::Path;

use anyhow::Context;
use linky_mqtt_bridge::config::{load_env_file, ENV_FILE};
use linky_mqtt_bridge::{Bridge, ChangeGatedPublisher, Config, MqttBus, SerialConnector};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before the subscriber, so RUST_LOG may come from the file
    let env_file = load_env_file(Path::new(ENV_FILE));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting linky2mqtt {VERSION}, Linky TIC to MQTT bridge");
    match env_file {
        Ok(true) => info!("Loaded settings from {}", ENV_FILE),
        Ok(false) => {}
        Err(e) => warn!("Ignoring {}: {}", ENV_FILE, e),
    }

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        "Configuration: {}",
        serde_json::to_string(&config).context("Cannot render configuration")?
    );

    let bus = MqttBus::connect(&config.mqtt);
    if !bus.wait_connected(config.mqtt.connect_timeout).await {
        warn!(
            "No MQTT acknowledgement after {:?}, values will be sent once connected",
            config.mqtt.connect_timeout
        );
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = stop_tx.send(true);
    });

    let publisher = ChangeGatedPublisher::new(bus, config.mqtt.prefix.clone());
    let mut bridge = Bridge::new(
        publisher,
        config.publish_interval,
        config.serial.retry_delay,
    );
    bridge
        .run(&SerialConnector::new(config.serial.clone()), stop_rx)
        .await;

    bridge.into_publisher().into_sink().disconnect().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received, stopping"),
                _ = sigterm.recv() => info!("SIGTERM received, stopping"),
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("SIGINT received, stopping");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received, stopping");
}
