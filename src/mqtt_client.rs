use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde_derive::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::publisher::MessageSink;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub client_id: String,
    pub prefix: String,
    pub qos: u8,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "linky2mqtt".to_string(),
            prefix: "edf".to_string(),
            qos: 0,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl MqttSettings {
    /// Username and password, only when both are set.
    ///
    /// A half-configured pair falls back to an anonymous connection.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.is_empty(), self.password.is_empty()) {
            (false, false) => Some((self.username.as_str(), self.password.as_str())),
            (true, true) => None,
            (false, true) => {
                warn!("MQTT_USER is set without MQTT_PASS, connecting anonymously");
                None
            }
            (true, false) => {
                warn!("MQTT_PASS is set without MQTT_USER, connecting anonymously");
                None
            }
        }
    }

    pub fn qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

/// MQTT connection backed by a rumqttc event loop running in its own task.
///
/// The task only updates the `connected` state and logs; publishing state
/// stays with the caller.
pub struct MqttBus {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    qos: QoS,
    event_loop: JoinHandle<()>,
}

impl MqttBus {
    /// Starts connecting to the broker. Use [`MqttBus::wait_connected`] to
    /// wait for the broker's acknowledgement.
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        if let Some((username, password)) = settings.credentials() {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (state, connected) = watch::channel(false);
        let event_loop = tokio::spawn(Self::drive(eventloop, state));

        info!(
            "MQTT connecting to {}:{} (client_id={})",
            settings.host, settings.port, settings.client_id
        );

        Self {
            client,
            connected,
            qos: settings.qos(),
            event_loop,
        }
    }

    async fn drive(mut eventloop: EventLoop, connected: watch::Sender<bool>) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    connected.send_replace(true);
                    info!("MQTT connected ({:?})", ack.code);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    connected.send_replace(false);
                    warn!("MQTT broker closed the session");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    connected.send_replace(false);
                    break;
                }
                Ok(event) => debug!("MQTT event: {:?}", event),
                Err(e) => {
                    if connected.send_replace(false) {
                        warn!("MQTT disconnected: {}, reconnecting", e);
                    } else {
                        debug!("MQTT connection attempt failed: {}", e);
                    }
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
        debug!("MQTT event loop exiting");
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Waits for the broker's CONNACK, returning false on timeout.
    pub async fn wait_connected(&self, wait: Duration) -> bool {
        let mut connected = self.connected.clone();
        let up = matches!(
            timeout(wait, connected.wait_for(|up| *up)).await,
            Ok(Ok(_))
        );
        up
    }

    /// Sends DISCONNECT and stops the event loop.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Error disconnecting from MQTT broker: {}", e);
        }
        if timeout(Duration::from_secs(2), &mut self.event_loop)
            .await
            .is_err()
        {
            self.event_loop.abort();
        }
        info!("MQTT disconnected");
    }
}

#[async_trait]
impl MessageSink for MqttBus {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.client.try_publish(topic, self.qos, retain, payload)?;
        Ok(())
    }
}
