use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::frame_assembler::FrameAssembler;
use crate::frame_decoder::decode_frame;
use crate::metrics::derive_metrics;
use crate::payload::structure_payload;
use crate::publisher::{ChangeGatedPublisher, MessageSink};
use crate::serial_device::{ByteSource, DeviceConnector};

/// What happened to one assembled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Arrived before the minimum interval elapsed, not even decoded.
    RateLimited,
    /// No checksum-valid line in the frame.
    Empty,
    Published { fields: usize, sent: usize },
}

/// Serial to MQTT loop: owns the frame assembler, the report-by-exception
/// publisher and the rate-limit timestamp.
pub struct Bridge<S> {
    publisher: ChangeGatedPublisher<S>,
    assembler: FrameAssembler,
    min_interval: Duration,
    retry_delay: Duration,
    last_publication: Option<Instant>,
}

impl<S: MessageSink> Bridge<S> {
    pub fn new(
        publisher: ChangeGatedPublisher<S>,
        min_interval: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            publisher,
            assembler: FrameAssembler::new(),
            min_interval,
            retry_delay,
            last_publication: None,
        }
    }

    pub fn publisher(&self) -> &ChangeGatedPublisher<S> {
        &self.publisher
    }

    pub fn into_publisher(self) -> ChangeGatedPublisher<S> {
        self.publisher
    }

    /// Decodes and publishes one frame body unless it arrives too early.
    ///
    /// Only a frame that carried at least one valid field moves the
    /// rate-limit timestamp.
    pub async fn handle_frame(&mut self, raw: &[u8], now: Instant) -> FrameOutcome {
        if let Some(last) = self.last_publication {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                debug!(
                    "Frame skipped (rate limit, {:.1}s left)",
                    (self.min_interval - elapsed).as_secs_f64()
                );
                return FrameOutcome::RateLimited;
            }
        }

        let fields = decode_frame(raw);
        if fields.is_empty() {
            debug!("Empty or fully invalid frame, skipped");
            return FrameOutcome::Empty;
        }

        let data = structure_payload(&fields);
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(json) = serde_json::to_string(&data) {
                debug!("Typed payload {}", json);
            }
        }

        let channels = derive_metrics(&data).channels();
        let sent = self.publisher.publish_all(&channels).await;
        self.last_publication = Some(now);

        info!(
            "Frame published, {} TIC labels, {}/{} channels changed",
            fields.len(),
            sent,
            channels.len()
        );
        FrameOutcome::Published {
            fields: fields.len(),
            sent,
        }
    }

    /// Reads the meter until `shutdown` changes, reopening the device after
    /// any open or read failure.
    pub async fn run<C: DeviceConnector>(
        &mut self,
        connector: &C,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "Bridge started on {}, publish interval {:?}",
            connector.describe(),
            self.min_interval
        );

        let mut device: Option<C::Device> = None;

        while !*shutdown.borrow() {
            if device.is_none() {
                match connector.open().await {
                    Ok(link) => {
                        self.assembler.reset();
                        device = Some(link);
                    }
                    Err(e) => {
                        error!(
                            "Cannot open {}: {}, retrying in {:?}",
                            connector.describe(),
                            e,
                            self.retry_delay
                        );
                        if !wait_or_stop(self.retry_delay, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                }
            }
            let Some(link) = device.as_mut() else {
                continue;
            };

            let read = tokio::select! {
                read = link.read_byte() => read,
                _ = shutdown.changed() => break,
            };

            match read {
                Ok(Some(byte)) => {
                    if let Some(frame) = self.assembler.push(byte) {
                        self.handle_frame(&frame, Instant::now()).await;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        "Serial read error: {}, reopening in {:?}",
                        e, self.retry_delay
                    );
                    device = None;
                    if !wait_or_stop(self.retry_delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        drop(device);
        info!("Bridge stopped");
    }
}

/// Sleeps for `delay`, returning false if a stop was requested meanwhile.
async fn wait_or_stop(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}
