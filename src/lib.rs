//! Linky TIC to MQTT bridge library
//!
//! This library decodes the historical teleinformation (TIC) frames emitted by
//! a Linky electricity meter on its serial output and republishes the derived
//! measurements to an MQTT broker, sending each channel only when it changes.

pub mod bridge;
pub mod checksum;
pub mod config;
pub mod error;
pub mod frame_assembler;
pub mod frame_decoder;
pub mod metrics;
pub mod mqtt_client;
pub mod payload;
pub mod publisher;
pub mod serial_device;

// Re-export commonly used types for easier access
pub use bridge::{Bridge, FrameOutcome};
pub use config::Config;
pub use error::{BridgeError, Result};
pub use frame_assembler::FrameAssembler;
pub use frame_decoder::{decode_frame, DecodedFrame};
pub use metrics::{derive_metrics, DerivedMetrics};
pub use mqtt_client::MqttBus;
pub use payload::{structure_payload, FieldValue, TypedPayload};
pub use publisher::{ChangeGatedPublisher, MessageSink};
pub use serial_device::{ByteSource, DeviceConnector, SerialConnector};
