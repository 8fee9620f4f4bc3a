use std::io;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_derive::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// A byte stream with a bounded read wait.
#[async_trait]
pub trait ByteSource {
    /// Reads the next byte; `Ok(None)` means the read timed out.
    async fn read_byte(&mut self) -> Result<Option<u8>>;
}

/// Opens the meter link. Dropping the returned device closes it.
#[async_trait]
pub trait DeviceConnector {
    type Device: ByteSource + Send;

    async fn open(&self) -> Result<Self::Device>;

    /// Human readable name of the link, for logs.
    fn describe(&self) -> String;
}

/// Any async reader used as a meter link.
pub struct StreamDevice<R> {
    reader: R,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin + Send> StreamDevice<R> {
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            read_timeout,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ByteSource for StreamDevice<R> {
    async fn read_byte(&mut self) -> Result<Option<u8>> {
        match timeout(self.read_timeout, self.reader.read_u8()).await {
            Ok(Ok(byte)) => Ok(Some(byte)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(BridgeError::Io(
                io::Error::new(io::ErrorKind::BrokenPipe, "Read EOF on meter link"),
            )),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Parity {
    Even,
    Odd,
    None,
}

impl FromStr for Parity {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" | "EVEN" => Ok(Parity::Even),
            "O" | "ODD" => Ok(Parity::Odd),
            "N" | "NONE" => Ok(Parity::None),
            other => Err(BridgeError::config(
                "SERIAL_PARITY",
                format!("unknown parity `{other}`, expected E, O or N"),
            )),
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::None => tokio_serial::Parity::None,
        }
    }
}

/// Serial line parameters. Historical TIC is 1200 baud, 7E1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub read_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 1200,
            data_bits: 7,
            parity: Parity::Even,
            stop_bits: 1,
            read_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(10),
        }
    }
}

impl SerialSettings {
    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// Opens the configured serial port.
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DeviceConnector for SerialConnector {
    type Device = StreamDevice<SerialStream>;

    async fn open(&self) -> Result<Self::Device> {
        let builder = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.settings.data_bits())
            .parity(self.settings.parity.into())
            .stop_bits(self.settings.stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.settings.read_timeout);

        debug!("Opening serial port {:?}", builder);
        let stream = builder.open_native_async()?;
        info!("Serial port opened: {}", self.settings.port);
        Ok(StreamDevice::new(stream, self.settings.read_timeout))
    }

    fn describe(&self) -> String {
        format!(
            "{} @{} baud {}{:?}{}",
            self.settings.port,
            self.settings.baud_rate,
            self.settings.data_bits,
            self.settings.parity,
            self.settings.stop_bits
        )
    }
}
