//! Transport traits for rig communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a transceiver
//! (a USB virtual COM port or an RS-232 line). The rig controller never opens
//! ports itself: it is handed a [`Connector`] at construction and asks it for
//! a fresh transport on every `connect()`. Tests inject the mock connector
//! from `elecraft-test-harness`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous byte-level transport to a rig.
///
/// Implementations handle buffering at the physical layer. Framing and
/// command structure belong to the codec that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the rig.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying device.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the rig into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data and
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if nothing
    /// arrived. `Ok(0)` means the device reached end of stream (closed).
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Factory for transports.
///
/// Replaces a process-wide port manager: the controller receives a connector
/// when it is built and opens a new transport through it on each connect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport for the given configuration.
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn Transport>>;
}

/// Connection parameters for a serial link to the rig.
///
/// Defaults match the Elecraft factory settings for the USB virtual COM
/// port: 38400 baud, 8 data bits, 1 stop bit, no parity, no flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Serial port path (e.g. `/dev/ttyUSB0`, `/dev/cu.usbserial-A1`, `COM3`).
    pub port: String,
    /// Baud rate (e.g. 4800, 9600, 19200, 38400).
    pub baud_rate: u32,
    /// Number of data bits per character.
    pub data_bits: DataBits,
    /// Number of stop bits per character.
    pub stop_bits: StopBits,
    /// Parity checking.
    pub parity: Parity,
    /// Flow control.
    pub flow_control: FlowControl,
}

impl TransportConfig {
    /// Configuration for `port` with default serial settings.
    pub fn new(port: impl Into<String>) -> Self {
        TransportConfig {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Override the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            port: String::new(),
            baud_rate: 38_400,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_config_defaults() {
        let config = TransportConfig::default();
        assert!(config.port.is_empty());
        assert_eq!(config.baud_rate, 38_400);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn transport_config_builder_style() {
        let config = TransportConfig::new("/dev/ttyUSB0").with_baud_rate(4800);
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 4800);
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn traits_are_object_safe() {
        fn assert_transport(_: Option<Box<dyn Transport>>) {}
        fn assert_connector(_: Option<Box<dyn Connector>>) {}
        assert_transport(None);
        assert_connector(None);
    }
}
