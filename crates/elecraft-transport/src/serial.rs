//! Serial port transport for rig communication.
//!
//! Elecraft radios present a USB virtual COM port (K3S, KX3, KX2, K4) or an
//! RS-232 port (K3). The factory CAT setting is 38400 baud, 8N1, no flow
//! control, which is what [`TransportConfig::default`] describes.

use std::time::Duration;

use async_trait::async_trait;
use elecraft_core::error::{Error, Result};
use elecraft_core::transport::{
    Connector, DataBits, FlowControl, Parity, StopBits, Transport, TransportConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn flow_control(flow: FlowControl) -> tokio_serial::FlowControl {
    match flow {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Software => tokio_serial::FlowControl::Software,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    }
}

/// Serial port transport for rig communication.
pub struct SerialTransport {
    /// The underlying serial port stream; `None` once closed.
    port: Option<SerialStream>,
    /// Port name for logging.
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port at `baud_rate` with 8N1 and no flow control.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = TransportConfig::new(port).with_baud_rate(baud_rate);
        Self::open_with_config(&config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(config: &TransportConfig) -> Result<Self> {
        let port = config.port.as_str();
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        if port.is_empty() {
            return Err(Error::Transport("no serial port configured".to_string()));
        }

        let mut serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits))
            .parity(parity(config.parity))
            .flow_control(flow_control(config.flow_control))
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        // De-assert DTR and RTS right after opening. Elecraft rigs can map
        // either line to PTT or key, and most OSes assert DTR on open.
        if let Err(e) = serial_stream.write_data_terminal_ready(false) {
            tracing::warn!(port = %port, error = %e, "Failed to de-assert DTR");
        }
        if let Err(e) = serial_stream.write_request_to_send(false) {
            tracing::warn!(port = %port, error = %e, "Failed to de-assert RTS");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = %String::from_utf8_lossy(data),
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            Error::from(e)
        })?;

        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            Error::from(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = %String::from_utf8_lossy(&buf[..n]),
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(Error::from(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

/// [`Connector`] that opens a [`SerialTransport`] for each connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl SerialConnector {
    pub fn new() -> Self {
        SerialConnector
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open_with_config(config).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_bits_conversion() {
        assert_eq!(data_bits(DataBits::Five), tokio_serial::DataBits::Five);
        assert_eq!(data_bits(DataBits::Six), tokio_serial::DataBits::Six);
        assert_eq!(data_bits(DataBits::Seven), tokio_serial::DataBits::Seven);
        assert_eq!(data_bits(DataBits::Eight), tokio_serial::DataBits::Eight);
    }

    #[test]
    fn test_stop_bits_conversion() {
        assert_eq!(stop_bits(StopBits::One), tokio_serial::StopBits::One);
        assert_eq!(stop_bits(StopBits::Two), tokio_serial::StopBits::Two);
    }

    #[test]
    fn test_parity_conversion() {
        assert_eq!(parity(Parity::None), tokio_serial::Parity::None);
        assert_eq!(parity(Parity::Odd), tokio_serial::Parity::Odd);
        assert_eq!(parity(Parity::Even), tokio_serial::Parity::Even);
    }

    #[test]
    fn test_flow_control_conversion() {
        assert_eq!(flow_control(FlowControl::None), tokio_serial::FlowControl::None);
        assert_eq!(
            flow_control(FlowControl::Software),
            tokio_serial::FlowControl::Software
        );
        assert_eq!(
            flow_control(FlowControl::Hardware),
            tokio_serial::FlowControl::Hardware
        );
    }

    #[tokio::test]
    async fn test_open_nonexistent_port() {
        let result = SerialTransport::open("/dev/nonexistent_elecraft_port", 38_400).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_open_empty_port_name() {
        let connector = SerialConnector::new();
        let result = connector.open(&TransportConfig::default()).await;
        match result {
            Err(Error::Transport(msg)) => assert!(msg.contains("no serial port")),
            Err(other) => panic!("expected Transport error, got {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
