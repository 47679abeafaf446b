//! Serial transport for Elecraft rig control.
//!
//! This crate provides [`SerialTransport`], the concrete
//! [`Transport`](elecraft_core::Transport) for USB virtual COM ports and
//! RS-232 lines, and [`SerialConnector`], the
//! [`Connector`](elecraft_core::Connector) the controller uses to open one on
//! every connect.
//!
//! # Example
//!
//! ```no_run
//! use elecraft_core::{Transport, TransportConfig};
//! use elecraft_transport::SerialTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> elecraft_core::Result<()> {
//! let config = TransportConfig::new("/dev/ttyUSB0");
//! let mut transport = SerialTransport::open_with_config(&config).await?;
//!
//! transport.send(b"FA;").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConnector, SerialTransport};
