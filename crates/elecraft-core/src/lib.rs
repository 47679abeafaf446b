//! elecraft-core: Core traits, types, and error definitions.
//!
//! This crate defines the protocol-agnostic pieces shared by the codec, the
//! transports, and the rig controller. Front ends depend on these types
//! without pulling in the serial stack.
//!
//! # Key types
//!
//! - [`RigState`] -- the observable snapshot of the radio
//! - [`Transport`] / [`Connector`] -- byte-level communication channel and its factory
//! - [`RigEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use elecraft_core::*`.
pub use error::{Error, Result};
pub use events::RigEvent;
pub use helpers::{format_freq_mhz, format_power};
pub use transport::{Connector, DataBits, FlowControl, Parity, StopBits, Transport, TransportConfig};
pub use types::*;
