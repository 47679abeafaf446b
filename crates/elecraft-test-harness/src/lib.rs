//! elecraft-test-harness: mock transports and a simulated radio.
//!
//! - [`MockTransport`] / [`MockHandle`] -- an in-memory [`Transport`](elecraft_core::Transport)
//!   and its test-side control.
//! - [`MockConnector`] -- a [`Connector`](elecraft_core::Connector) that hands
//!   out prepared transports, failures, or opens that never finish.
//! - [`LineCodec`] -- a newline-delimited codec with explicit acks, for
//!   controller tests that need Ack/Nack frames.
//! - [`SimulatedRig`] -- answers CAT writes like a real radio; used by the
//!   CLI's `--mock` flag and by end-to-end tests.

pub mod connector;
pub mod line_codec;
pub mod mock_serial;
pub mod sim;

pub use connector::MockConnector;
pub use line_codec::LineCodec;
pub use mock_serial::{MockHandle, MockTransport, Responder};
pub use sim::SimulatedRig;
