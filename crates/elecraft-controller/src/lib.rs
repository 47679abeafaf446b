//! elecraft-controller: the component that owns and mutates [`RigState`].
//!
//! A [`RigController`] is a handle to a spawned actor task. The actor drives
//! a sans-IO [`Engine`] with bytes from the transport, caller requests, and
//! timer ticks, and publishes the resulting state on `watch` and `broadcast`
//! channels.
//!
//! Build one with [`ControllerBuilder`]:
//!
//! ```no_run
//! use elecraft_controller::ControllerBuilder;
//! use elecraft_protocol::models::k3;
//!
//! # async fn example() -> elecraft_core::Result<()> {
//! let rig = ControllerBuilder::new(k3()).serial_port("/dev/ttyUSB0").build()?;
//! rig.connect_default().await?;
//! println!("VFO A: {:?} kHz", rig.vfo_a_frequency_khz());
//! # Ok(())
//! # }
//! ```
//!
//! [`RigState`]: elecraft_core::RigState

pub mod builder;
pub mod controller;
pub mod engine;

pub use builder::ControllerBuilder;
pub use controller::{CommandHandle, RigController};
pub use engine::{Engine, EngineConfig, UpdatePolicy, validate_command};
