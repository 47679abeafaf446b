//! # elecraft -- Rig control for Elecraft transceivers
//!
//! `elecraft` is an asynchronous Rust library for tuning, setting power on,
//! and changing the mode of Elecraft transceivers (K3, K3S, KX3, KX2, K4)
//! over their serial CAT link. It keeps a locally observable snapshot of the
//! radio in sync with the hardware.
//!
//! ## Quick Start
//!
//! ```no_run
//! use elecraft::{ControllerBuilder, Mode};
//! use elecraft::models::k3;
//!
//! #[tokio::main]
//! async fn main() -> elecraft::Result<()> {
//!     let rig = ControllerBuilder::new(k3())
//!         .serial_port("/dev/ttyUSB0")
//!         .build()?;
//!     rig.connect_default().await?;
//!
//!     rig.set_vfo_a_frequency(14_074).await?.confirmed().await?;
//!     rig.set_mode(Mode::Data).await?;
//!     println!("VFO-A: {:?} kHz", rig.vfo_a_frequency_khz());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                              |
//! |------------------------|------------------------------------------------------|
//! | `elecraft-core`        | [`RigState`], [`Transport`], [`RigEvent`], [`Error`] |
//! | `elecraft-protocol`    | CAT framing, the [`Codec`] trait, models             |
//! | `elecraft-transport`   | Serial transport over `tokio-serial`                 |
//! | `elecraft-controller`  | The [`RigController`] actor and its builder          |
//! | **`elecraft`**         | This facade crate -- re-exports everything           |
//!
//! ## Observing the rig
//!
//! Every property is readable synchronously from the controller. Changes
//! arrive on a `watch` channel ([`RigController::watch`]) and as
//! [`RigEvent`]s ([`RigController::subscribe`]):
//!
//! ```no_run
//! use elecraft::{RigController, RigEvent};
//! # async fn example(rig: &RigController) {
//! let mut events = rig.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let RigEvent::FrequencyChanged { vfo, khz } = event {
//!         println!("{vfo}: {khz} kHz");
//!     }
//! }
//! # }
//! ```

pub use elecraft_core::*;

pub use elecraft_controller::{
    CommandHandle, ControllerBuilder, EngineConfig, RigController, UpdatePolicy,
};
pub use elecraft_protocol::{CatCodec, Codec, Command, SetCommandMode};
pub use elecraft_transport::{SerialConnector, SerialTransport};

/// Supported Elecraft models and their limits.
pub mod models {
    pub use elecraft_protocol::models::*;
}

/// The CAT wire protocol: framing, command builders, and response parsers.
pub mod protocol {
    pub use elecraft_protocol::*;
}

/// Every model this library knows, in catalogue order.
///
/// # Example
///
/// ```
/// for model in elecraft::supported_models() {
///     println!("{} (max {} W)", model.name, model.max_power_watts);
/// }
/// ```
pub fn supported_models() -> Vec<models::ElecraftModel> {
    models::all_elecraft_models()
}
