//! Asynchronous rig event types.
//!
//! Events are emitted by the rig controller through a
//! [`tokio::sync::broadcast`] channel whenever its state changes. Front ends
//! subscribe to these for UI updates without polling; the complete snapshot
//! is also available through the controller's `watch` channel.

use crate::types::{CommandId, ConnectionState, Mode, Vfo};

/// An event emitted by the rig controller when radio or link state changes.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under heavy load (e.g. rapid VFO
/// knob movement with auto-information enabled).
#[derive(Debug, Clone, PartialEq)]
pub enum RigEvent {
    /// The frequency of a VFO changed.
    FrequencyChanged {
        /// Which VFO changed.
        vfo: Vfo,
        /// New frequency in kilohertz.
        khz: u32,
    },

    /// The transmit power setting changed.
    PowerChanged {
        /// New power level in watts.
        watts: f32,
    },

    /// The operating mode changed.
    ModeChanged {
        /// New operating mode.
        mode: Mode,
    },

    /// The link moved to a new lifecycle state.
    ConnectionChanged {
        /// The state just entered.
        state: ConnectionState,
    },

    /// A command completed successfully.
    CommandConfirmed {
        /// The command's id.
        id: CommandId,
    },

    /// A command failed (rejected, timed out, or cancelled).
    CommandFailed {
        /// The command's id.
        id: CommandId,
        /// Human-readable failure reason.
        reason: String,
    },
}
