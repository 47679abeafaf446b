//! Protocol-independent command/response model and the [`Codec`] trait.
//!
//! The rig controller speaks only in [`Command`]s and [`Response`]s. A codec
//! turns commands into bytes for the transport and turns the transport's
//! byte stream back into responses. The concrete grammar lives behind the
//! trait; [`CatCodec`](crate::cat::CatCodec) is the Elecraft CAT grammar.

use std::fmt;

use elecraft_core::{CommandId, Mode, Vfo};

/// An outbound request to the rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Tune a VFO to a frequency in kHz.
    SetFrequency(Vfo, u32),
    /// Set transmit power in watts.
    SetPower(f32),
    /// Change the operating mode.
    SetMode(Mode),
    /// Ask the rig to report every tracked field.
    QueryState,
}

impl Command {
    /// The fields a status report must carry to confirm this command by
    /// read-back.
    pub fn fields(&self) -> FieldSet {
        match self {
            Command::SetFrequency(Vfo::A, _) => FieldSet::only(Field::VfoA),
            Command::SetFrequency(Vfo::B, _) => FieldSet::only(Field::VfoB),
            Command::SetPower(_) => FieldSet::only(Field::Power),
            Command::SetMode(_) => FieldSet::only(Field::Mode),
            Command::QueryState => FieldSet::ALL,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Command::QueryState)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetFrequency(vfo, khz) => write!(f, "set {vfo} {khz} kHz"),
            Command::SetPower(watts) => write!(f, "set power {watts} W"),
            Command::SetMode(mode) => write!(f, "set mode {mode}"),
            Command::QueryState => write!(f, "query state"),
        }
    }
}

/// One observable field of the rig state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    VfoA,
    VfoB,
    Power,
    Mode,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::VfoA, Field::VfoB, Field::Power, Field::Mode];

    fn bit(self) -> u8 {
        match self {
            Field::VfoA => 0b0001,
            Field::VfoB => 0b0010,
            Field::Power => 0b0100,
            Field::Mode => 0b1000,
        }
    }
}

/// A small set of [`Field`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const EMPTY: FieldSet = FieldSet(0);
    pub const ALL: FieldSet = FieldSet(0b1111);

    pub fn only(field: Field) -> Self {
        FieldSet(field.bit())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn insert(&mut self, field: Field) {
        self.0 |= field.bit();
    }

    /// Remove every field in `other` from this set.
    pub fn remove_all(&mut self, other: FieldSet) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        Field::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

/// A partial state update pushed or echoed by the rig.
///
/// Fields the rig did not report are `None` and must be left untouched by
/// whoever merges the report.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusReport {
    pub vfo_a_khz: Option<u32>,
    pub vfo_b_khz: Option<u32>,
    pub power_watts: Option<f32>,
    pub mode: Option<Mode>,
}

impl StatusReport {
    /// A report carrying a single VFO frequency.
    pub fn frequency(vfo: Vfo, khz: u32) -> Self {
        match vfo {
            Vfo::A => StatusReport {
                vfo_a_khz: Some(khz),
                ..Default::default()
            },
            Vfo::B => StatusReport {
                vfo_b_khz: Some(khz),
                ..Default::default()
            },
        }
    }

    /// A report carrying only the power level.
    pub fn power(watts: f32) -> Self {
        StatusReport {
            power_watts: Some(watts),
            ..Default::default()
        }
    }

    /// A report carrying only the mode.
    pub fn mode(mode: Mode) -> Self {
        StatusReport {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// The set of fields present in this report.
    pub fn fields(&self) -> FieldSet {
        let mut set = FieldSet::EMPTY;
        if self.vfo_a_khz.is_some() {
            set.insert(Field::VfoA);
        }
        if self.vfo_b_khz.is_some() {
            set.insert(Field::VfoB);
        }
        if self.power_watts.is_some() {
            set.insert(Field::Power);
        }
        if self.mode.is_some() {
            set.insert(Field::Mode);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// An inbound unit decoded from the rig's byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Positive acknowledgment. Carries the command id when the protocol
    /// multiplexes ids; `None` means "the oldest outstanding command".
    Ack(Option<CommandId>),
    /// Negative acknowledgment with the rig's reason.
    Nack(String),
    /// A partial state update.
    Status(StatusReport),
}

/// How a protocol confirms that a command took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStyle {
    /// The protocol sends Ack/Nack frames.
    Explicit,
    /// The encoded command carries a read-back query; the echoed status
    /// report confirms it.
    ReadBack,
    /// Nothing confirms the command. A successful write completes it.
    Unacknowledged,
}

/// A frame that could not be decoded. The frame's bytes have already been
/// discarded when this is reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A delimited frame whose contents did not parse.
    #[error("malformed frame {frame:?}: {reason}")]
    Malformed {
        /// The frame body, lossily converted for logging.
        frame: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Too many bytes arrived since the last frame without a delimiter.
    #[error("receive buffer overflow: {len} bytes without a frame delimiter")]
    Overflow {
        /// How many bytes were dropped.
        len: usize,
    },
}

/// Translation between [`Command`]/[`Response`] values and raw bytes.
///
/// Implementations keep a carry-over buffer so that a frame split across
/// several transport reads decodes exactly as if it had arrived whole.
pub trait Codec: Send + 'static {
    /// Encode a command. Never fails; range checks happen before this.
    ///
    /// `id` is the controller's identity for the command. Protocols without
    /// id multiplexing ignore it.
    fn encode(&self, id: CommandId, command: &Command) -> Vec<u8>;

    /// Feed received bytes and return every item completed by them, in
    /// stream order. An incomplete trailing frame stays buffered.
    fn decode(&mut self, bytes: &[u8]) -> Vec<Result<Response, DecodeError>>;

    /// Discard the carry-over buffer.
    fn reset(&mut self);

    /// Number of bytes currently held in the carry-over buffer.
    fn buffered(&self) -> usize;

    /// How `command` will be confirmed once written.
    fn ack_style(&self, command: &Command) -> AckStyle;

    /// Bytes to send once the transport is open.
    fn startup_command(&self) -> Option<Vec<u8>> {
        None
    }

    /// Bytes to send just before the transport is closed.
    fn shutdown_command(&self) -> Option<Vec<u8>> {
        None
    }
}

impl<C: Codec + ?Sized> Codec for Box<C> {
    fn encode(&self, id: CommandId, command: &Command) -> Vec<u8> {
        (**self).encode(id, command)
    }

    fn decode(&mut self, bytes: &[u8]) -> Vec<Result<Response, DecodeError>> {
        (**self).decode(bytes)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn buffered(&self) -> usize {
        (**self).buffered()
    }

    fn ack_style(&self, command: &Command) -> AckStyle {
        (**self).ack_style(command)
    }

    fn startup_command(&self) -> Option<Vec<u8>> {
        (**self).startup_command()
    }

    fn shutdown_command(&self) -> Option<Vec<u8>> {
        (**self).shutdown_command()
    }
}
