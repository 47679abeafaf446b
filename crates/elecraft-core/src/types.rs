//! Core types used throughout the workspace.
//!
//! These types describe the radio the way front ends see it: whole-kHz VFO
//! frequencies, transmit power in watts, a closed set of operating modes,
//! and the state of the link. Wire-level units never appear here.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// One of the two independently tunable frequency registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vfo {
    A,
    B,
}

impl fmt::Display for Vfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vfo::A => write!(f, "VFO-A"),
            Vfo::B => write!(f, "VFO-B"),
        }
    }
}

/// Operating mode of the transceiver.
///
/// A closed set: the rig's mode is never carried as a free-form string.
/// Use [`FromStr`] / [`Display`](fmt::Display) for the symbolic form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Lower sideband voice.
    LSB,
    /// Upper sideband voice.
    USB,
    /// CW (morse), normal sideband offset.
    CW,
    /// CW reverse beat.
    CWR,
    /// Amplitude modulation.
    AM,
    /// Frequency modulation.
    FM,
    /// Data mode on the current sideband.
    Data,
    /// Data mode on the reverse sideband.
    DataR,
}

impl Mode {
    /// Every mode, in the order a mode picker would list them.
    pub const ALL: [Mode; 8] = [
        Mode::LSB,
        Mode::USB,
        Mode::CW,
        Mode::CWR,
        Mode::AM,
        Mode::FM,
        Mode::Data,
        Mode::DataR,
    ];
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::LSB => "LSB",
            Mode::USB => "USB",
            Mode::CW => "CW",
            Mode::CWR => "CW-R",
            Mode::AM => "AM",
            Mode::FM => "FM",
            Mode::Data => "DATA",
            Mode::DataR => "DATA-R",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseModeError(String);

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mode: {}", self.0)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LSB" => Ok(Mode::LSB),
            "USB" => Ok(Mode::USB),
            "CW" => Ok(Mode::CW),
            "CW-R" | "CWR" => Ok(Mode::CWR),
            "AM" => Ok(Mode::AM),
            "FM" => Ok(Mode::FM),
            "DATA" => Ok(Mode::Data),
            "DATA-R" | "DATAR" => Ok(Mode::DataR),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Lifecycle of the link between the controller and the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport. Initial state, and the state after `disconnect()`.
    #[default]
    Disconnected,
    /// Transport opening or handshake in progress.
    Connecting,
    /// Link up; commands are accepted.
    Connected,
    /// The link failed. Not terminal: `connect()` may be called again.
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Faulted => "faulted",
        };
        write!(f, "{s}")
    }
}

/// A radio-derived value and how much it can be trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    /// Never reported since the controller was created.
    Unknown,
    /// Reported (or confirmed) on the current connection.
    Known(T),
    /// Last value seen before the link went down or a write to it failed.
    Stale(T),
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::Unknown
    }
}

impl<T: Copy> Reading<T> {
    /// The last value, fresh or stale.
    pub fn value(&self) -> Option<T> {
        match self {
            Reading::Unknown => None,
            Reading::Known(v) | Reading::Stale(v) => Some(*v),
        }
    }

    /// The value only if it is current.
    pub fn known(&self) -> Option<T> {
        match self {
            Reading::Known(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Reading::Known(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Reading::Stale(_))
    }

    /// Downgrade a known value to stale. Unknown stays unknown.
    pub fn mark_stale(&mut self) {
        if let Reading::Known(v) = *self {
            *self = Reading::Stale(v);
        }
    }
}

/// Snapshot of the radio as the controller currently believes it to be.
///
/// Only the rig controller writes this; everyone else gets clones through
/// its observer channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RigState {
    /// VFO A frequency in whole kilohertz.
    pub vfo_a_frequency_khz: Reading<u32>,
    /// VFO B frequency in whole kilohertz.
    pub vfo_b_frequency_khz: Reading<u32>,
    /// Transmit power setting in watts.
    pub power_level_watts: Reading<f32>,
    /// Operating mode.
    pub mode: Reading<Mode>,
    /// State of the link to the rig.
    pub connection_state: ConnectionState,
}

impl RigState {
    /// The frequency reading for one VFO.
    pub fn frequency(&self, vfo: Vfo) -> Reading<u32> {
        match vfo {
            Vfo::A => self.vfo_a_frequency_khz,
            Vfo::B => self.vfo_b_frequency_khz,
        }
    }

    /// Mutable access to the frequency reading for one VFO.
    pub fn frequency_mut(&mut self, vfo: Vfo) -> &mut Reading<u32> {
        match vfo {
            Vfo::A => &mut self.vfo_a_frequency_khz,
            Vfo::B => &mut self.vfo_b_frequency_khz,
        }
    }

    /// Mark every radio-derived field stale.
    pub fn invalidate(&mut self) {
        self.vfo_a_frequency_khz.mark_stale();
        self.vfo_b_frequency_khz.mark_stale();
        self.power_level_watts.mark_stale();
        self.mode.mark_stale();
    }
}

/// Identifier the controller assigns to every command it issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    pub fn new(raw: u64) -> Self {
        CommandId(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// The id following this one.
    pub fn next(&self) -> Self {
        CommandId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A contiguous tunable frequency range, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRange {
    /// Lower bound in kHz (inclusive).
    pub low_khz: u32,
    /// Upper bound in kHz (inclusive).
    pub high_khz: u32,
}

impl FrequencyRange {
    pub fn new(low_khz: u32, high_khz: u32) -> Self {
        FrequencyRange { low_khz, high_khz }
    }

    pub fn contains(&self, khz: u32) -> bool {
        khz >= self.low_khz && khz <= self.high_khz
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} kHz", self.low_khz, self.high_khz)
    }
}

/// Value bounds for a specific rig, used to reject writes before any I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct RigLimits {
    /// Frequency ranges the rig can tune to.
    pub frequency_ranges: Vec<FrequencyRange>,
    /// Maximum transmit power in watts.
    pub max_power_watts: f32,
    /// Modes the rig accepts.
    pub supported_modes: Vec<Mode>,
}

impl RigLimits {
    /// Reject a frequency outside every supported range.
    pub fn check_frequency(&self, vfo: Vfo, khz: u32) -> Result<()> {
        if self.frequency_ranges.iter().any(|r| r.contains(khz)) {
            return Ok(());
        }
        let ranges = self
            .frequency_ranges
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::Validation(format!(
            "{vfo} frequency {khz} kHz outside supported ranges [{ranges}]"
        )))
    }

    /// Reject power below zero, above the maximum, or not a number.
    pub fn check_power(&self, watts: f32) -> Result<()> {
        if !watts.is_finite() {
            return Err(Error::Validation(format!("power {watts} W is not a number")));
        }
        if watts < 0.0 || watts > self.max_power_watts {
            return Err(Error::Validation(format!(
                "power {watts} W outside 0-{} W",
                self.max_power_watts
            )));
        }
        Ok(())
    }

    /// Reject a mode the rig does not offer.
    pub fn check_mode(&self, mode: Mode) -> Result<()> {
        if self.supported_modes.contains(&mode) {
            Ok(())
        } else {
            Err(Error::Validation(format!("mode {mode} not supported")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hf_limits() -> RigLimits {
        RigLimits {
            frequency_ranges: vec![FrequencyRange::new(1_800, 54_000)],
            max_power_watts: 100.0,
            supported_modes: Mode::ALL.to_vec(),
        }
    }

    #[test]
    fn vfo_display() {
        assert_eq!(Vfo::A.to_string(), "VFO-A");
        assert_eq!(Vfo::B.to_string(), "VFO-B");
    }

    #[test]
    fn mode_display_round_trip() {
        for mode in Mode::ALL {
            let parsed: Mode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!("usb".parse::<Mode>().unwrap(), Mode::USB);
        assert_eq!("cwr".parse::<Mode>().unwrap(), Mode::CWR);
        assert_eq!(" Data ".parse::<Mode>().unwrap(), Mode::Data);
        assert_eq!("data-r".parse::<Mode>().unwrap(), Mode::DataR);
    }

    #[test]
    fn mode_parse_unknown() {
        let err = "SSTV".parse::<Mode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown mode: SSTV");
    }

    #[test]
    fn connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Faulted.to_string(), "faulted");
    }

    #[test]
    fn reading_transitions() {
        let mut r: Reading<u32> = Reading::default();
        assert_eq!(r.value(), None);
        r.mark_stale();
        assert_eq!(r, Reading::Unknown);

        r = Reading::Known(14_074);
        assert!(r.is_known());
        assert_eq!(r.known(), Some(14_074));

        r.mark_stale();
        assert!(r.is_stale());
        assert_eq!(r.value(), Some(14_074));
        assert_eq!(r.known(), None);
    }

    #[test]
    fn rig_state_invalidate_marks_everything_stale() {
        let mut state = RigState {
            vfo_a_frequency_khz: Reading::Known(14_074),
            vfo_b_frequency_khz: Reading::Known(7_074),
            power_level_watts: Reading::Known(50.0),
            mode: Reading::Known(Mode::USB),
            connection_state: ConnectionState::Connected,
        };
        state.invalidate();
        assert_eq!(state.vfo_a_frequency_khz, Reading::Stale(14_074));
        assert_eq!(state.vfo_b_frequency_khz, Reading::Stale(7_074));
        assert_eq!(state.power_level_watts, Reading::Stale(50.0));
        assert_eq!(state.mode, Reading::Stale(Mode::USB));
        // Connection state is managed separately.
        assert_eq!(state.connection_state, ConnectionState::Connected);
    }

    #[test]
    fn rig_state_frequency_by_vfo() {
        let mut state = RigState::default();
        *state.frequency_mut(Vfo::B) = Reading::Known(3_573);
        assert_eq!(state.frequency(Vfo::A), Reading::Unknown);
        assert_eq!(state.frequency(Vfo::B), Reading::Known(3_573));
    }

    #[test]
    fn command_id_sequence() {
        let id = CommandId::new(7);
        assert_eq!(id.next().get(), 8);
        assert_eq!(id.to_string(), "#7");
        assert_eq!(CommandId::new(u64::MAX).next().get(), 0);
    }

    #[test]
    fn frequency_range_inclusive() {
        let r = FrequencyRange::new(1_800, 54_000);
        assert!(r.contains(1_800));
        assert!(r.contains(54_000));
        assert!(!r.contains(1_799));
        assert!(!r.contains(54_001));
        assert_eq!(r.to_string(), "1800-54000 kHz");
    }

    #[test]
    fn limits_check_frequency() {
        let limits = hf_limits();
        assert!(limits.check_frequency(Vfo::A, 14_074).is_ok());
        let err = limits.check_frequency(Vfo::B, 144_000).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("VFO-B"));
    }

    #[test]
    fn limits_check_power() {
        let limits = hf_limits();
        assert!(limits.check_power(0.0).is_ok());
        assert!(limits.check_power(100.0).is_ok());
        assert!(matches!(limits.check_power(100.5), Err(Error::Validation(_))));
        assert!(matches!(limits.check_power(-1.0), Err(Error::Validation(_))));
        assert!(matches!(limits.check_power(f32::NAN), Err(Error::Validation(_))));
    }

    #[test]
    fn limits_check_mode() {
        let limits = RigLimits {
            supported_modes: vec![Mode::USB, Mode::LSB],
            ..hf_limits()
        };
        assert!(limits.check_mode(Mode::USB).is_ok());
        assert!(matches!(limits.check_mode(Mode::FM), Err(Error::Validation(_))));
    }
}
