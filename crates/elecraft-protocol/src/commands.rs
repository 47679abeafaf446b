//! Elecraft CAT command builders and response parsers.
//!
//! All functions are pure: they produce or consume byte vectors and string
//! slices without performing any I/O. Frequencies travel as exactly 11
//! zero-padded ASCII digits in hertz, power as 3 digits in whole watts, and
//! modes as a single-digit code.
//!
//! Builders take public units (kHz, watts) and convert through
//! [`units`](crate::units); parsers return public units as well.

use bytes::BytesMut;
use elecraft_core::{Error, Mode, Result, Vfo};

use crate::protocol::{encode_command, put_command};
use crate::units;

/// Prefix for VFO-A frequency.
pub const PREFIX_FREQ_A: &str = "FA";
/// Prefix for VFO-B frequency.
pub const PREFIX_FREQ_B: &str = "FB";
/// Prefix for operating mode.
pub const PREFIX_MODE: &str = "MD";
/// Prefix for power output level.
pub const PREFIX_POWER: &str = "PC";
/// Prefix for auto-information control.
pub const PREFIX_AUTO_INFO: &str = "AI";

// ---------------------------------------------------------------
// Elecraft mode code mapping
// ---------------------------------------------------------------

const ELECRAFT_MODE_LSB: &str = "1";
const ELECRAFT_MODE_USB: &str = "2";
const ELECRAFT_MODE_CW: &str = "3";
const ELECRAFT_MODE_FM: &str = "4";
const ELECRAFT_MODE_AM: &str = "5";
/// DATA on the current sideband.
const ELECRAFT_MODE_DATA: &str = "6";
/// CW reverse beat.
const ELECRAFT_MODE_CWR: &str = "7";
/// DATA on the reverse sideband.
const ELECRAFT_MODE_DATAR: &str = "9";

fn frequency_prefix(vfo: Vfo) -> &'static str {
    match vfo {
        Vfo::A => PREFIX_FREQ_A,
        Vfo::B => PREFIX_FREQ_B,
    }
}

// ---------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------

/// Build a "read frequency" command (`FA;` or `FB;`).
pub fn cmd_read_frequency(vfo: Vfo) -> Vec<u8> {
    encode_command(frequency_prefix(vfo), "")
}

/// Build a "set frequency" command (`FA{hz:011};` or `FB{hz:011};`).
///
/// # Example
///
/// ```
/// use elecraft_core::Vfo;
/// use elecraft_protocol::commands::cmd_set_frequency;
///
/// assert_eq!(cmd_set_frequency(Vfo::A, 14_074), b"FA00014074000;");
/// ```
pub fn cmd_set_frequency(vfo: Vfo, khz: u32) -> Vec<u8> {
    encode_command(frequency_prefix(vfo), &frequency_param(khz))
}

/// Build a "read operating mode" command (`MD;`).
pub fn cmd_read_mode() -> Vec<u8> {
    encode_command(PREFIX_MODE, "")
}

/// Build a "set operating mode" command (`MD{code};`).
pub fn cmd_set_mode(mode: Mode) -> Vec<u8> {
    encode_command(PREFIX_MODE, mode_to_elecraft(mode))
}

/// Build a "read power level" command (`PC;`).
pub fn cmd_read_power() -> Vec<u8> {
    encode_command(PREFIX_POWER, "")
}

/// Build a "set power level" command (`PC{watts:03};`).
///
/// Fractional watts are rounded half up to the whole watts the wire carries.
pub fn cmd_set_power(watts: f32) -> Vec<u8> {
    encode_command(PREFIX_POWER, &power_param(watts))
}

/// Build a "read full state" batch: `FA;FB;PC;MD;`.
pub fn cmd_query_state() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(12);
    put_command(&mut buf, PREFIX_FREQ_A, "");
    put_command(&mut buf, PREFIX_FREQ_B, "");
    put_command(&mut buf, PREFIX_POWER, "");
    put_command(&mut buf, PREFIX_MODE, "");
    buf.to_vec()
}

/// Build an "auto-information" command.
///
/// - `AI2;` makes the rig push every state change unsolicited.
/// - `AI0;` turns the pushes off.
pub fn cmd_set_auto_info(enabled: bool) -> Vec<u8> {
    if enabled {
        encode_command(PREFIX_AUTO_INFO, "2")
    } else {
        encode_command(PREFIX_AUTO_INFO, "0")
    }
}

/// The 11-digit hertz parameter for a frequency in kHz.
pub fn frequency_param(khz: u32) -> String {
    format!("{:011}", units::khz_to_hz(khz))
}

/// The 3-digit whole-watt parameter for a power level.
pub fn power_param(watts: f32) -> String {
    format!("{:03}", units::watts_to_wire(watts).min(999))
}

// ---------------------------------------------------------------
// Response parsers
// ---------------------------------------------------------------

fn all_digits(data: &str) -> bool {
    !data.is_empty() && data.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a frequency response body (11 digits of hertz) into kHz.
///
/// Sub-kHz remainders round half up.
pub fn parse_frequency_response(data: &str) -> Result<u32> {
    if data.len() != 11 {
        return Err(Error::Protocol(format!(
            "expected 11 digits for frequency, got {} characters: {data:?}",
            data.len()
        )));
    }
    if !all_digits(data) {
        return Err(Error::Protocol(format!(
            "invalid frequency digits: {data:?}"
        )));
    }
    let hz: u64 = data
        .parse()
        .map_err(|e| Error::Protocol(format!("invalid frequency digits: {data:?} ({e})")))?;
    Ok(units::hz_to_khz(hz))
}

/// Parse a power response body (3 digits of whole watts).
pub fn parse_power_response(data: &str) -> Result<f32> {
    if data.len() != 3 {
        return Err(Error::Protocol(format!(
            "expected 3 digits for power, got {} characters: {data:?}",
            data.len()
        )));
    }
    if !all_digits(data) {
        return Err(Error::Protocol(format!("invalid power digits: {data:?}")));
    }
    let wire: u16 = data
        .parse()
        .map_err(|e| Error::Protocol(format!("invalid power digits: {data:?} ({e})")))?;
    Ok(units::wire_to_watts(wire))
}

/// Parse a mode response body (a single mode code).
pub fn parse_mode_response(data: &str) -> Result<Mode> {
    elecraft_to_mode(data)
}

// ---------------------------------------------------------------
// Mode mapping helpers
// ---------------------------------------------------------------

fn mode_to_elecraft(mode: Mode) -> &'static str {
    match mode {
        Mode::LSB => ELECRAFT_MODE_LSB,
        Mode::USB => ELECRAFT_MODE_USB,
        Mode::CW => ELECRAFT_MODE_CW,
        Mode::FM => ELECRAFT_MODE_FM,
        Mode::AM => ELECRAFT_MODE_AM,
        Mode::Data => ELECRAFT_MODE_DATA,
        Mode::CWR => ELECRAFT_MODE_CWR,
        Mode::DataR => ELECRAFT_MODE_DATAR,
    }
}

fn elecraft_to_mode(code: &str) -> Result<Mode> {
    match code {
        ELECRAFT_MODE_LSB => Ok(Mode::LSB),
        ELECRAFT_MODE_USB => Ok(Mode::USB),
        ELECRAFT_MODE_CW => Ok(Mode::CW),
        ELECRAFT_MODE_FM => Ok(Mode::FM),
        ELECRAFT_MODE_AM => Ok(Mode::AM),
        ELECRAFT_MODE_DATA => Ok(Mode::Data),
        ELECRAFT_MODE_CWR => Ok(Mode::CWR),
        ELECRAFT_MODE_DATAR => Ok(Mode::DataR),
        _ => Err(Error::Protocol(format!("unknown Elecraft mode code: {code:?}"))),
    }
}
