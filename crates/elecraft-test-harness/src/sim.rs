//! A scripted Elecraft radio for the mock transport.
//!
//! [`SimulatedRig`] answers CAT writes the way a K3 in AI2 mode does: `FA`,
//! `FB`, `PC` and `MD` queries are answered with the current value, set
//! commands update it (and are echoed as an auto-information push when AI
//! is on), and out-of-range values get `?;`.

use elecraft_protocol::commands::{
    PREFIX_AUTO_INFO, PREFIX_FREQ_A, PREFIX_FREQ_B, PREFIX_MODE, PREFIX_POWER,
};
use elecraft_protocol::protocol::{self, DecodeResult, ERROR_RESPONSE};

use crate::mock_serial::MockHandle;

const MIN_HZ: u64 = 1_800_000;
const MAX_HZ: u64 = 54_000_000;

/// In-memory state of a simulated radio.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    vfo_a_hz: u64,
    vfo_b_hz: u64,
    power_watts: u16,
    max_power_watts: u16,
    mode_code: char,
    auto_info: bool,
}

impl SimulatedRig {
    /// A 100 W rig on 14.074 MHz (VFO A), 7.074 MHz (VFO B), USB, 100 W.
    pub fn new() -> Self {
        SimulatedRig {
            vfo_a_hz: 14_074_000,
            vfo_b_hz: 7_074_000,
            power_watts: 100,
            max_power_watts: 100,
            mode_code: '2',
            auto_info: false,
        }
    }

    /// Limit the accepted power level.
    pub fn with_max_power(mut self, watts: u16) -> Self {
        self.max_power_watts = watts;
        self.power_watts = self.power_watts.min(watts);
        self
    }

    /// Install this rig as `handle`'s responder.
    pub fn attach(self, handle: &MockHandle) {
        let mut rig = self;
        handle.set_responder(move |data| rig.respond(data));
    }

    /// Process one write and return the rig's reply, if any.
    pub fn respond(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let mut reply = Vec::new();
        let mut rest = data;
        loop {
            match protocol::decode_response(rest) {
                DecodeResult::Response {
                    prefix,
                    data,
                    consumed,
                } => {
                    self.handle_frame(&prefix, &data, &mut reply);
                    rest = &rest[consumed..];
                }
                DecodeResult::Rejected(consumed) | DecodeResult::Malformed { consumed, .. } => {
                    reply.extend_from_slice(ERROR_RESPONSE);
                    rest = &rest[consumed..];
                }
                DecodeResult::Incomplete => break,
            }
        }
        (!reply.is_empty()).then_some(reply)
    }

    fn handle_frame(&mut self, prefix: &str, data: &str, reply: &mut Vec<u8>) {
        let query = data.is_empty();
        let accepted = match prefix {
            PREFIX_FREQ_A | PREFIX_FREQ_B if query => true,
            PREFIX_FREQ_A | PREFIX_FREQ_B => match parse_hz(data) {
                Some(hz) if prefix == PREFIX_FREQ_A => {
                    self.vfo_a_hz = hz;
                    true
                }
                Some(hz) => {
                    self.vfo_b_hz = hz;
                    true
                }
                None => false,
            },
            PREFIX_POWER if query => true,
            PREFIX_POWER => match data.parse::<u16>() {
                Ok(w) if data.len() == 3 && w <= self.max_power_watts => {
                    self.power_watts = w;
                    true
                }
                _ => false,
            },
            PREFIX_MODE if query => true,
            PREFIX_MODE => match data.chars().next() {
                Some(c) if data.len() == 1 && matches!(c, '1'..='7' | '9') => {
                    self.mode_code = c;
                    true
                }
                _ => false,
            },
            PREFIX_AUTO_INFO => {
                self.auto_info = data == "2" || data == "1";
                return;
            }
            _ => false,
        };

        if !accepted {
            reply.extend_from_slice(ERROR_RESPONSE);
        } else if query || self.auto_info {
            reply.extend_from_slice(self.report(prefix).as_bytes());
        }
    }

    fn report(&self, prefix: &str) -> String {
        match prefix {
            PREFIX_FREQ_A => format!("FA{:011};", self.vfo_a_hz),
            PREFIX_FREQ_B => format!("FB{:011};", self.vfo_b_hz),
            PREFIX_POWER => format!("PC{:03};", self.power_watts),
            _ => format!("MD{};", self.mode_code),
        }
    }
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_hz(data: &str) -> Option<u64> {
    if data.len() != 11 || !data.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    data.parse::<u64>()
        .ok()
        .filter(|hz| (MIN_HZ..=MAX_HZ).contains(hz))
}
