//! Unit conversion between the public contract and the CAT wire.
//!
//! The rest of the workspace works in whole kilohertz and floating-point
//! watts. The CAT wire carries frequencies in hertz and power in whole
//! watts. This module is the only place the two meet.
//!
//! Rounding policy: round half up, in both directions. A whole-kHz value
//! converts to hertz exactly and converts back unchanged.

/// Hertz per kilohertz.
pub const HZ_PER_KHZ: u64 = 1_000;

/// Convert kilohertz to hertz. Exact.
pub fn khz_to_hz(khz: u32) -> u64 {
    u64::from(khz) * HZ_PER_KHZ
}

/// Convert hertz to kilohertz, rounding half up.
///
/// Saturates at `u32::MAX` kHz, far above anything an 11-digit CAT field
/// can carry after division.
pub fn hz_to_khz(hz: u64) -> u32 {
    let khz = hz.saturating_add(HZ_PER_KHZ / 2) / HZ_PER_KHZ;
    u32::try_from(khz).unwrap_or(u32::MAX)
}

/// Convert a power level to the whole watts carried on the wire, rounding
/// half up. Negative and non-finite inputs map to zero.
pub fn watts_to_wire(watts: f32) -> u16 {
    if !watts.is_finite() || watts <= 0.0 {
        return 0;
    }
    let rounded = (watts + 0.5).floor();
    if rounded >= f32::from(u16::MAX) {
        u16::MAX
    } else {
        rounded as u16
    }
}

/// Convert wire watts back to the public representation.
pub fn wire_to_watts(wire: u16) -> f32 {
    f32::from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn khz_to_hz_exact() {
        assert_eq!(khz_to_hz(14_074), 14_074_000);
        assert_eq!(khz_to_hz(0), 0);
        assert_eq!(khz_to_hz(54_000), 54_000_000);
    }

    #[test]
    fn hz_to_khz_rounds_half_up() {
        assert_eq!(hz_to_khz(14_074_000), 14_074);
        assert_eq!(hz_to_khz(14_074_499), 14_074);
        assert_eq!(hz_to_khz(14_074_500), 14_075);
        assert_eq!(hz_to_khz(14_073_500), 14_074);
        assert_eq!(hz_to_khz(499), 0);
        assert_eq!(hz_to_khz(500), 1);
    }

    #[test]
    fn integral_khz_round_trips() {
        for khz in [0, 1, 1_800, 3_573, 7_074, 14_074, 28_074, 50_313, 54_000] {
            assert_eq!(hz_to_khz(khz_to_hz(khz)), khz);
        }
    }

    #[test]
    fn hz_to_khz_saturates() {
        assert_eq!(hz_to_khz(u64::MAX), u32::MAX);
    }

    #[test]
    fn watts_to_wire_rounds_half_up() {
        assert_eq!(watts_to_wire(50.0), 50);
        assert_eq!(watts_to_wire(49.4), 49);
        assert_eq!(watts_to_wire(49.5), 50);
        assert_eq!(watts_to_wire(0.4), 0);
        assert_eq!(watts_to_wire(0.5), 1);
    }

    #[test]
    fn watts_to_wire_rejects_nonsense() {
        assert_eq!(watts_to_wire(-3.0), 0);
        assert_eq!(watts_to_wire(f32::NAN), 0);
        assert_eq!(watts_to_wire(f32::INFINITY), 0);
        assert_eq!(watts_to_wire(1.0e9), u16::MAX);
    }

    #[test]
    fn whole_watts_round_trip() {
        for w in [0u16, 1, 5, 10, 15, 100] {
            assert_eq!(watts_to_wire(wire_to_watts(w)), w);
        }
    }
}
