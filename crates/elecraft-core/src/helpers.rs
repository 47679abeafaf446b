//! Formatting helpers for front ends.

/// Format a frequency in kilohertz as a human-readable MHz string.
///
/// Returns a string like `"14.074 MHz"` with three decimal places, which is
/// exactly the resolution the controller works in.
///
/// # Example
///
/// ```
/// use elecraft_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(14_074), "14.074 MHz");
/// assert_eq!(format_freq_mhz(1_840), "1.840 MHz");
/// ```
pub fn format_freq_mhz(khz: u32) -> String {
    format!("{}.{:03} MHz", khz / 1000, khz % 1000)
}

/// Format a power level in watts.
///
/// Whole-watt values print without decimals; fractional (QRP) values keep
/// one decimal place.
///
/// # Example
///
/// ```
/// use elecraft_core::format_power;
///
/// assert_eq!(format_power(100.0), "100 W");
/// assert_eq!(format_power(0.5), "0.5 W");
/// ```
pub fn format_power(watts: f32) -> String {
    if watts.fract() == 0.0 {
        format!("{watts:.0} W")
    } else {
        format!("{watts:.1} W")
    }
}
