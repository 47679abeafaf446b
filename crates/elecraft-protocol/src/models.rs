//! Elecraft model definitions.
//!
//! Each supported Elecraft rig is described by an [`ElecraftModel`] that
//! captures its default baud rate and the limits the controller validates
//! against. All models speak the same CAT grammar for the fields tracked
//! here, so the model only matters for range checks and serial defaults.
//!
//! | Model  | Baud  | Power | Coverage |
//! |--------|-------|-------|----------|
//! | K3     | 38400 | 100W  | HF + 6m  |
//! | K3S    | 38400 | 100W  | HF + 6m  |
//! | KX3    | 38400 | 15W   | HF + 6m  |
//! | KX2    | 38400 | 10W   | HF + 6m  |
//! | K4     | 38400 | 100W  | HF + 6m  |

use elecraft_core::{FrequencyRange, Mode, RigLimits};

/// Static model definition for an Elecraft transceiver.
#[derive(Debug, Clone, PartialEq)]
pub struct ElecraftModel {
    /// Human-readable model name (e.g. "K3", "K4").
    pub name: &'static str,
    /// Model designation returned by the identification command (`K3` or `K4`).
    pub model_id: &'static str,
    /// Factory serial baud rate for the USB virtual COM port.
    pub default_baud_rate: u32,
    /// Maximum transmit power in watts.
    pub max_power_watts: f32,
}

/// HF + 6m coverage, 1.8 MHz to 54 MHz, as one contiguous range.
const HF_6M_RANGE: FrequencyRange = FrequencyRange {
    low_khz: 1_800,
    high_khz: 54_000,
};

impl ElecraftModel {
    /// The limits the controller checks commands against.
    ///
    /// Every model accepts every [`Mode`]; power ranges from 0 to
    /// [`max_power_watts`](Self::max_power_watts).
    pub fn limits(&self) -> RigLimits {
        RigLimits {
            frequency_ranges: vec![HF_6M_RANGE],
            max_power_watts: self.max_power_watts,
            supported_modes: Mode::ALL.to_vec(),
        }
    }
}

/// K3: 100W HF+6m transceiver.
pub fn k3() -> ElecraftModel {
    ElecraftModel {
        name: "K3",
        model_id: "K3",
        default_baud_rate: 38_400,
        max_power_watts: 100.0,
    }
}

/// K3S: the 2015 revision of the K3. Identical CAT protocol.
pub fn k3s() -> ElecraftModel {
    ElecraftModel {
        name: "K3S",
        model_id: "K3",
        default_baud_rate: 38_400,
        max_power_watts: 100.0,
    }
}

/// KX3: 15W portable. Reports itself as a K3 on the identification command.
pub fn kx3() -> ElecraftModel {
    ElecraftModel {
        name: "KX3",
        model_id: "K3",
        default_baud_rate: 38_400,
        max_power_watts: 15.0,
    }
}

/// KX2: 10W handheld portable.
pub fn kx2() -> ElecraftModel {
    ElecraftModel {
        name: "KX2",
        model_id: "K3",
        default_baud_rate: 38_400,
        max_power_watts: 10.0,
    }
}

/// K4: 100W direct-sampling SDR.
pub fn k4() -> ElecraftModel {
    ElecraftModel {
        name: "K4",
        model_id: "K4",
        default_baud_rate: 38_400,
        max_power_watts: 100.0,
    }
}

/// Every supported model.
pub fn all_elecraft_models() -> Vec<ElecraftModel> {
    vec![k3(), k3s(), kx3(), kx2(), k4()]
}

/// Look a model up by name, ignoring case.
pub fn model_by_name(name: &str) -> Option<ElecraftModel> {
    all_elecraft_models()
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
}
