//! Plant-wide constants and default tunables.
//!
//! Mirrors the teacher's `constants.rs` layout: one module per concern,
//! plain `pub const` items, no configuration logic.

/// Fixed-point scale for temperatures: millikelvin per Kelvin unit.
pub const KPRECISION: i64 = 1000;

/// Kelvin value of 0 degrees Celsius, in the fixed-point scale.
pub const ZEROC_K: i64 = 273 * KPRECISION;

pub mod temperature {
    use super::KPRECISION;

    /// Valid operational range, in millikelvin: [-50C, +150C].
    pub const MIN_VALID: i64 = (-50 + 273) * KPRECISION;
    pub const MAX_VALID: i64 = (150 + 273) * KPRECISION;

    /// Reserved sentinels, chosen well outside the valid range.
    pub const SENTINEL_UNSET: i64 = i64::MIN;
    pub const SENTINEL_SHORT: i64 = i64::MIN + 1;
    pub const SENTINEL_DISCONNECT: i64 = i64::MIN + 2;
}

pub mod timing {
    use std::time::Duration;

    /// Default tick period for the plant control loop.
    pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

    /// Default cadence buckets for the logging boundary.
    pub const LOG_CADENCE_1MN: Duration = Duration::from_secs(60);
    pub const LOG_CADENCE_5MN: Duration = Duration::from_secs(5 * 60);
    pub const LOG_CADENCE_15MN: Duration = Duration::from_secs(15 * 60);
}

pub mod curve {
    /// Minimum `tout1 < tout2` spread accepted by `make_bilinear`, in millikelvin.
    pub const MIN_CALIBRATION_SPREAD: i64 = super::KPRECISION;

    /// Bounds on `nH100` (hundredths of the non-linearity exponent).
    pub const NH100_MIN: i32 = 50;
    pub const NH100_MAX: i32 = 200;

    /// Reference ambient the calibration points are defined for, in Celsius.
    pub const REFERENCE_AMBIENT_C: i32 = 20;
}

pub mod defaults {
    /// Default boiler anti-freeze trip temperature, Celsius.
    pub const T_FREEZE_C: i32 = 5;

    /// Default hysteresis band applied around a building-model summer/frost limit, millikelvin.
    pub const BMODEL_HYSTERESIS: i64 = super::KPRECISION / 2;

    /// Default "mixed" building-model time constant divisor (tau / N).
    pub const MIXED_TAU_DIVISOR: u32 = 4;

    /// Default "attenuated" building-model time constant multiplier (tau * N).
    pub const ATTENUATED_TAU_MULTIPLIER: u32 = 3;

    /// Transition-completion bands, millikelvin.
    pub const TRANS_DOWN_BAND: i64 = super::KPRECISION / 2;
    pub const TRANS_UP_BAND: i64 = super::KPRECISION;

    /// Percent of target power output that gates TRANS_UP elapsed-time advance.
    pub const TRANS_UP_POWER_GATE_PERCENT: i32 = 75;
}

pub mod limits {
    /// Maximum length of an entity/logical-input name.
    pub const MAX_NAME_LEN: usize = 64;

    /// Maximum number of sources/targets a logical input/output may aggregate.
    pub const MAX_AGGREGATION_SOURCES: usize = 16;
}
