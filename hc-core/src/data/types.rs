//! Core data types shared across the plant: fixed-point temperatures,
//! handles, and run/system modes.

use serde::{Deserialize, Serialize};

use crate::constants::KPRECISION;

/// A signed fixed-point Kelvin scalar, `KPRECISION` per Kelvin. Also used
/// for temperature deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Temperature(i64);

impl Default for Temperature {
    /// Zero millikelvin. Only meaningful as the identity element for
    /// additive shifts (e.g. [`crate::plant_data::PlantFlags`]'s consumer
    /// shifts), never as an absolute reading.
    fn default() -> Self {
        Self(0)
    }
}

impl Temperature {
    pub fn from_millikelvin(mk: i64) -> Self {
        Self(mk)
    }

    pub fn from_celsius(c: f64) -> Self {
        Self((((c + 273.0) * KPRECISION as f64).round()) as i64)
    }

    pub fn millikelvin(self) -> i64 {
        self.0
    }

    pub fn celsius(self) -> f64 {
        (self.0 as f64) / (KPRECISION as f64) - 273.0
    }

    pub fn saturating_add(self, delta: Temperature) -> Temperature {
        Temperature(self.0.saturating_add(delta.0))
    }

    pub fn saturating_sub(self, other: Temperature) -> Temperature {
        Temperature(self.0.saturating_sub(other.0))
    }

    pub fn clamp(self, lo: Temperature, hi: Temperature) -> Temperature {
        Temperature(self.0.clamp(lo.0, hi.0))
    }
}

impl std::ops::Add for Temperature {
    type Output = Temperature;
    fn add(self, rhs: Temperature) -> Temperature {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub for Temperature {
    type Output = Temperature;
    fn sub(self, rhs: Temperature) -> Temperature {
        self.saturating_sub(rhs)
    }
}

/// Dense small-integer handle. Zero is reserved as "unset" by convention
/// in namespaces that need it (peer-entity references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub u32);

impl Handle {
    pub const UNSET: Handle = Handle(0);

    pub fn is_set(self) -> bool {
        self.0 != 0
    }
}

pub type BackendId = Handle;
pub type BackendInputId = Handle;
pub type BackendOutputId = Handle;
pub type LogicalInputId = Handle;
pub type LogicalOutputId = Handle;
pub type ScheduleId = Handle;
pub type BuildingModelId = Handle;
pub type PumpId = Handle;
pub type ValveId = Handle;
/// A logical temperature input, indexed into [`crate::plant::Plant`]'s
/// sensor pool.
pub type SensorId = Handle;
/// A logical relay, indexed into [`crate::plant::Plant`]'s relay pool.
pub type RelayId = Handle;

/// Per-entity and global run mode. `Auto` means "follow the current
/// global/scheduled mode".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Off,
    Auto,
    Comfort,
    Eco,
    Frostfree,
    Dhwonly,
    Test,
}

/// System-wide mode: the run-mode set plus `Manual`, a startup-only variant
/// where per-entity run modes are taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    Off,
    Auto,
    Comfort,
    Eco,
    Frostfree,
    Dhwonly,
    Test,
    Manual,
}

impl SystemMode {
    /// Maps a system mode onto the run-mode set it corresponds to, where
    /// applicable (`Manual` has no run-mode equivalent).
    pub fn as_run_mode(self) -> Option<RunMode> {
        match self {
            SystemMode::Off => Some(RunMode::Off),
            SystemMode::Auto => Some(RunMode::Auto),
            SystemMode::Comfort => Some(RunMode::Comfort),
            SystemMode::Eco => Some(RunMode::Eco),
            SystemMode::Frostfree => Some(RunMode::Frostfree),
            SystemMode::Dhwonly => Some(RunMode::Dhwonly),
            SystemMode::Test => Some(RunMode::Test),
            SystemMode::Manual => None,
        }
    }
}
