//! Core data types and configuration-time validation.

pub mod types;
pub mod validation;

pub use types::{
    BackendId, BackendInputId, BackendOutputId, BuildingModelId, Handle, LogicalInputId,
    LogicalOutputId, PumpId, RunMode, ScheduleId, SystemMode, Temperature, ValveId,
};
