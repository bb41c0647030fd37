//! Core control logic for a residential/light-commercial hydronic heating
//! plant: heating circuits, domestic hot water tanks, heat sources, pumps
//! and mixing valves, driven by a fixed-order per-tick pass.
//!
//! # Module structure
//!
//! - `data/` - fixed-point temperature type, handles, run/system modes
//! - `hw/` - the hardware backend capability table and registry
//! - `entities/` - the five controlled devices (circuit, dhwt, heatsource,
//!   pump, valve), each owning its own settings/run-state/logic split
//! - `inputs` / `outputs` - logical sensor and relay aggregation over raw
//!   backend I/O
//! - `models` - building thermal model (outdoor filters, summer/frost flags)
//! - `plant` - the orchestrator: owns every entity and drives the per-tick
//!   pass
//! - `plant_data` - cross-entity defaults and per-tick flags
//! - `runtime` - system mode holder and the alarm-sink boundary
//! - `scheduler` - the schedule-lookup boundary
//! - `storage` - the durable-blob persistence boundary
//! - `config` - validated construction of a [`plant::Plant`] from settings
//! - `curve` / `numerics` - the bilinear heating-curve law and shared math
//!   (EWMA, threshold integral)
//! - `timekeep` - the monotonic tick clock
//! - `constants` - fixed-point precision and tuning defaults

pub mod config;
pub mod constants;
pub mod curve;
pub mod data;
pub mod entities;
pub mod hw;
pub mod inputs;
pub mod numerics;
pub mod outputs;
pub mod models;
pub mod plant;
pub mod plant_data;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod timekeep;

pub use data::types::{
    BackendId, BackendInputId, BackendOutputId, BuildingModelId, Handle, LogicalInputId,
    LogicalOutputId, PumpId, RelayId, RunMode, ScheduleId, SensorId, SystemMode, Temperature,
    ValveId,
};
pub use entities::{Boiler, DhwTank, HeatingCircuit, Pump, Valve};
pub use plant::Plant;
pub use plant_data::{PlantData, PlantDefaults, PlantFlags};
pub use runtime::{Alarm, AlarmSeverity, AlarmSink, Runtime};
pub use scheduler::{NullScheduler, Scheduler, ScheduleEntry};
pub use storage::{NullStorage, Storage};
pub use timekeep::{Tick, Timekeep};
