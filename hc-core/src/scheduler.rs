//! Scheduler boundary (spec "external interfaces"): a non-blocking lookup
//! from a schedule id to the currently active entry. The core only consumes
//! this; the scheduler's own storage and parsing live outside the core.

use crate::data::types::{RunMode, ScheduleId};
use crate::timekeep::Tick;

/// The currently active entry for one schedule, as of `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub runmode: RunMode,
    pub dhwmode: RunMode,
    pub legionella: bool,
    pub recycle: bool,
}

/// Implemented by whatever owns the parsed schedule tables. Must not block;
/// the plant orchestrator calls this once per circuit/DHWT per tick.
pub trait Scheduler: Send + Sync {
    fn schedule_current(&self, id: ScheduleId, now: Tick) -> Option<ScheduleEntry>;
}

/// A scheduler with no configured entries; every lookup returns `None`,
/// handing control back to the global/system mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScheduler;

impl Scheduler for NullScheduler {
    fn schedule_current(&self, _id: ScheduleId, _now: Tick) -> Option<ScheduleEntry> {
        None
    }
}
