//! Shared read-only snapshot every entity may read: plant defaults and the
//! per-tick global flags that cross-entity arbitration sets and clears.

use crate::data::types::{RunMode, Temperature};
use crate::timekeep::Tick;

/// Plant-wide defaults, used as fallback when a per-entity param is unset.
#[derive(Debug, Clone)]
pub struct PlantDefaults {
    pub target_comfort: Temperature,
    pub target_eco: Temperature,
    pub target_frostfree: Temperature,
    pub limit_wtmin: Temperature,
    pub limit_wtmax: Temperature,
    /// How long the plant must see no heat request, with no DHWT charging,
    /// before `plant_could_sleep` is asserted (spec §4.10 step 11).
    pub sleeping_delay: Tick,
}

/// Global flags recomputed every tick by cross-entity arbitration (spec
/// §4.10). Reset at the start of each pass unless re-asserted.
#[derive(Debug, Clone, Default)]
pub struct PlantFlags {
    /// Set by a DHWT with `dhwt_cprio = absolute` while charging; forces
    /// every circuit to `dhwonly` for the tick.
    pub dhwc_absolute: bool,
    /// Set by a DHWT with a sliding-priority mode while charging; the heat
    /// source applies a consumer shift in response.
    pub dhwc_sliding: bool,
    /// True iff no heat request for `sleeping_delay` and no DHWT charging.
    pub plant_could_sleep: bool,
    /// True iff every configured building model reports `summer`. Lets a
    /// `FrostOnly` heat source skip its `limit_tmin` maintenance heating the
    /// way `plant_could_sleep` does, since no circuit will be requesting
    /// space heat while the building model agrees it's summer. `false` when
    /// no building model is configured. Recomputed every tick (step 2); not
    /// reset here.
    pub summer_maintenance: bool,
    /// Set by the heat source while its post-burner-stop `consumer_sdelay`
    /// countdown is running. Persists across the reset in
    /// [`Self::reset_for_tick`] so a circuit's floor-output decision (step 4
    /// of its own per-tick pass, which runs before the heat source's) can
    /// see the countdown armed by the *previous* tick.
    pub consumer_sdelay_active: bool,
    /// Non-critical consumer shift from the heat source's jacketed
    /// threshold integral while `dhwc_sliding` is active: a percent in
    /// `[-100, 0]`. Recomputed every tick by the heat source; not reset
    /// here.
    pub cshift_noncrit: i32,
    /// Critical consumer shift, percent, `+100` while the heat source is in
    /// overtemp safety shutdown so downstream valves dump heat rather than
    /// throttle; `0` otherwise. Recomputed every tick; not reset here.
    pub cshift_crit: i32,
}

impl PlantFlags {
    /// Resets the per-tick flags at the start of a pass (step 1 of
    /// orchestrator's per-tick sequence): `dhwc_absolute` always clears;
    /// `dhwc_sliding` clears unless re-asserted this tick by a DHWT.
    pub fn reset_for_tick(&mut self) {
        self.dhwc_absolute = false;
        self.dhwc_sliding = false;
    }
}

/// Run-time-based energy estimate, accumulated in tick units (spec §6's log
/// boundary lists `metrics[]`; this is the simplest metric worth keeping
/// without a thermal power model — total time each burner stage spent on).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyCounters {
    pub stage1_on_ticks: u64,
    pub stage2_on_ticks: u64,
}

impl EnergyCounters {
    pub fn accumulate(&mut self, stage1_on: bool, stage2_on: bool, dt_ticks: u64) {
        if stage1_on {
            self.stage1_on_ticks = self.stage1_on_ticks.saturating_add(dt_ticks);
        }
        if stage2_on {
            self.stage2_on_ticks = self.stage2_on_ticks.saturating_add(dt_ticks);
        }
    }
}

pub struct PlantData {
    pub defaults: PlantDefaults,
    pub flags: PlantFlags,
    pub system_mode: RunMode,
    pub energy: EnergyCounters,
}

impl PlantData {
    pub fn new(defaults: PlantDefaults) -> Self {
        Self {
            defaults,
            flags: PlantFlags::default(),
            system_mode: RunMode::Off,
            energy: EnergyCounters::default(),
        }
    }
}
