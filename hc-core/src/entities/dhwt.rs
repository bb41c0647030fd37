//! Domestic hot water tank: charge/legionella/electric-failover logic plus
//! DHW-priority signalling back to the plant.

use hc_error::{Error, Result};

use crate::data::types::{Handle, PumpId, RunMode, ScheduleId, Temperature};
use crate::entities::pump::Pump;
use crate::outputs::LogicalRelay;
use crate::plant_data::PlantFlags;
use crate::scheduler::Scheduler;
use crate::timekeep::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePriority {
    Absolute,
    SlidMax,
    SlidDhw,
    ParalMax,
    ParalDhw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    Never,
    /// Fires only if not already charged today.
    First,
    Always,
}

pub struct DhwtSettings {
    pub name: String,
    pub runmode: RunMode,
    pub schedule_id: ScheduleId,
    pub target_comfort: Temperature,
    pub target_eco: Temperature,
    pub target_frostfree: Temperature,
    pub t_legionella: Temperature,
    pub hysteresis: Temperature,
    pub limit_tmin: Temperature,
    pub limit_tmax: Temperature,
    pub limit_chargetime: Tick,
    pub force_mode: ForceMode,
    pub cprio: CascadePriority,
    pub electric_failover: bool,
    pub temp_inoffset: Temperature,
    pub feed_pump_id: PumpId,
    pub recycle_pump_id: Option<PumpId>,
    pub isolation_valve_relay: Option<Handle>,
    pub self_heater_relay: Option<Handle>,
    pub bottom_sensor: Handle,
    pub top_sensor: Handle,
}

pub struct DhwtRun {
    pub active: bool,
    pub charge_on: bool,
    pub electric_mode: bool,
    pub force_on: bool,
    pub legionella_on: bool,
    pub charge_overtime: bool,
    pub runmode: RunMode,
    pub target_temp: Option<Temperature>,
    pub heat_request: Option<Temperature>,
    pub mode_since: Option<Tick>,
    /// Tick-of-day (mod 86400 ticks) of the last completed force charge, so
    /// `ForceMode::First` fires at most once per day.
    pub charge_yday: Option<u64>,
    pub recycle_requested: bool,
    prev_runmode: RunMode,
    bottom_sensor_valid: bool,
}

impl Default for DhwtRun {
    fn default() -> Self {
        Self {
            active: false,
            charge_on: false,
            electric_mode: false,
            force_on: false,
            legionella_on: false,
            charge_overtime: false,
            runmode: RunMode::Off,
            target_temp: None,
            heat_request: None,
            mode_since: None,
            charge_yday: None,
            recycle_requested: false,
            prev_runmode: RunMode::Off,
            bottom_sensor_valid: true,
        }
    }
}

pub struct DhwTank {
    pub set: DhwtSettings,
    pub run: DhwtRun,
    configured: bool,
    online: bool,
}

const TICKS_PER_DAY: u64 = 86_400_000;

impl DhwTank {
    pub fn new(set: DhwtSettings) -> Self {
        let configured = set.feed_pump_id.is_set();
        Self {
            set,
            run: DhwtRun::default(),
            configured,
            online: false,
        }
    }

    pub fn online(&mut self) -> Result<()> {
        if !self.configured {
            return Err(Error::misconfigured(format!("dhwt {} has no feed pump configured", self.set.name)));
        }
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self) {
        self.run = DhwtRun::default();
        self.online = false;
    }

    fn target_for_mode(&self, mode: RunMode) -> Option<Temperature> {
        match mode {
            RunMode::Comfort => Some(self.set.target_comfort),
            RunMode::Eco => Some(self.set.target_eco),
            RunMode::Frostfree => Some(self.set.target_frostfree),
            RunMode::Dhwonly => Some(self.set.target_comfort),
            _ => None,
        }
    }

    /// Steps 1-5: resolves runmode/target, decides charge start/stop,
    /// enforces the charge-time ceiling, and signals priority flags.
    pub fn logic(
        &mut self,
        now: Tick,
        scheduler: &dyn Scheduler,
        system_mode: RunMode,
        bottom_temp: Result<Temperature>,
        top_temp: Result<Temperature>,
        plant_flags: &mut PlantFlags,
    ) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }

        // Step 1: effective runmode. A schedule entry, if present, also
        // carries the anti-legionella and recycle-pump requests for this
        // slot regardless of which branch picks the runmode.
        let entry = scheduler.schedule_current(self.set.schedule_id, now);
        if let Some(entry) = entry {
            self.run.legionella_on = entry.legionella;
            self.run.recycle_requested = entry.recycle;
        } else {
            self.run.legionella_on = false;
            self.run.recycle_requested = false;
        }

        let effective = if self.set.runmode == RunMode::Auto {
            match entry {
                Some(entry) if system_mode == RunMode::Auto => entry.dhwmode,
                _ => {
                    if system_mode == RunMode::Dhwonly {
                        self.set.runmode
                    } else {
                        system_mode
                    }
                }
            }
        } else {
            self.set.runmode
        };

        if effective != self.run.prev_runmode {
            self.run.mode_since = Some(now);
            if effective == RunMode::Comfort
                && matches!(self.set.force_mode, ForceMode::First | ForceMode::Always)
            {
                let today = now.0 / TICKS_PER_DAY;
                let fires = match self.set.force_mode {
                    ForceMode::Always => true,
                    ForceMode::First => self.run.charge_yday != Some(today),
                    ForceMode::Never => false,
                };
                self.run.force_on = fires;
            }
            self.run.prev_runmode = effective;
        }
        self.run.runmode = effective;

        if matches!(effective, RunMode::Off | RunMode::Test) {
            self.run.active = false;
            self.run.charge_on = false;
            self.run.heat_request = None;
            return Ok(());
        }
        self.run.active = true;

        // Step 2: target temperature.
        let mut target = self.target_for_mode(effective).unwrap_or(self.set.target_comfort);
        if self.run.legionella_on {
            target = self.set.t_legionella;
        }
        target = target.clamp(self.set.limit_tmin, self.set.limit_tmax);
        self.run.target_temp = Some(target);

        // Step 3: charge decision.
        self.run.bottom_sensor_valid = bottom_temp.is_ok();
        let below_hysteresis = bottom_temp
            .as_ref()
            .map(|t| t.millikelvin() < target.saturating_sub(self.set.hysteresis).millikelvin())
            .unwrap_or(false);
        let at_target = top_temp.as_ref().map(|t| t.millikelvin() >= target.millikelvin()).unwrap_or(false);

        if !self.run.charge_on && (below_hysteresis || self.run.force_on) {
            self.run.charge_on = true;
            self.run.mode_since = Some(now);
        } else if self.run.charge_on && at_target {
            self.run.charge_on = false;
            self.run.force_on = false;
            self.run.charge_overtime = false;
            if matches!(self.set.force_mode, ForceMode::First) {
                self.run.charge_yday = Some(now.0 / TICKS_PER_DAY);
            }
        }

        // Step 4: charge-time ceiling.
        if self.run.charge_on && self.set.limit_chargetime.0 > 0 {
            if let Some(since) = self.run.mode_since {
                if now.saturating_sub(since) > self.set.limit_chargetime.0 {
                    self.run.charge_overtime = true;
                }
            }
        }

        // Step 5: priority signalling.
        if self.run.charge_on {
            match self.set.cprio {
                CascadePriority::Absolute => plant_flags.dhwc_absolute = true,
                CascadePriority::SlidMax | CascadePriority::SlidDhw => plant_flags.dhwc_sliding = true,
                CascadePriority::ParalMax | CascadePriority::ParalDhw => {}
            }
        }

        // Step 8: heat-request emission (computed here so it participates in
        // the orchestrator's pre-heat-source aggregation, same as circuits).
        self.run.heat_request = if self.run.charge_on && !self.run.electric_mode {
            Some(target + self.set.temp_inoffset)
        } else {
            None
        };

        Ok(())
    }

    /// Steps 6-7: isolation valve, feed/recycle pumps, electric failover.
    pub fn run(
        &mut self,
        feed_pump: &mut Pump,
        recycle_pump: Option<&mut Pump>,
        isolation_relay: Option<&mut LogicalRelay>,
        self_heater_relay: Option<&mut LogicalRelay>,
    ) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }
        if !self.run.active {
            feed_pump.set_state(false, true)?;
            if let Some(p) = recycle_pump {
                p.set_state(false, true)?;
            }
            if let Some(r) = isolation_relay {
                r.set(false);
            }
            if let Some(r) = self_heater_relay {
                r.set(false);
            }
            return Ok(());
        }

        // Electric failover: no valid tank sensor, failover configured.
        self.run.electric_mode = self.set.electric_failover && !self.run.bottom_sensor_valid;

        if let Some(r) = isolation_relay {
            r.set(self.run.charge_on && !self.run.electric_mode);
        }

        feed_pump.set_state(self.run.charge_on && !self.run.electric_mode, false)?;
        if let Some(p) = recycle_pump {
            p.set_state(self.run.recycle_requested, false)?;
        }
        if let Some(r) = self_heater_relay {
            r.set(self.run.electric_mode);
        }

        Ok(())
    }
}
