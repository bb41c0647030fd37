//! Heating circuit: resolves an effective runmode, models or measures room
//! ambient, evaluates the bilinear-20C water-temperature law, and actuates
//! the feed pump plus an optional mixing valve.

use hc_error::{Error, Result};

use crate::constants::defaults;
use crate::curve::Bilinear;
use crate::data::types::{BuildingModelId, Handle, PumpId, RunMode, ScheduleId, Temperature, ValveId};
use crate::entities::pump::Pump;
use crate::entities::valve::Valve;
use crate::models::BuildingModelRun;
use crate::plant_data::PlantFlags;
use crate::scheduler::Scheduler;
use crate::timekeep::Tick;

/// Consumer-shift percent at or above which a circuit's valve is forced
/// fully open instead of receiving a nudged setpoint (the heat source's
/// overtemp response commands exactly this value).
const CSHIFT_FORCE_OPEN_PCT: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Up,
    Down,
}

pub struct CircuitSettings {
    pub name: String,
    pub runmode: RunMode,
    pub schedule_id: ScheduleId,
    pub target_comfort: Temperature,
    pub target_eco: Temperature,
    pub target_frostfree: Temperature,
    pub outhoff_comfort: Option<Temperature>,
    pub outhoff_eco: Option<Temperature>,
    pub outhoff_frostfree: Option<Temperature>,
    pub outhoff_hysteresis: Temperature,
    /// Room-compensation gain, percent, clamped to `[-100, 100]`.
    pub ambient_factor: i32,
    /// Seconds for the TRANS_UP ambient-recovery time constant.
    pub am_tambient_tk: i64,
    pub boostdelta: Temperature,
    pub boost_maxtime: Tick,
    pub fast_cooldown: bool,
    pub curve: Bilinear,
    pub temp_inoffset: Temperature,
    pub limit_wtmin: Temperature,
    pub limit_wtmax: Temperature,
    /// Rate-of-rise limit, millikelvin per hour. Zero disables the limiter.
    pub wtemp_rorh: i64,
    pub tick_period_seconds: i64,
    pub pump_id: PumpId,
    pub valve_id: Option<ValveId>,
    pub bmodel_id: BuildingModelId,
    /// Physical room sensor, if any; the orchestrator resolves this and
    /// passes the reading as `logic`'s `measured_ambient`. Unset falls back
    /// to the modeled ambient.
    pub ambient_sensor: Option<Handle>,
}

pub struct CircuitRun {
    pub effective_mode: RunMode,
    prev_effective_mode: RunMode,
    pub outhoff: bool,
    pub transition: Transition,
    trans_start_ambient: Option<Temperature>,
    trans_since: Option<Tick>,
    pub modeled_ambient: Option<Temperature>,
    pub target_ambient: Option<Temperature>,
    pub target_wtemp: Option<Temperature>,
    prev_target_wtemp: Option<Temperature>,
    pub heat_request: Option<Temperature>,
    pub floor_output: bool,
    last_tick: Option<Tick>,
}

impl Default for CircuitRun {
    fn default() -> Self {
        Self {
            effective_mode: RunMode::Off,
            prev_effective_mode: RunMode::Off,
            outhoff: false,
            transition: Transition::None,
            trans_start_ambient: None,
            trans_since: None,
            modeled_ambient: None,
            target_ambient: None,
            target_wtemp: None,
            prev_target_wtemp: None,
            heat_request: None,
            floor_output: false,
            last_tick: None,
        }
    }
}

pub struct HeatingCircuit {
    pub set: CircuitSettings,
    pub run: CircuitRun,
    configured: bool,
    online: bool,
}

impl HeatingCircuit {
    pub fn new(set: CircuitSettings) -> Self {
        let configured = set.pump_id.is_set() && set.bmodel_id.is_set();
        Self {
            set,
            run: CircuitRun::default(),
            configured,
            online: false,
        }
    }

    pub fn online(&mut self) -> Result<()> {
        if !self.configured {
            return Err(Error::misconfigured(format!(
                "circuit {} needs a feed pump and a building model",
                self.set.name
            )));
        }
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self) {
        self.run = CircuitRun::default();
        self.online = false;
    }

    fn requested_ambient(&self, mode: RunMode) -> Option<Temperature> {
        match mode {
            RunMode::Comfort => Some(self.set.target_comfort),
            RunMode::Eco => Some(self.set.target_eco),
            RunMode::Frostfree => Some(self.set.target_frostfree),
            _ => None,
        }
    }

    fn outhoff_threshold(&self, mode: RunMode) -> Option<Temperature> {
        match mode {
            RunMode::Comfort => self.set.outhoff_comfort,
            RunMode::Eco => self.set.outhoff_eco,
            RunMode::Frostfree => self.set.outhoff_frostfree,
            _ => None,
        }
    }

    /// Resolves runmode, outdoor cutoff, transition state and the ambient
    /// target/model; computes `target_wtemp` and `heat_request` so the
    /// orchestrator can aggregate heat requests before the heat source runs.
    #[allow(clippy::too_many_arguments)]
    pub fn logic(
        &mut self,
        now: Tick,
        scheduler: &dyn Scheduler,
        system_mode: RunMode,
        plant_flags: &PlantFlags,
        bmodel: &BuildingModelRun,
        bmodel_tau_seconds: i64,
        measured_ambient: Option<Temperature>,
    ) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }

        let dt_seconds = match self.run.last_tick {
            Some(last) => now.saturating_sub(last) as i64 / 1000,
            None => 0,
        };
        self.run.last_tick = Some(now);

        // Step 1: resolve effective runmode.
        let mut effective = if self.set.runmode == RunMode::Auto {
            match scheduler.schedule_current(self.set.schedule_id, now) {
                Some(entry) if system_mode == RunMode::Auto => entry.runmode,
                _ => system_mode,
            }
        } else {
            self.set.runmode
        };
        if plant_flags.dhwc_absolute {
            effective = RunMode::Dhwonly;
        }

        // Step 2: derive requested ambient; off/test/dhwonly emit nothing.
        let requested_ambient = self.requested_ambient(effective);
        let Some(requested_ambient) = requested_ambient else {
            self.run.effective_mode = effective;
            self.run.heat_request = None;
            self.run.target_wtemp = None;
            self.run.outhoff = false;
            return Ok(());
        };

        // Step 3: outdoor-cutoff test.
        let mut outhoff = bmodel.summer;
        if !outhoff {
            if let Some(threshold) = self.outhoff_threshold(effective) {
                let threshold = threshold.millikelvin().min(requested_ambient.millikelvin());
                let hyst = self.set.outhoff_hysteresis.millikelvin();
                if let (Some(o60), Some(om), Some(oa)) = (
                    bmodel.outdoor_60s_filtered,
                    bmodel.outdoor_mixed_filtered,
                    bmodel.outdoor_attenuated,
                ) {
                    let (o60, om, oa) = (o60.millikelvin(), om.millikelvin(), oa.millikelvin());
                    if o60 > threshold && om > threshold && oa > threshold {
                        outhoff = true;
                    } else if o60 < threshold - hyst && om < threshold - hyst && oa < threshold - hyst {
                        outhoff = false;
                    } else {
                        outhoff = self.run.outhoff;
                    }
                }
            }
        }
        self.run.outhoff = outhoff;
        if outhoff && !bmodel.frost {
            effective = RunMode::Off;
        }

        // Step 4: transition detection.
        if effective != self.run.prev_effective_mode {
            if let Some(modeled) = self.run.modeled_ambient {
                self.run.transition = if requested_ambient.millikelvin() > modeled.millikelvin() {
                    Transition::Up
                } else {
                    Transition::Down
                };
                self.run.trans_start_ambient = Some(modeled);
                self.run.trans_since = Some(now);
            }
            self.run.prev_effective_mode = effective;
        }

        // Step 5: ambient model.
        let mut ambient_shift = Temperature::from_millikelvin(0);
        let modeled = if let Some(measured) = measured_ambient {
            let factor = self.set.ambient_factor.clamp(-100, 100) as i64;
            let delta = factor * (requested_ambient.millikelvin() - measured.millikelvin()) / 100;
            ambient_shift = Temperature::from_millikelvin(delta);
            measured
        } else {
            let prev = self.run.modeled_ambient.unwrap_or(requested_ambient);
            match (effective, self.run.transition) {
                (RunMode::Off, _) => {
                    let tau = bmodel_tau_seconds * defaults::ATTENUATED_TAU_MULTIPLIER as i64;
                    let target = bmodel.outdoor_mixed_filtered.unwrap_or(prev);
                    Temperature::from_millikelvin(crate::numerics::ewma(
                        prev.millikelvin(),
                        target.millikelvin(),
                        tau,
                        dt_seconds.max(1),
                    ))
                }
                (_, Transition::Down) => {
                    let tau = bmodel_tau_seconds * defaults::ATTENUATED_TAU_MULTIPLIER as i64;
                    Temperature::from_millikelvin(crate::numerics::ewma(
                        prev.millikelvin(),
                        requested_ambient.millikelvin(),
                        tau,
                        dt_seconds.max(1),
                    ))
                }
                (_, Transition::Up) => {
                    let start = self.run.trans_start_ambient.unwrap_or(prev);
                    let since = self.run.trans_since.unwrap_or(now);
                    let elapsed_seconds = now.saturating_sub(since) as i64 / 1000;

                    let gap = requested_ambient.millikelvin() - start.millikelvin();
                    let remaining = requested_ambient.millikelvin() - prev.millikelvin();
                    // Gate the elapsed-time advance: keep accumulating while
                    // less than 75% of the ambient gap has been recovered.
                    let recovered_pct = if gap != 0 { 100 - (remaining * 100 / gap) } else { 100 };
                    let power_gated = recovered_pct < defaults::TRANS_UP_POWER_GATE_PERCENT as i64;
                    let effective_elapsed = if power_gated { elapsed_seconds } else { 0 };

                    let tk = self.set.am_tambient_tk.max(1);
                    let denom = (requested_ambient.millikelvin() - prev.millikelvin()).max(1);
                    let boost_factor = 1.0 + self.set.boostdelta.millikelvin() as f64 / denom as f64;
                    let delta = (effective_elapsed as f64 / tk as f64) * boost_factor;
                    Temperature::from_millikelvin(start.millikelvin() + delta.round() as i64)
                }
                (_, Transition::None) => requested_ambient,
            }
        };
        self.run.modeled_ambient = Some(modeled);

        // Step 6: transition completion.
        match self.run.transition {
            Transition::Down => {
                if (modeled.millikelvin() - requested_ambient.millikelvin()).abs() <= defaults::TRANS_DOWN_BAND {
                    self.run.transition = Transition::None;
                    self.run.trans_since = None;
                }
            }
            Transition::Up => {
                if (requested_ambient.millikelvin() - modeled.millikelvin()).abs() <= defaults::TRANS_UP_BAND {
                    self.run.transition = Transition::None;
                    self.run.trans_since = None;
                } else if let Some(since) = self.run.trans_since {
                    if now.saturating_sub(since) < self.set.boost_maxtime.0 {
                        let measured_error = requested_ambient.saturating_sub(modeled);
                        let boost = self.set.boostdelta.max(measured_error);
                        ambient_shift = ambient_shift.max(boost);
                    }
                }
            }
            Transition::None => {}
        }

        let fast_cooldown_suppress =
            self.set.fast_cooldown && matches!(self.run.transition, Transition::Down) && !bmodel.frost;

        self.run.target_ambient = Some(requested_ambient.saturating_add(ambient_shift));
        self.run.effective_mode = effective;

        if effective == RunMode::Off || fast_cooldown_suppress {
            self.run.heat_request = None;
            self.run.target_wtemp = None;
            self.run.floor_output = false;
            return Ok(());
        }

        // Step 7: water-temperature target via the bilinear-20C law, clamped
        // and rate-of-rise limited.
        let outdoor = bmodel
            .outdoor_60s_filtered
            .unwrap_or_else(|| Temperature::from_celsius(0.0));
        let mut wtemp = self
            .set
            .curve
            .water_temp(outdoor, self.run.target_ambient.unwrap())
            .clamp(self.set.limit_wtmin, self.set.limit_wtmax);

        if self.set.wtemp_rorh > 0 {
            let rorh_increment = self.set.wtemp_rorh * self.set.tick_period_seconds / 3600;
            if let Some(prev_wtemp) = self.run.prev_target_wtemp {
                let max_wtemp = prev_wtemp.saturating_add(Temperature::from_millikelvin(rorh_increment));
                if wtemp.millikelvin() > max_wtemp.millikelvin() {
                    wtemp = max_wtemp;
                }
            }
        }
        self.run.prev_target_wtemp = Some(wtemp);
        self.run.target_wtemp = Some(wtemp);

        // Step 8: heat_request emission (actuation deferred to `run()`).
        self.run.heat_request = Some(wtemp + self.set.temp_inoffset);

        // Step 9: floor-output flag.
        self.run.floor_output = matches!(self.run.transition, Transition::Down)
            && plant_flags.consumer_sdelay_active
            && !plant_flags.dhwc_absolute;

        Ok(())
    }

    /// Actuates the feed pump and, if present, the mixing valve, using the
    /// target computed by [`Self::logic`]. `cshift_pct` is the heat
    /// source's combined consumer shift for this tick (sliding non-critical
    /// plus critical overtemp), a signed percent. At or above
    /// [`CSHIFT_FORCE_OPEN_PCT`] (the heat source's overtemp response) the
    /// valve is forced fully open this same tick regardless of its
    /// requested temperature; otherwise the percent nudges the requested
    /// water temperature within the circuit's configured envelope.
    pub fn run(&mut self, pump: &mut Pump, valve: Option<&mut Valve>, cshift_pct: i32) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }
        let wants_heat = self.run.heat_request.is_some();
        pump.set_state(wants_heat, false)?;
        if let Some(v) = valve {
            if cshift_pct >= CSHIFT_FORCE_OPEN_PCT {
                v.force_open()?;
            } else if wants_heat {
                let span = self.set.limit_wtmax.millikelvin() - self.set.limit_wtmin.millikelvin();
                let shift_mk = (span.max(0) * cshift_pct as i64) / 100;
                let target = self.run.target_wtemp.unwrap() + self.set.temp_inoffset + Temperature::from_millikelvin(shift_mk);
                v.request(target)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::make_bilinear;
    use crate::entities::pump::PumpSettings;
    use crate::entities::valve::{Motorization, MotorState, ValveAlgorithm, ValveSettings};
    use crate::hw::backend::RelayState;
    use crate::hw::memory::MemoryBackend;
    use crate::hw::registry::HardwareRegistry;
    use crate::outputs::{LogicalRelay, RawTarget, RelayMissingPolicy, RelayOp};

    fn curve() -> Bilinear {
        make_bilinear(
            Temperature::from_celsius(-10.0),
            Temperature::from_celsius(65.0),
            Temperature::from_celsius(15.0),
            Temperature::from_celsius(30.0),
            130,
        )
        .unwrap()
    }

    fn circuit() -> HeatingCircuit {
        HeatingCircuit::new(CircuitSettings {
            name: "living".into(),
            runmode: RunMode::Comfort,
            schedule_id: crate::data::types::Handle::UNSET,
            target_comfort: Temperature::from_celsius(21.0),
            target_eco: Temperature::from_celsius(18.0),
            target_frostfree: Temperature::from_celsius(7.0),
            outhoff_comfort: Some(Temperature::from_celsius(18.0)),
            outhoff_eco: Some(Temperature::from_celsius(15.0)),
            outhoff_frostfree: None,
            outhoff_hysteresis: Temperature::from_millikelvin(500),
            ambient_factor: 0,
            am_tambient_tk: 3600,
            boostdelta: Temperature::from_millikelvin(2000),
            boost_maxtime: Tick(3_600_000),
            fast_cooldown: false,
            curve: curve(),
            temp_inoffset: Temperature::from_millikelvin(0),
            limit_wtmin: Temperature::from_celsius(20.0),
            limit_wtmax: Temperature::from_celsius(80.0),
            wtemp_rorh: 10_000,
            tick_period_seconds: 1,
            pump_id: crate::data::types::Handle(1),
            valve_id: None,
            bmodel_id: crate::data::types::Handle(1),
            ambient_sensor: None,
        })
    }

    fn bmodel_run(outdoor_c: f64) -> BuildingModelRun {
        let t = Temperature::from_celsius(outdoor_c);
        BuildingModelRun {
            outdoor_60s_filtered: Some(t),
            outdoor_mixed_filtered: Some(t),
            outdoor_attenuated: Some(t),
            summer: false,
            frost: false,
            ..Default::default()
        }
    }

    fn pump_and_relay() -> (Pump, LogicalRelay) {
        let mut pump = Pump::new(PumpSettings {
            name: "p".into(),
            rid_pump: crate::data::types::Handle(1),
            cooldown_time: Tick(0),
        });
        pump.online().unwrap();
        let mut backend = MemoryBackend::new();
        let r = backend.add_relay("pump");
        let mut reg = HardwareRegistry::new();
        let bh = reg.register("bus", Box::new(backend)).unwrap();
        let relay = LogicalRelay::new(
            "pump",
            RelayOp::First,
            RelayMissingPolicy::Fail,
            vec![RawTarget { backend: bh, output: r }],
            RelayState::Off,
        )
        .unwrap();
        (pump, relay)
    }

    fn valve_and_relay() -> (Valve, LogicalRelay) {
        let v = Valve::new(ValveSettings {
            name: "mix".into(),
            motorization: Motorization::TwoWay { reverse_polarity: false },
            ete_time: Tick(120_000),
            deadband: 2,
            tdeadzone: Temperature::from_millikelvin(200),
            tid_hot: crate::data::types::Handle(1),
            tid_cold: crate::data::types::Handle(2),
            tid_out: crate::data::types::Handle(3),
            algorithm: ValveAlgorithm::BangBang,
            open_relay: crate::data::types::Handle(1),
            close_relay: crate::data::types::Handle::UNSET,
        });
        let mut backend = MemoryBackend::new();
        let r = backend.add_relay("open");
        let mut reg = HardwareRegistry::new();
        let bh = reg.register("bus", Box::new(backend)).unwrap();
        let relay = LogicalRelay::new(
            "open",
            RelayOp::First,
            RelayMissingPolicy::Fail,
            vec![RawTarget { backend: bh, output: r }],
            RelayState::Off,
        )
        .unwrap();
        (v, relay)
    }

    #[test]
    fn outdoor_cutoff_suppresses_heat_request() {
        let mut c = circuit();
        c.online().unwrap();
        let bm = bmodel_run(25.0);
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &bm, 600, None)
            .unwrap();
        assert!(c.run.outhoff);
        assert!(c.run.heat_request.is_none());
    }

    #[test]
    fn comfort_mode_emits_heat_request_in_winter() {
        let mut c = circuit();
        c.online().unwrap();
        let bm = bmodel_run(0.0);
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &bm, 600, None)
            .unwrap();
        assert!(!c.run.outhoff);
        assert!(c.run.heat_request.is_some());
    }

    #[test]
    fn dhwc_absolute_forces_dhwonly_and_clears_request() {
        let mut c = circuit();
        c.online().unwrap();
        let bm = bmodel_run(0.0);
        let mut flags = PlantFlags::default();
        flags.dhwc_absolute = true;
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &flags, &bm, 600, None)
            .unwrap();
        assert_eq!(c.run.effective_mode, RunMode::Dhwonly);
        assert!(c.run.heat_request.is_none());
    }

    #[test]
    fn rate_of_rise_limiter_bounds_wtemp_increase() {
        let mut c = circuit();
        c.online().unwrap();
        let cold = bmodel_run(-10.0);
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &cold, 600, None)
            .unwrap();
        let first = c.run.target_wtemp.unwrap();

        c.logic(Tick(2000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &cold, 600, None)
            .unwrap();
        let second = c.run.target_wtemp.unwrap();

        let rorh_increment = c.set.wtemp_rorh * c.set.tick_period_seconds / 3600;
        assert!(second.millikelvin() - first.millikelvin() <= rorh_increment + 1);
    }

    #[test]
    fn run_commands_pump_on_when_heating() {
        let mut c = circuit();
        c.online().unwrap();
        let bm = bmodel_run(0.0);
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &bm, 600, None)
            .unwrap();
        let (mut pump, mut relay) = pump_and_relay();
        c.run(&mut pump, None, 0).unwrap();
        pump.run(Tick(1000), &mut relay).unwrap();
        assert!(pump.get_state());
    }

    #[test]
    fn critical_cshift_forces_valve_fully_open_same_tick() {
        let mut c = circuit();
        c.online().unwrap();
        let bm = bmodel_run(0.0);
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &bm, 600, None)
            .unwrap();

        let (mut pump, _prelay) = pump_and_relay();
        let (mut valve, mut vrelay) = valve_and_relay();
        valve.online().unwrap();
        // Target just above the cold-side reading so a non-forced PI/bang-bang
        // pass would leave the valve closed or barely moving.
        valve.request(Temperature::from_celsius(21.0)).unwrap();

        c.run(&mut pump, Some(&mut valve), 100).unwrap();
        valve
            .run(Tick(1000), Temperature::from_celsius(70.0), Temperature::from_celsius(20.0), Temperature::from_celsius(20.0), &mut vrelay, None)
            .unwrap();

        assert_eq!(valve.run.motor, MotorState::Open);
        assert_eq!(valve.run.position, 1000, "overtemp must drive the valve fully open within the same tick, not slew toward it");
    }

    #[test]
    fn noncritical_cshift_nudges_valve_target_within_envelope() {
        let mut c = circuit();
        c.online().unwrap();
        let bm = bmodel_run(0.0);
        c.logic(Tick(1000), &crate::scheduler::NullScheduler, RunMode::Comfort, &PlantFlags::default(), &bm, 600, None)
            .unwrap();
        let baseline_wtemp = c.run.target_wtemp.unwrap();

        let (mut pump, _prelay) = pump_and_relay();
        let (mut valve, _vrelay) = valve_and_relay();
        valve.online().unwrap();

        c.run(&mut pump, Some(&mut valve), -50).unwrap();
        let shifted = valve.run.target_temp.unwrap();

        assert!(shifted.millikelvin() < baseline_wtemp.millikelvin(), "a negative cshift percent should pull the requested setpoint down");
        let span = c.set.limit_wtmax.millikelvin() - c.set.limit_wtmin.millikelvin();
        assert!(baseline_wtemp.millikelvin() - shifted.millikelvin() <= span / 2 + 1);
    }
}
