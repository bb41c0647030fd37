//! Heat source: the one core-supported kind is a boiler with on/off-or-2-stage
//! burner relays, an optional return-mixing valve, and an optional load pump.

use hc_error::{Error, Result};

use crate::data::types::{Handle, PumpId, RunMode, ScheduleId, Temperature, ValveId};
use crate::entities::pump::Pump;
use crate::entities::valve::Valve;
use crate::numerics::{ewderiv, thrs_intg, EwDerivState, ThrsIntgState};
use crate::outputs::LogicalRelay;
use crate::plant_data::PlantFlags;
use crate::runtime::{Alarm, AlarmSeverity, AlarmSink};
use crate::scheduler::Scheduler;
use crate::timekeep::{Tick, TICKS_PER_SECOND};

/// Whether the burner may sit fully idle with no heat request, or must keep
/// maintaining `limit_tmin` outside `frostfree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    Always,
    FrostOnly,
}

/// Jacketed threshold integral clamp for the sliding consumer shift,
/// millikelvin-seconds (spec: "[-100 K·s, 0]"). `cshift_noncrit` itself is
/// `integral / KPRECISION`, i.e. the same number with the K·s-to-percent
/// division spec §4.8 specifies ("tick_to_seconds(integral)/1 K·s") folded
/// in, giving a plain percent in `[-100, 0]`.
const CSHIFT_JACKET_LO: i64 = -100 * crate::constants::KPRECISION;
const CSHIFT_JACKET_HI: i64 = 0;

/// Critical consumer shift commanded during overtemp, percent (spec:
/// "cshift_crit = +100").
const CSHIFT_CRIT_PCT: i32 = 100;

/// EWMA spread for the stage-2 engagement demand-trend derivative.
const STAGE2_DEMAND_DERIV_SPREAD_SECONDS: i64 = 60;

pub struct HeatSourceSettings {
    pub name: String,
    pub runmode: RunMode,
    pub schedule_id: ScheduleId,
    pub main_sensor: Handle,
    pub return_sensor: Handle,
    pub has_stage2: bool,
    /// Minimum time stage 1 must be on, at target+hysteresis, before stage 2
    /// is allowed to engage.
    pub stage2_delay: Tick,
    pub idle_mode: IdlePolicy,
    pub limit_tmin: Temperature,
    pub limit_tmax: Temperature,
    pub limit_thardmax: Temperature,
    pub hysteresis: Temperature,
    /// Minimum dwell time in either state before a stage may toggle again.
    pub burner_min_time: Tick,
    pub t_freeze: Temperature,
    pub limit_treturnmin: Temperature,
    /// How long the load pump and `floor_output` consumers stay armed after
    /// a burner stop.
    pub consumer_sdelay: Tick,
    pub load_pump_id: Option<PumpId>,
    pub return_valve_id: Option<ValveId>,
    pub stage1_relay: Handle,
    /// Unset when `has_stage2` is false.
    pub stage2_relay: Handle,
}

pub struct HeatSourceRun {
    pub effective_mode: RunMode,
    prev_mode: RunMode,
    pub stage1_on: bool,
    pub stage2_on: bool,
    stage1_since: Option<Tick>,
    stage2_since: Option<Tick>,
    pub antifreeze: bool,
    pub overtemp: bool,
    pub target: Option<Temperature>,
    /// Non-critical consumer shift, percent in `[-100, 0]`.
    pub cshift_noncrit: i32,
    thrs: ThrsIntgState,
    pub consumer_sdelay_remaining: Option<Tick>,
    last_logic_tick: Option<Tick>,
    /// When stage 1 first reached `target + hysteresis`; cleared once it
    /// drops back below. Feeds the stage-2 dwell-time gate.
    stage1_at_hi_since: Option<Tick>,
    stage2_demand_deriv: EwDerivState,
    /// Plant-wide sleep/summer flags as seen by the *previous* tick's
    /// arbitration (spec §4.10 step 11/step 2 both run after this entity's
    /// `logic()` in the per-tick order), latched here in `logic()` so `run()`
    /// decides off a stable snapshot.
    pub could_sleep: bool,
    pub summer_maintenance: bool,
}

impl Default for HeatSourceRun {
    fn default() -> Self {
        Self {
            effective_mode: RunMode::Off,
            prev_mode: RunMode::Off,
            stage1_on: false,
            stage2_on: false,
            stage1_since: None,
            stage2_since: None,
            antifreeze: false,
            overtemp: false,
            target: None,
            cshift_noncrit: 0,
            thrs: ThrsIntgState::default(),
            consumer_sdelay_remaining: None,
            last_logic_tick: None,
            stage1_at_hi_since: None,
            stage2_demand_deriv: EwDerivState::default(),
            could_sleep: false,
            summer_maintenance: false,
        }
    }
}

pub struct Boiler {
    pub set: HeatSourceSettings,
    pub run: HeatSourceRun,
    configured: bool,
    online: bool,
}

impl Boiler {
    pub fn new(set: HeatSourceSettings) -> Self {
        let configured = set.main_sensor.is_set();
        Self {
            set,
            run: HeatSourceRun::default(),
            configured,
            online: false,
        }
    }

    pub fn online(&mut self) -> Result<()> {
        if !self.configured {
            return Err(Error::misconfigured(format!("heat source {} has no main sensor configured", self.set.name)));
        }
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self) {
        self.run = HeatSourceRun::default();
        self.online = false;
    }

    /// Resolves the effective runmode, services the sliding consumer shift,
    /// and decrements the `consumer_sdelay` countdown. Performed before the
    /// orchestrator calls `run` so `plant_flags.consumer_sdelay_active`
    /// reflects the previous tick's burner-stop state, consistent with
    /// circuits reading it in their own `logic`.
    pub fn logic(
        &mut self,
        now: Tick,
        scheduler: &dyn Scheduler,
        system_mode: RunMode,
        plant_flags: &mut PlantFlags,
        boiler_temp: Result<Temperature>,
        plant_hrequest: Option<Temperature>,
    ) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }

        let effective = if self.set.runmode == RunMode::Auto {
            match scheduler.schedule_current(self.set.schedule_id, now) {
                Some(entry) if system_mode == RunMode::Auto => entry.runmode,
                _ => system_mode,
            }
        } else {
            self.set.runmode
        };
        if effective != self.run.prev_mode {
            self.run.prev_mode = effective;
        }
        self.run.effective_mode = effective;

        // Compute could_sleep (and the summer-maintenance flag it pairs
        // with) from the plant flag: both reflect the previous tick's
        // arbitration, since this entity's `logic()` runs ahead of the
        // orchestrator steps that (re)compute them this tick.
        self.run.could_sleep = plant_flags.plant_could_sleep;
        self.run.summer_maintenance = plant_flags.summer_maintenance;

        if plant_flags.dhwc_sliding {
            if let (Ok(sample), Some(thr)) = (boiler_temp, plant_hrequest) {
                let now_seconds = (now.0 / TICKS_PER_SECOND) as i64;
                let integral = thrs_intg(
                    &mut self.run.thrs,
                    thr.millikelvin(),
                    sample.millikelvin(),
                    now_seconds,
                    CSHIFT_JACKET_LO,
                    CSHIFT_JACKET_HI,
                );
                self.run.cshift_noncrit = (integral / crate::constants::KPRECISION) as i32;
            }
        } else {
            self.run.thrs.clear();
            self.run.cshift_noncrit = 0;
        }
        plant_flags.cshift_noncrit = self.run.cshift_noncrit;

        let elapsed = match self.run.last_logic_tick {
            Some(last) => now.saturating_sub(last),
            None => 0,
        };
        self.run.last_logic_tick = Some(now);
        if let Some(remaining) = self.run.consumer_sdelay_remaining {
            let next = remaining.0.saturating_sub(elapsed);
            self.run.consumer_sdelay_remaining = if next == 0 { None } else { Some(Tick(next)) };
        }
        plant_flags.consumer_sdelay_active = self.run.consumer_sdelay_remaining.is_some();

        Ok(())
    }

    /// Safety, anti-freeze, idle policy, burner hysteresis/stage logic,
    /// return mixing and load pump actuation.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        now: Tick,
        boiler_temp: Result<Temperature>,
        return_temp: Result<Temperature>,
        plant_hrequest: Option<Temperature>,
        plant_flags: &mut PlantFlags,
        stage1_relay: &mut LogicalRelay,
        stage2_relay: Option<&mut LogicalRelay>,
        load_pump: Option<&mut Pump>,
        return_valve: Option<&mut Valve>,
        alarms: &dyn AlarmSink,
    ) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }

        let t = match boiler_temp {
            Ok(t) => t,
            Err(e) => {
                stage1_relay.set(false);
                if let Some(r) = stage2_relay {
                    r.set(false);
                }
                self.run.stage1_on = false;
                self.run.stage2_on = false;
                alarms.raise(Alarm::new(
                    AlarmSeverity::Critical,
                    self.set.name.clone(),
                    format!("main sensor fault, burner forced off: {e}"),
                ));
                return Err(e);
            }
        };

        // Safety: hard-max overtemp forces every stage off regardless of
        // anything else and demands consumers dissipate.
        self.run.overtemp = t.millikelvin() >= self.set.limit_thardmax.millikelvin();
        plant_flags.cshift_crit = if self.run.overtemp { CSHIFT_CRIT_PCT } else { 0 };
        if self.run.overtemp {
            alarms.raise(Alarm::new(
                AlarmSeverity::Critical,
                self.set.name.clone(),
                format!("boiler overtemp: {:.1}C >= hard max {:.1}C", t.celsius(), self.set.limit_thardmax.celsius()),
            ));
        }

        // Anti-freeze latch: trips at t_freeze, only clears above limit_tmin.
        if !self.run.antifreeze && t.millikelvin() <= self.set.t_freeze.millikelvin() {
            self.run.antifreeze = true;
        }
        if self.run.antifreeze && t.millikelvin() > self.set.limit_tmin.millikelvin() {
            self.run.antifreeze = false;
        }

        let stop_allowed = match self.set.idle_mode {
            IdlePolicy::Always => true,
            IdlePolicy::FrostOnly => {
                self.run.effective_mode != RunMode::Frostfree || self.run.could_sleep || self.run.summer_maintenance
            }
        };

        let want_burner = if self.run.overtemp {
            false
        } else if self.run.antifreeze {
            true
        } else if plant_hrequest.is_none() && stop_allowed {
            false
        } else {
            true
        };

        let target = if want_burner {
            plant_hrequest
                .unwrap_or(self.set.limit_tmin)
                .clamp(self.set.limit_tmin, self.set.limit_tmax)
        } else {
            self.set.limit_tmin
        };
        self.run.target = Some(target);

        let desired_stage1 = if !want_burner {
            false
        } else if t.millikelvin() < target.millikelvin() {
            true
        } else if t.millikelvin() >= target.millikelvin() + self.set.hysteresis.millikelvin() {
            false
        } else {
            self.run.stage1_on
        };

        let stage1_changed = self.toggle_stage(
            now,
            self.run.stage1_on,
            desired_stage1,
            self.run.stage1_since,
            self.run.overtemp,
        );
        if let Some(new_state) = stage1_changed {
            if self.run.stage1_on && !new_state {
                if self.set.consumer_sdelay.0 > 0 {
                    self.run.consumer_sdelay_remaining = Some(self.set.consumer_sdelay);
                }
            }
            self.run.stage1_on = new_state;
            self.run.stage1_since = Some(now);
        }

        if self.set.has_stage2 {
            let at_target_hi = t.millikelvin() >= target.millikelvin() + self.set.hysteresis.millikelvin();
            if at_target_hi {
                if self.run.stage1_at_hi_since.is_none() {
                    self.run.stage1_at_hi_since = Some(now);
                }
            } else {
                self.run.stage1_at_hi_since = None;
                self.run.stage2_demand_deriv.clear();
            }
            let now_seconds = (now.0 / TICKS_PER_SECOND) as i64;
            // Trend of the demand target itself: stage 1 is already holding
            // target+hysteresis, so a still-rising target means downstream
            // load keeps growing faster than one stage can satisfy.
            let demand_trend =
                ewderiv(&mut self.run.stage2_demand_deriv, target.millikelvin(), now_seconds, STAGE2_DEMAND_DERIV_SPREAD_SECONDS);
            let at_hi_duration = self.run.stage1_at_hi_since.map(|s| now.saturating_sub(s)).unwrap_or(0);
            let desired_stage2 = self.run.stage1_on
                && at_target_hi
                && at_hi_duration >= self.set.stage2_delay.0
                && demand_trend > 0;
            let stage2_changed =
                self.toggle_stage(now, self.run.stage2_on, desired_stage2, self.run.stage2_since, self.run.overtemp);
            if let Some(new_state) = stage2_changed {
                self.run.stage2_on = new_state;
                self.run.stage2_since = Some(now);
            }
        } else {
            self.run.stage2_on = false;
        }

        stage1_relay.set(self.run.stage1_on);
        if let Some(r) = stage2_relay {
            r.set(self.run.stage2_on);
        }

        if let (Some(valve), Ok(rt)) = (return_valve, return_temp) {
            if rt.millikelvin() < self.set.limit_treturnmin.millikelvin() {
                valve.request(self.set.limit_treturnmin)?;
            }
        }

        if let Some(pump) = load_pump {
            let want_pump = self.run.stage1_on || self.run.consumer_sdelay_remaining.is_some();
            pump.set_state(want_pump, false)?;
        }

        Ok(())
    }

    /// Applies `burner_min_time` separation to a requested stage
    /// transition. `overtemp` bypasses the minimum dwell time since safety
    /// must act immediately. Returns the new state if a transition is
    /// enacted, `None` if the request is suppressed or unchanged.
    fn toggle_stage(&self, now: Tick, current: bool, desired: bool, since: Option<Tick>, overtemp: bool) -> Option<bool> {
        if desired == current {
            return None;
        }
        if overtemp {
            return Some(desired);
        }
        let elapsed = match since {
            Some(s) => now.saturating_sub(s),
            None => u64::MAX,
        };
        if elapsed >= self.set.burner_min_time.0 {
            Some(desired)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::pump::PumpSettings;
    use crate::hw::backend::RelayState;
    use crate::hw::memory::MemoryBackend;
    use crate::hw::registry::HardwareRegistry;
    use crate::outputs::{RawTarget, RelayMissingPolicy, RelayOp};
    use crate::runtime::LoggingAlarmSink;
    use crate::scheduler::NullScheduler;

    fn boiler() -> Boiler {
        Boiler::new(HeatSourceSettings {
            name: "boiler".into(),
            runmode: RunMode::Auto,
            schedule_id: Handle::UNSET,
            main_sensor: Handle(1),
            return_sensor: Handle::UNSET,
            has_stage2: false,
            stage2_delay: Tick(0),
            idle_mode: IdlePolicy::Always,
            limit_tmin: Temperature::from_celsius(20.0),
            limit_tmax: Temperature::from_celsius(80.0),
            limit_thardmax: Temperature::from_celsius(95.0),
            hysteresis: Temperature::from_millikelvin(5000),
            burner_min_time: Tick(0),
            t_freeze: Temperature::from_celsius(5.0),
            limit_treturnmin: Temperature::from_celsius(20.0),
            consumer_sdelay: Tick(60_000),
            load_pump_id: None,
            return_valve_id: None,
            stage1_relay: Handle(1),
            stage2_relay: Handle::UNSET,
        })
    }

    fn relay(name: &str) -> LogicalRelay {
        let mut backend = MemoryBackend::new();
        let r = backend.add_relay(name);
        let mut reg = HardwareRegistry::new();
        let bh = reg.register("bus", Box::new(backend)).unwrap();
        LogicalRelay::new(
            name,
            RelayOp::First,
            RelayMissingPolicy::Fail,
            vec![RawTarget { backend: bh, output: r }],
            RelayState::Off,
        )
        .unwrap()
    }

    #[test]
    fn burner_starts_below_target_and_stops_at_hysteresis_top() {
        let mut b = boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        b.logic(
            Tick(0),
            &NullScheduler,
            RunMode::Comfort,
            &mut flags,
            Ok(Temperature::from_celsius(40.0)),
            Some(Temperature::from_celsius(60.0)),
        )
        .unwrap();
        let mut s1 = relay("s1");
        let sink = LoggingAlarmSink;
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(40.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(60.0)),
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.stage1_on);

        b.run(
            Tick(1000),
            Ok(Temperature::from_celsius(60.5)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(60.0)),
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(!b.run.stage1_on);
    }

    #[test]
    fn hardmax_overtemp_forces_every_stage_off() {
        let mut b = boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        b.logic(
            Tick(0),
            &NullScheduler,
            RunMode::Comfort,
            &mut flags,
            Ok(Temperature::from_celsius(96.0)),
            Some(Temperature::from_celsius(60.0)),
        )
        .unwrap();
        let mut s1 = relay("s1");
        let sink = LoggingAlarmSink;
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(96.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(60.0)),
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.overtemp);
        assert!(!b.run.stage1_on);
    }

    #[test]
    fn antifreeze_forces_stage1_on_regardless_of_request() {
        let mut b = boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        b.logic(Tick(0), &NullScheduler, RunMode::Off, &mut flags, Ok(Temperature::from_celsius(3.0)), None)
            .unwrap();
        let mut s1 = relay("s1");
        let sink = LoggingAlarmSink;
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(3.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            None,
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.antifreeze);
        assert!(b.run.stage1_on);
    }

    #[test]
    fn burner_min_time_suppresses_rapid_restart() {
        let mut b = boiler();
        b.set.burner_min_time = Tick(30_000);
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        let sink = LoggingAlarmSink;
        let mut s1 = relay("s1");

        b.logic(
            Tick(0),
            &NullScheduler,
            RunMode::Comfort,
            &mut flags,
            Ok(Temperature::from_celsius(40.0)),
            Some(Temperature::from_celsius(60.0)),
        )
        .unwrap();
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(40.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(60.0)),
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.stage1_on);

        // Reaches stop threshold almost immediately: must stay on.
        b.run(
            Tick(1000),
            Ok(Temperature::from_celsius(65.5)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(60.0)),
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.stage1_on, "must not toggle off before burner_min_time elapses");
    }

    fn frostonly_boiler() -> Boiler {
        Boiler::new(HeatSourceSettings {
            name: "boiler".into(),
            runmode: RunMode::Frostfree,
            schedule_id: Handle::UNSET,
            main_sensor: Handle(1),
            return_sensor: Handle::UNSET,
            has_stage2: false,
            stage2_delay: Tick(0),
            idle_mode: IdlePolicy::FrostOnly,
            limit_tmin: Temperature::from_celsius(20.0),
            limit_tmax: Temperature::from_celsius(80.0),
            limit_thardmax: Temperature::from_celsius(95.0),
            hysteresis: Temperature::from_millikelvin(5000),
            burner_min_time: Tick(0),
            t_freeze: Temperature::from_celsius(5.0),
            limit_treturnmin: Temperature::from_celsius(20.0),
            consumer_sdelay: Tick(0),
            load_pump_id: None,
            return_valve_id: None,
            stage1_relay: Handle(1),
            stage2_relay: Handle::UNSET,
        })
    }

    #[test]
    fn frostonly_boiler_maintains_tmin_with_no_request_when_not_sleeping() {
        let mut b = frostonly_boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        b.logic(Tick(0), &NullScheduler, RunMode::Frostfree, &mut flags, Ok(Temperature::from_celsius(10.0)), None)
            .unwrap();
        let mut s1 = relay("s1");
        let sink = LoggingAlarmSink;
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(10.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            None,
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.stage1_on, "frostfree mode must keep maintaining limit_tmin while the plant isn't asleep");
    }

    #[test]
    fn plant_could_sleep_lets_frostonly_boiler_fully_idle() {
        let mut b = frostonly_boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        flags.plant_could_sleep = true;
        b.logic(Tick(0), &NullScheduler, RunMode::Frostfree, &mut flags, Ok(Temperature::from_celsius(10.0)), None)
            .unwrap();
        assert!(b.run.could_sleep);
        let mut s1 = relay("s1");
        let sink = LoggingAlarmSink;
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(10.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            None,
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(!b.run.stage1_on, "plant_could_sleep should override FrostOnly maintenance heating");
    }

    #[test]
    fn summer_maintenance_lets_frostonly_boiler_fully_idle() {
        let mut b = frostonly_boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        flags.summer_maintenance = true;
        b.logic(Tick(0), &NullScheduler, RunMode::Frostfree, &mut flags, Ok(Temperature::from_celsius(10.0)), None)
            .unwrap();
        assert!(b.run.summer_maintenance);
        let mut s1 = relay("s1");
        let sink = LoggingAlarmSink;
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(10.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            None,
            &mut flags,
            &mut s1,
            None,
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(!b.run.stage1_on, "summer_maintenance should override FrostOnly maintenance heating");
    }

    #[test]
    fn consumer_sdelay_arms_load_pump_after_burner_stop() {
        let mut b = boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        let sink = LoggingAlarmSink;
        let mut s1 = relay("s1");
        let mut pump = Pump::new(PumpSettings {
            name: "load".into(),
            rid_pump: Handle(2),
            cooldown_time: Tick(0),
        });
        pump.online().unwrap();

        b.logic(
            Tick(0),
            &NullScheduler,
            RunMode::Comfort,
            &mut flags,
            Ok(Temperature::from_celsius(40.0)),
            Some(Temperature::from_celsius(60.0)),
        )
        .unwrap();
        b.run(
            Tick(0),
            Ok(Temperature::from_celsius(40.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(60.0)),
            &mut flags,
            &mut s1,
            None,
            Some(&mut pump),
            None,
            &sink,
        )
        .unwrap();

        b.run(
            Tick(1000),
            Ok(Temperature::from_celsius(65.5)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            None,
            &mut flags,
            &mut s1,
            None,
            Some(&mut pump),
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.consumer_sdelay_remaining.is_some());

        b.logic(
            Tick(1000),
            &NullScheduler,
            RunMode::Comfort,
            &mut flags,
            Ok(Temperature::from_celsius(65.5)),
            None,
        )
        .unwrap();
        assert!(flags.consumer_sdelay_active);
    }

    fn two_stage_boiler() -> Boiler {
        Boiler::new(HeatSourceSettings {
            name: "boiler".into(),
            runmode: RunMode::Auto,
            schedule_id: Handle::UNSET,
            main_sensor: Handle(1),
            return_sensor: Handle::UNSET,
            has_stage2: true,
            stage2_delay: Tick(3000),
            idle_mode: IdlePolicy::Always,
            limit_tmin: Temperature::from_celsius(20.0),
            limit_tmax: Temperature::from_celsius(80.0),
            limit_thardmax: Temperature::from_celsius(95.0),
            hysteresis: Temperature::from_millikelvin(1000),
            burner_min_time: Tick(10_000),
            t_freeze: Temperature::from_celsius(5.0),
            limit_treturnmin: Temperature::from_celsius(20.0),
            consumer_sdelay: Tick(0),
            load_pump_id: None,
            return_valve_id: None,
            stage1_relay: Handle(1),
            stage2_relay: Handle(2),
        })
    }

    #[test]
    fn stage2_engages_after_dwell_at_hysteresis_top_while_demand_still_rising() {
        let mut b = two_stage_boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        let sink = LoggingAlarmSink;
        let mut s1 = relay("s1");
        let mut s2 = relay("s2");

        b.logic(Tick(1000), &NullScheduler, RunMode::Comfort, &mut flags, Ok(Temperature::from_celsius(40.0)), Some(Temperature::from_celsius(50.0)))
            .unwrap();

        // Demand climbs for a few ticks while the boiler stays well below
        // target+hysteresis, building a rising-trend history in the
        // demand-derivative filter.
        let steps: &[(u64, f64, f64)] = &[
            (1000, 40.0, 50.0),
            (2000, 52.0, 60.0),
            (3000, 66.0, 70.0),
        ];
        for &(ms, t_c, req_c) in steps {
            b.run(
                Tick(ms),
                Ok(Temperature::from_celsius(t_c)),
                Err(hc_error::Error::SensorInvalid("none".into())),
                Some(Temperature::from_celsius(req_c)),
                &mut flags,
                &mut s1,
                Some(&mut s2),
                None,
                None,
                &sink,
            )
            .unwrap();
        }
        assert!(b.run.stage1_on);
        assert!(!b.run.stage2_on, "stage2_delay dwell hasn't started yet");

        // Demand plateaus at 70C; the boiler now sits at target+hysteresis.
        // burner_min_time keeps stage1 latched on despite desired_stage1
        // flipping false here. The demand-derivative filter is still
        // decaying from the prior rise, so it stays positive for several
        // more ticks.
        for ms in [4000, 5000, 6000] {
            b.run(
                Tick(ms),
                Ok(Temperature::from_celsius(71.0)),
                Err(hc_error::Error::SensorInvalid("none".into())),
                Some(Temperature::from_celsius(70.0)),
                &mut flags,
                &mut s1,
                Some(&mut s2),
                None,
                None,
                &sink,
            )
            .unwrap();
            assert!(b.run.stage1_on, "burner_min_time must hold stage1 on through the dwell");
            assert!(!b.run.stage2_on, "stage2_delay dwell not yet satisfied at tick {ms}");
        }

        b.run(
            Tick(7000),
            Ok(Temperature::from_celsius(71.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(70.0)),
            &mut flags,
            &mut s1,
            Some(&mut s2),
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.stage2_on, "stage2 should engage once dwell elapses with demand still trending up");
    }

    #[test]
    fn stage2_stays_off_when_demand_is_not_rising() {
        let mut b = two_stage_boiler();
        b.online().unwrap();
        let mut flags = PlantFlags::default();
        let sink = LoggingAlarmSink;
        let mut s1 = relay("s1");
        let mut s2 = relay("s2");

        b.logic(Tick(1000), &NullScheduler, RunMode::Comfort, &mut flags, Ok(Temperature::from_celsius(40.0)), Some(Temperature::from_celsius(70.0)))
            .unwrap();

        // Establish stage1 below a target that never moves, then dwell at
        // target+hysteresis: demand never rises, so the derivative filter
        // never goes positive despite the dwell time being satisfied.
        b.run(
            Tick(1000),
            Ok(Temperature::from_celsius(40.0)),
            Err(hc_error::Error::SensorInvalid("none".into())),
            Some(Temperature::from_celsius(70.0)),
            &mut flags,
            &mut s1,
            Some(&mut s2),
            None,
            None,
            &sink,
        )
        .unwrap();
        assert!(b.run.stage1_on);

        for ms in [2000, 3000, 4000, 5000, 6000, 7000, 8000] {
            b.run(
                Tick(ms),
                Ok(Temperature::from_celsius(71.0)),
                Err(hc_error::Error::SensorInvalid("none".into())),
                Some(Temperature::from_celsius(70.0)),
                &mut flags,
                &mut s1,
                Some(&mut s2),
                None,
                None,
                &sink,
            )
            .unwrap();
        }
        assert!(b.run.stage1_on, "burner_min_time should still be holding stage1 on");
        assert!(!b.run.stage2_on, "stage2 must not engage without a rising demand trend");
    }
}
