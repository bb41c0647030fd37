//! Mixing valve: three-way (separate open/close relays) or two-way (single
//! trigger relay with a polarity flag) motorization, plus a binary
//! "isolation" type. Three control algorithms: bang-bang, sampled
//! approximation, velocity-form PI.

use hc_error::{Error, Result};

use crate::data::types::{Handle, Temperature};
use crate::hw::backend::RelayState;
use crate::outputs::LogicalRelay;
use crate::timekeep::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motorization {
    /// Separate open/close trigger relays.
    ThreeWay,
    /// Single trigger relay; `reverse_polarity` flips open/close meaning.
    TwoWay { reverse_polarity: bool },
    /// Binary isolation valve: fully open or fully closed, no modulation.
    Isolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveAlgorithm {
    BangBang,
    /// Sampled approximation: move by a fixed `amount` percent toward hot
    /// or cold every `sample_intvl`.
    Sapprox { sample_intvl: Tick, amount: i32 },
    /// Velocity-form PI, saturated-integral.
    Pi {
        tu_seconds: i64,
        td_seconds: i64,
        ksmax: i64,
        tune_f: i64,
        sample_intvl: Tick,
    },
}

pub struct ValveSettings {
    pub name: String,
    pub motorization: Motorization,
    /// Full-travel duration.
    pub ete_time: Tick,
    /// Percent-of-travel below which a requested move is a no-op.
    pub deadband: i32,
    /// Temperature band around the target in which no new target is enacted.
    pub tdeadzone: Temperature,
    pub tid_hot: Handle,
    pub tid_cold: Handle,
    pub tid_out: Handle,
    pub algorithm: ValveAlgorithm,
    /// Trigger relay. For `TwoWay`, the single relay; for `ThreeWay`, the
    /// open-direction relay.
    pub open_relay: Handle,
    /// Close-direction relay for `ThreeWay`; unset otherwise.
    pub close_relay: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Stop,
    Open,
    Close,
}

#[derive(Default)]
struct PiState {
    integral: i64,
    last_error: i64,
    last_sample_tick: Option<Tick>,
}

pub struct ValveRun {
    pub target_temp: Option<Temperature>,
    pub motor: MotorState,
    /// Estimated position in [0, 1000], 0 = fully cold/closed.
    pub position: i32,
    last_run_tick: Option<Tick>,
    last_sapprox_tick: Option<Tick>,
    pi: PiState,
    /// Set by [`Valve::force_open`]; consumed and cleared by the next
    /// [`Valve::run`], bypassing the configured algorithm and slew limit.
    forced_open: bool,
}

impl Default for ValveRun {
    fn default() -> Self {
        Self {
            target_temp: None,
            motor: MotorState::Stop,
            position: 0,
            last_run_tick: None,
            last_sapprox_tick: None,
            pi: PiState::default(),
            forced_open: false,
        }
    }
}

pub struct Valve {
    pub set: ValveSettings,
    pub run: ValveRun,
    configured: bool,
    online: bool,
}

impl Valve {
    pub fn new(set: ValveSettings) -> Self {
        let configured = match set.motorization {
            Motorization::Isolation => true,
            _ => set.tid_out.is_set(),
        };
        Self {
            set,
            run: ValveRun::default(),
            configured,
            online: false,
        }
    }

    pub fn online(&mut self) -> Result<()> {
        if !self.configured {
            return Err(Error::misconfigured(format!("valve {} missing sensor configuration", self.set.name)));
        }
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self, open_relay: &mut LogicalRelay, close_relay: Option<&mut LogicalRelay>) {
        self.run = ValveRun::default();
        self.online = false;
        open_relay.set(false);
        if let Some(r) = close_relay {
            r.set(false);
        }
    }

    /// Requests a new target water temperature.
    pub fn request(&mut self, target_temp: Temperature) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }
        self.run.target_temp = Some(target_temp);
        Ok(())
    }

    /// Forces the next [`Self::run`] to drive the valve fully open
    /// immediately, bypassing the configured control algorithm and slew
    /// limiting. Used by a heat source's overtemp safety path, where
    /// consumers must dissipate within the same tick rather than wait for
    /// a PI/bang-bang loop to slew toward a nudged setpoint.
    pub fn force_open(&mut self) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }
        self.run.forced_open = true;
        Ok(())
    }

    /// Advances the valve's algorithm and motor state machine, given the
    /// current hot/cold/out temperature readings.
    pub fn run(
        &mut self,
        now: Tick,
        t_hot: Temperature,
        t_cold: Temperature,
        t_out: Temperature,
        open_relay: &mut LogicalRelay,
        close_relay: Option<&mut LogicalRelay>,
    ) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }

        if self.run.forced_open {
            self.run.forced_open = false;
            self.run.motor = MotorState::Open;
            self.run.position = 1000;
            self.run.last_run_tick = Some(now);
            open_relay.set(true);
            if let Some(r) = close_relay {
                r.set(false);
            }
            return Ok(());
        }

        let Some(target) = self.run.target_temp else {
            return Ok(());
        };

        let dt_ticks = match self.run.last_run_tick {
            Some(last) => now.saturating_sub(last),
            None => 0,
        };
        self.run.last_run_tick = Some(now);

        let error = target.millikelvin() - t_out.millikelvin();
        let deadzone = self.set.tdeadzone.millikelvin();

        let desired_motor = if error.abs() <= deadzone {
            MotorState::Stop
        } else {
            match self.set.algorithm {
                ValveAlgorithm::BangBang => {
                    if error > 0 {
                        MotorState::Open
                    } else {
                        MotorState::Close
                    }
                }
                ValveAlgorithm::Sapprox { sample_intvl, amount } => {
                    self.run_sapprox(now, sample_intvl, amount, error)
                }
                ValveAlgorithm::Pi {
                    tu_seconds,
                    td_seconds,
                    ksmax,
                    tune_f,
                    sample_intvl,
                } => self.run_pi(now, sample_intvl, error, t_hot, t_cold, tu_seconds, td_seconds, ksmax, tune_f),
            }
        };

        self.run.motor = desired_motor;
        self.advance_position(dt_ticks, desired_motor);

        match desired_motor {
            MotorState::Stop => {
                open_relay.set(false);
                if let Some(r) = close_relay {
                    r.set(false);
                }
            }
            MotorState::Open => {
                open_relay.set(true);
                if let Some(r) = close_relay {
                    r.set(false);
                }
            }
            MotorState::Close => match self.set.motorization {
                Motorization::ThreeWay => {
                    open_relay.set(false);
                    if let Some(r) = close_relay {
                        r.set(true);
                    }
                }
                Motorization::TwoWay { reverse_polarity } => {
                    open_relay.set(!reverse_polarity);
                }
                Motorization::Isolation => {
                    open_relay.set(false);
                }
            },
        }

        Ok(())
    }

    fn run_sapprox(&mut self, now: Tick, sample_intvl: Tick, amount: i32, error: i64) -> MotorState {
        let due = match self.run.last_sapprox_tick {
            Some(last) => now.saturating_sub(last) >= sample_intvl.0,
            None => true,
        };
        if !due {
            return self.run.motor;
        }
        self.run.last_sapprox_tick = Some(now);
        let direction = if error > 0 { MotorState::Open } else { MotorState::Close };
        let delta = if matches!(direction, MotorState::Open) { amount } else { -amount };
        self.run.position = (self.run.position + delta * 10).clamp(0, 1000);
        direction
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pi(
        &mut self,
        now: Tick,
        sample_intvl: Tick,
        error: i64,
        _t_hot: Temperature,
        _t_cold: Temperature,
        tu_seconds: i64,
        td_seconds: i64,
        ksmax: i64,
        tune_f: i64,
    ) -> MotorState {
        let due = match self.run.pi.last_sample_tick {
            Some(last) => now.saturating_sub(last) >= sample_intvl.0,
            None => true,
        };
        if !due {
            return self.run.motor;
        }
        self.run.pi.last_sample_tick = Some(now);

        // Ziegler-Nichols-style: proportional gain scales inversely with the
        // ultimate period, so a slower-responding loop (larger `Tu`) gets a
        // gentler correction per sample.
        let kp = ksmax.saturating_div(tune_f.max(1).saturating_mul(tu_seconds.max(1)));
        let derivative = error - self.run.pi.last_error;
        self.run.pi.last_error = error;

        let velocity = kp * error + kp * td_seconds * derivative;
        self.run.pi.integral = self.run.pi.integral.saturating_add(velocity).clamp(-1000, 1000);

        let deadband_mk = self.set.deadband as i64 * 10;
        if self.run.pi.integral.abs() < deadband_mk {
            MotorState::Stop
        } else if self.run.pi.integral > 0 {
            MotorState::Open
        } else {
            MotorState::Close
        }
    }

    fn advance_position(&mut self, dt_ticks: u64, motor: MotorState) {
        if self.set.ete_time.0 == 0 {
            return;
        }
        let per_tick = (1000i64 * dt_ticks as i64) / self.set.ete_time.0 as i64;
        match motor {
            MotorState::Open => self.run.position = (self.run.position as i64 + per_tick).clamp(0, 1000) as i32,
            MotorState::Close => self.run.position = (self.run.position as i64 - per_tick).clamp(0, 1000) as i32,
            MotorState::Stop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::registry::HardwareRegistry;

    fn relays() -> (LogicalRelay, HardwareRegistry) {
        let mut backend = crate::hw::memory::MemoryBackend::new();
        let open = backend.add_relay("open");
        let mut reg = HardwareRegistry::new();
        let bh = reg.register("bus", Box::new(backend)).unwrap();
        let relay = LogicalRelay::new(
            "open",
            crate::outputs::RelayOp::First,
            crate::outputs::RelayMissingPolicy::Fail,
            vec![crate::outputs::RawTarget { backend: bh, output: open }],
            RelayState::Off,
        )
        .unwrap();
        (relay, reg)
    }

    fn valve() -> Valve {
        Valve::new(ValveSettings {
            name: "v1".into(),
            motorization: Motorization::TwoWay { reverse_polarity: false },
            ete_time: Tick(120_000),
            deadband: 2,
            tdeadzone: Temperature::from_millikelvin(200),
            tid_hot: Handle(1),
            tid_cold: Handle(2),
            tid_out: Handle(3),
            algorithm: ValveAlgorithm::BangBang,
            open_relay: Handle(1),
            close_relay: Handle::UNSET,
        })
    }

    #[test]
    fn bangbang_opens_when_below_target() {
        let mut v = valve();
        v.online().unwrap();
        v.request(Temperature::from_celsius(50.0)).unwrap();
        let (mut relay, _reg) = relays();
        v.run(
            Tick(1000),
            Temperature::from_celsius(70.0),
            Temperature::from_celsius(20.0),
            Temperature::from_celsius(30.0),
            &mut relay,
            None,
        )
        .unwrap();
        assert_eq!(v.run.motor, MotorState::Open);
    }

    #[test]
    fn position_slew_bounded_by_ete_time() {
        let mut v = valve();
        v.online().unwrap();
        v.request(Temperature::from_celsius(50.0)).unwrap();
        let (mut relay, _reg) = relays();
        let mut t = Tick(0);
        let mut last_pos = v.run.position;
        for _ in 0..20 {
            t = Tick(t.0 + 1000);
            v.run(
                t,
                Temperature::from_celsius(70.0),
                Temperature::from_celsius(20.0),
                Temperature::from_celsius(30.0),
                &mut relay,
                None,
            )
            .unwrap();
            let delta = (v.run.position - last_pos).abs() as f64;
            let max_delta = 1000.0 * 1.0 / (v.set.ete_time.0 as f64 / 1000.0);
            assert!(delta <= max_delta + 1.0);
            last_pos = v.run.position;
        }
    }

    fn pi_valve(tu_seconds: i64) -> Valve {
        Valve::new(ValveSettings {
            name: "v1".into(),
            motorization: Motorization::TwoWay { reverse_polarity: false },
            ete_time: Tick(120_000),
            deadband: 2,
            tdeadzone: Temperature::from_millikelvin(200),
            tid_hot: Handle(1),
            tid_cold: Handle(2),
            tid_out: Handle(3),
            algorithm: ValveAlgorithm::Pi {
                tu_seconds,
                td_seconds: 1,
                ksmax: 1000,
                tune_f: 1,
                sample_intvl: Tick(0),
            },
            open_relay: Handle(1),
            close_relay: Handle::UNSET,
        })
    }

    #[test]
    fn pi_gain_shrinks_as_ultimate_period_grows() {
        let (mut relay, _reg) = relays();

        let mut fast = pi_valve(1);
        fast.online().unwrap();
        fast.request(Temperature::from_celsius(50.0)).unwrap();
        fast.run(
            Tick(1000),
            Temperature::from_celsius(70.0),
            Temperature::from_celsius(20.0),
            Temperature::from_celsius(30.0),
            &mut relay,
            None,
        )
        .unwrap();

        let mut slow = pi_valve(100);
        slow.online().unwrap();
        slow.request(Temperature::from_celsius(50.0)).unwrap();
        slow.run(
            Tick(1000),
            Temperature::from_celsius(70.0),
            Temperature::from_celsius(20.0),
            Temperature::from_celsius(30.0),
            &mut relay,
            None,
        )
        .unwrap();

        assert!(slow.run.pi.integral.abs() < fast.run.pi.integral.abs());
    }

    #[test]
    fn force_open_bypasses_algorithm_and_slew() {
        let mut v = valve();
        v.online().unwrap();
        v.request(Temperature::from_celsius(21.0)).unwrap();
        v.force_open().unwrap();
        let (mut relay, _reg) = relays();
        v.run(
            Tick(1000),
            Temperature::from_celsius(70.0),
            Temperature::from_celsius(20.0),
            Temperature::from_celsius(20.0),
            &mut relay,
            None,
        )
        .unwrap();
        assert_eq!(v.run.motor, MotorState::Open);
        assert_eq!(v.run.position, 1000);
    }

    #[test]
    fn deadzone_suppresses_motor_near_target() {
        let mut v = valve();
        v.online().unwrap();
        v.request(Temperature::from_celsius(30.0)).unwrap();
        let (mut relay, _reg) = relays();
        v.run(
            Tick(1000),
            Temperature::from_celsius(70.0),
            Temperature::from_celsius(20.0),
            Temperature::from_celsius(30.05),
            &mut relay,
            None,
        )
        .unwrap();
        assert_eq!(v.run.motor, MotorState::Stop);
    }
}
