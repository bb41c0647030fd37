//! Building thermal models: low-pass filters of outdoor temperature at two
//! extra time constants, plus the derived `summer`/`frost` flag pair.

use crate::constants::defaults;
use crate::data::types::{Handle, Temperature};
use crate::numerics::ewma;
use crate::timekeep::Tick;
use hc_error::Result;

pub struct BuildingModelSettings {
    pub name: String,
    /// Base time constant, seconds.
    pub tau_seconds: i64,
    pub limit_tsummer: Temperature,
    pub limit_tfrost: Temperature,
    /// Raw outdoor sensor the orchestrator resolves and feeds to `run`.
    pub outdoor_sensor: Handle,
}

#[derive(Default)]
pub struct BuildingModelRun {
    pub outdoor_60s_filtered: Option<Temperature>,
    pub outdoor_mixed_filtered: Option<Temperature>,
    pub outdoor_attenuated: Option<Temperature>,
    pub summer: bool,
    pub frost: bool,
    pub(crate) last_tick: Option<Tick>,
}

pub struct BuildingModel {
    pub set: BuildingModelSettings,
    pub run: BuildingModelRun,
    online: bool,
}

impl BuildingModel {
    pub fn new(set: BuildingModelSettings) -> Self {
        Self {
            set,
            run: BuildingModelRun::default(),
            online: false,
        }
    }

    pub fn online(&mut self) -> Result<()> {
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self) {
        self.run = BuildingModelRun::default();
        self.online = false;
    }

    /// Advances the three filters with a fresh outdoor reading and
    /// recomputes the summer/frost flags. `raw_outdoor` is the
    /// short-time-constant ("60s") input sample.
    pub fn run(&mut self, raw_outdoor: Temperature, now: Tick) -> Result<()> {
        if !self.online {
            return Ok(());
        }

        let dt = match self.run.last_tick {
            Some(last) => now.saturating_sub(last) as i64 / 1000,
            None => 0,
        };
        self.run.last_tick = Some(now);

        let mixed_tau = self.set.tau_seconds / defaults::MIXED_TAU_DIVISOR as i64;
        let attenuated_tau = self.set.tau_seconds * defaults::ATTENUATED_TAU_MULTIPLIER as i64;

        let prev_60s = self.run.outdoor_60s_filtered.unwrap_or(raw_outdoor);
        let prev_mixed = self.run.outdoor_mixed_filtered.unwrap_or(raw_outdoor);
        let prev_attenuated = self.run.outdoor_attenuated.unwrap_or(raw_outdoor);

        let filtered_60s = ewma(prev_60s.millikelvin(), raw_outdoor.millikelvin(), self.set.tau_seconds, dt.max(1));
        let filtered_mixed = ewma(prev_mixed.millikelvin(), raw_outdoor.millikelvin(), mixed_tau.max(1), dt.max(1));
        let filtered_attenuated = ewma(
            prev_attenuated.millikelvin(),
            raw_outdoor.millikelvin(),
            attenuated_tau,
            dt.max(1),
        );

        self.run.outdoor_60s_filtered = Some(Temperature::from_millikelvin(filtered_60s));
        self.run.outdoor_mixed_filtered = Some(Temperature::from_millikelvin(filtered_mixed));
        self.run.outdoor_attenuated = Some(Temperature::from_millikelvin(filtered_attenuated));

        let hysteresis = defaults::BMODEL_HYSTERESIS;
        let limit_summer = self.set.limit_tsummer.millikelvin();
        let limit_frost = self.set.limit_tfrost.millikelvin();

        let summer_candidate = filtered_60s > limit_summer + hysteresis
            && filtered_mixed > limit_summer + hysteresis
            && filtered_attenuated > limit_summer + hysteresis;
        if summer_candidate {
            self.run.summer = true;
        } else if filtered_60s < limit_summer - hysteresis
            || filtered_mixed < limit_summer - hysteresis
            || filtered_attenuated < limit_summer - hysteresis
        {
            self.run.summer = false;
        }

        self.run.frost = filtered_60s < limit_frost || filtered_mixed < limit_frost || filtered_attenuated < limit_frost;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> BuildingModel {
        BuildingModel::new(BuildingModelSettings {
            name: "house".into(),
            tau_seconds: 600,
            limit_tsummer: Temperature::from_celsius(18.0),
            limit_tfrost: Temperature::from_celsius(2.0),
            outdoor_sensor: Handle(1),
        })
    }

    #[test]
    fn filters_track_constant_input() {
        let mut m = model();
        m.online().unwrap();
        let raw = Temperature::from_celsius(25.0);
        let mut t = Tick(0);
        for _ in 0..2000 {
            t = Tick(t.0 + 1000);
            m.run(raw, t).unwrap();
        }
        let v = m.run.outdoor_60s_filtered.unwrap().celsius();
        assert!((v - 25.0).abs() < 1.0);
    }

    #[test]
    fn summer_flag_requires_all_three_filters_above_limit() {
        let mut m = model();
        m.online().unwrap();
        let raw = Temperature::from_celsius(30.0);
        let mut t = Tick(0);
        for _ in 0..20000 {
            t = Tick(t.0 + 1000);
            m.run(raw, t).unwrap();
        }
        assert!(m.run.summer);
    }

    #[test]
    fn frost_flag_trips_if_any_filter_below_limit() {
        let mut m = model();
        m.online().unwrap();
        let raw = Temperature::from_celsius(-5.0);
        let mut t = Tick(0);
        for _ in 0..5 {
            t = Tick(t.0 + 1000);
            m.run(raw, t).unwrap();
        }
        assert!(m.run.frost);
    }
}
