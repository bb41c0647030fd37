//! Configuration boundary: the plant graph is assembled by an external
//! parser/caller (spec §6 lists the text-config parser as a collaborator,
//! not part of the core) and handed to [`Plant::configure`] as a
//! [`PlantConfig`]. Everything here is pure data plus cross-reference
//! validation; no I/O, no hardware access.
//!
//! Pool entries must be declared in dependency order: sensors and relays
//! first (any raw backend handle they carry must already be registered),
//! then building models, pumps and valves, then circuits/DHWTs/heat
//! sources, which reference the former by 1-based [`Handle`].

use hc_error::Result;

use crate::data::types::Handle;
use crate::data::validation::{validate_handle_ref, validate_optional_handle_ref};
use crate::entities::circuit::CircuitSettings;
use crate::entities::dhwt::DhwtSettings;
use crate::entities::heatsource::HeatSourceSettings;
use crate::entities::pump::PumpSettings;
use crate::entities::valve::ValveSettings;
use crate::inputs::LogicalTempInput;
use crate::models::BuildingModelSettings;
use crate::outputs::LogicalRelay;
use crate::plant::Plant;
use crate::plant_data::PlantDefaults;

/// The whole plant graph, pre-resolved against already-registered hardware
/// backends, ready for [`Plant::configure`].
pub struct PlantConfig {
    pub defaults: PlantDefaults,
    pub sensors: Vec<LogicalTempInput>,
    pub relays: Vec<LogicalRelay>,
    pub building_models: Vec<BuildingModelSettings>,
    pub pumps: Vec<PumpSettings>,
    pub valves: Vec<ValveSettings>,
    pub circuits: Vec<CircuitSettings>,
    pub dhwts: Vec<DhwtSettings>,
    pub heat_sources: Vec<HeatSourceSettings>,
}

impl PlantConfig {
    /// Cross-reference and bounds checks: every handle an entity's settings
    /// carries must point at a pool entry declared earlier in this config.
    /// Does not touch hardware; `Plant::online` is what discovers a
    /// misconfigured backend.
    pub fn validate(&self) -> Result<()> {
        let sensors = self.sensors.len();
        let relays = self.relays.len();
        let bmodels = self.building_models.len();
        let pumps = self.pumps.len();
        let valves = self.valves.len();

        for m in &self.building_models {
            validate_handle_ref("building model outdoor_sensor", m.outdoor_sensor, sensors)?;
        }

        for p in &self.pumps {
            validate_handle_ref("pump relay", p.rid_pump, relays)?;
        }

        for v in &self.valves {
            validate_handle_ref("valve tid_hot", v.tid_hot, sensors)?;
            validate_handle_ref("valve tid_cold", v.tid_cold, sensors)?;
            validate_handle_ref("valve tid_out", v.tid_out, sensors)?;
            validate_handle_ref("valve open_relay", v.open_relay, relays)?;
            validate_optional_handle_ref("valve close_relay", set_if(v.close_relay), relays)?;
        }

        for c in &self.circuits {
            validate_handle_ref("circuit pump_id", c.pump_id, pumps)?;
            validate_optional_handle_ref("circuit valve_id", c.valve_id, valves)?;
            validate_handle_ref("circuit bmodel_id", c.bmodel_id, bmodels)?;
            validate_optional_handle_ref("circuit ambient_sensor", c.ambient_sensor, sensors)?;
        }

        for t in &self.dhwts {
            validate_handle_ref("dhwt bottom_sensor", t.bottom_sensor, sensors)?;
            validate_handle_ref("dhwt top_sensor", t.top_sensor, sensors)?;
            validate_handle_ref("dhwt feed_pump_id", t.feed_pump_id, pumps)?;
            validate_optional_handle_ref("dhwt recycle_pump_id", t.recycle_pump_id, pumps)?;
            validate_optional_handle_ref("dhwt isolation_valve_relay", t.isolation_valve_relay, relays)?;
            validate_optional_handle_ref("dhwt self_heater_relay", t.self_heater_relay, relays)?;
        }

        for h in &self.heat_sources {
            validate_handle_ref("heat source main_sensor", h.main_sensor, sensors)?;
            if h.return_sensor.is_set() {
                validate_handle_ref("heat source return_sensor", h.return_sensor, sensors)?;
            }
            validate_handle_ref("heat source stage1_relay", h.stage1_relay, relays)?;
            if h.has_stage2 {
                validate_handle_ref("heat source stage2_relay", h.stage2_relay, relays)?;
            }
            validate_optional_handle_ref("heat source load_pump_id", h.load_pump_id, pumps)?;
            validate_optional_handle_ref("heat source return_valve_id", h.return_valve_id, valves)?;
        }

        Ok(())
    }
}

/// Treats an always-set-by-convention `Handle` field as `Option<Handle>` for
/// the optional-ref validator, so `Handle::UNSET` (a valve with no close
/// relay) is accepted while any other out-of-range value is rejected.
fn set_if(h: Handle) -> Option<Handle> {
    if h.is_set() {
        Some(h)
    } else {
        None
    }
}

impl Plant {
    /// Validates `config` and populates a fresh plant graph from it, in
    /// pool-declaration order. Returns the populated, still-offline plant;
    /// call [`Plant::online`] before the first tick.
    pub fn configure(mut self, config: PlantConfig) -> Result<Self> {
        config.validate()?;

        self.data.defaults = config.defaults;

        for sensor in config.sensors {
            self.add_sensor(sensor);
        }
        for relay in config.relays {
            self.add_relay(relay);
        }
        for m in config.building_models {
            self.add_building_model(m);
        }
        for p in config.pumps {
            self.add_pump(p);
        }
        for v in config.valves {
            self.add_valve(v);
        }
        for c in config.circuits {
            self.add_circuit(c);
        }
        for t in config.dhwts {
            self.add_dhwt(t);
        }
        for h in config.heat_sources {
            self.add_heat_source(h);
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{RunMode, Temperature};
    use crate::entities::heatsource::IdlePolicy;
    use crate::entities::valve::{Motorization, ValveAlgorithm};
    use crate::hw::backend::RelayState;
    use crate::hw::memory::MemoryBackend;
    use crate::hw::registry::HardwareRegistry;
    use crate::inputs::{MissingPolicy, RawSource, TempOp};
    use crate::outputs::{RawTarget, RelayMissingPolicy, RelayOp};
    use crate::runtime::{LoggingAlarmSink, Runtime};
    use crate::scheduler::NullScheduler;
    use crate::timekeep::Tick;
    use std::sync::Arc;

    fn defaults() -> PlantDefaults {
        PlantDefaults {
            target_comfort: Temperature::from_celsius(21.0),
            target_eco: Temperature::from_celsius(18.0),
            target_frostfree: Temperature::from_celsius(7.0),
            limit_wtmin: Temperature::from_celsius(20.0),
            limit_wtmax: Temperature::from_celsius(80.0),
            sleeping_delay: Tick(600_000),
        }
    }

    fn minimal_config(registry: &mut HardwareRegistry) -> PlantConfig {
        let mut backend = MemoryBackend::new();
        let outdoor = backend.add_temperature("outdoor", Temperature::from_celsius(5.0));
        let boiler_t = backend.add_temperature("boiler", Temperature::from_celsius(40.0));
        let pump_relay = backend.add_relay("pump");
        let burner_relay = backend.add_relay("burner");
        let bh = registry.register("bus", Box::new(backend)).unwrap();

        let outdoor_sensor =
            LogicalTempInput::new("outdoor", Tick(0), TempOp::First, MissingPolicy::Fail, None, vec![RawSource { backend: bh, input: outdoor }]).unwrap();
        let boiler_sensor =
            LogicalTempInput::new("boiler", Tick(0), TempOp::First, MissingPolicy::Fail, None, vec![RawSource { backend: bh, input: boiler_t }]).unwrap();
        let pump_relay_logical = LogicalRelay::new("pump", RelayOp::First, RelayMissingPolicy::Fail, vec![RawTarget { backend: bh, output: pump_relay }], RelayState::Off).unwrap();
        let burner_relay_logical =
            LogicalRelay::new("burner", RelayOp::First, RelayMissingPolicy::Fail, vec![RawTarget { backend: bh, output: burner_relay }], RelayState::Off).unwrap();

        PlantConfig {
            defaults: defaults(),
            sensors: vec![outdoor_sensor, boiler_sensor],
            relays: vec![pump_relay_logical, burner_relay_logical],
            building_models: vec![BuildingModelSettings {
                name: "house".into(),
                tau_seconds: 600,
                limit_tsummer: Temperature::from_celsius(18.0),
                limit_tfrost: Temperature::from_celsius(2.0),
                outdoor_sensor: Handle(1),
            }],
            pumps: vec![PumpSettings {
                name: "feed".into(),
                rid_pump: Handle(1),
                cooldown_time: Tick(0),
            }],
            valves: vec![],
            circuits: vec![CircuitSettings {
                name: "living".into(),
                runmode: RunMode::Comfort,
                schedule_id: Handle::UNSET,
                target_comfort: Temperature::from_celsius(21.0),
                target_eco: Temperature::from_celsius(18.0),
                target_frostfree: Temperature::from_celsius(7.0),
                outhoff_comfort: None,
                outhoff_eco: None,
                outhoff_frostfree: None,
                outhoff_hysteresis: Temperature::from_millikelvin(500),
                ambient_factor: 0,
                am_tambient_tk: 3600,
                boostdelta: Temperature::from_millikelvin(0),
                boost_maxtime: Tick(0),
                fast_cooldown: false,
                curve: crate::curve::make_bilinear(
                    Temperature::from_celsius(-10.0),
                    Temperature::from_celsius(55.0),
                    Temperature::from_celsius(15.0),
                    Temperature::from_celsius(30.0),
                    100,
                )
                .unwrap(),
                temp_inoffset: Temperature::from_millikelvin(0),
                limit_wtmin: Temperature::from_celsius(20.0),
                limit_wtmax: Temperature::from_celsius(80.0),
                wtemp_rorh: 0,
                tick_period_seconds: 1,
                pump_id: Handle(1),
                valve_id: None,
                bmodel_id: Handle(1),
                ambient_sensor: None,
            }],
            dhwts: vec![],
            heat_sources: vec![HeatSourceSettings {
                name: "boiler".into(),
                runmode: RunMode::Auto,
                schedule_id: Handle::UNSET,
                main_sensor: Handle(2),
                return_sensor: Handle::UNSET,
                has_stage2: false,
                stage2_delay: Tick(0),
                idle_mode: IdlePolicy::Always,
                limit_tmin: Temperature::from_celsius(20.0),
                limit_tmax: Temperature::from_celsius(80.0),
                limit_thardmax: Temperature::from_celsius(95.0),
                hysteresis: Temperature::from_millikelvin(3000),
                burner_min_time: Tick(0),
                t_freeze: Temperature::from_celsius(5.0),
                limit_treturnmin: Temperature::from_celsius(20.0),
                consumer_sdelay: Tick(0),
                load_pump_id: None,
                return_valve_id: None,
                stage1_relay: Handle(2),
                stage2_relay: Handle::UNSET,
            }],
        }
    }

    #[test]
    fn configure_populates_a_valid_plant() {
        let runtime = Arc::new(Runtime::new(crate::data::types::SystemMode::Comfort));
        let mut plant = Plant::new(runtime, Box::new(NullScheduler), Box::new(LoggingAlarmSink), defaults());
        let config = minimal_config(plant.registry_mut());

        let mut plant = plant.configure(config).unwrap();
        plant.online().unwrap();
        plant.run_tick(Tick(1000)).unwrap();
    }

    #[test]
    fn validate_rejects_out_of_range_pump_reference() {
        let mut registry = HardwareRegistry::new();
        let mut config = minimal_config(&mut registry);
        config.circuits[0].pump_id = Handle(9);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unset_mandatory_sensor() {
        let mut registry = HardwareRegistry::new();
        let mut config = minimal_config(&mut registry);
        config.heat_sources[0].main_sensor = Handle::UNSET;
        assert!(config.validate().is_err());
    }

    #[allow(dead_code)]
    fn unused_refs() -> (Motorization, ValveAlgorithm) {
        (Motorization::Isolation, ValveAlgorithm::BangBang)
    }
}
