//! Plant orchestrator: owns every entity collection and the hardware/sensor
//! pools they're wired to, and drives the fixed per-tick pass (spec §4.10).

use std::sync::Arc;

use hc_error::{Error, Result};

use crate::data::types::{BuildingModelId, Handle, PumpId, RunMode, Temperature, ValveId};
use crate::entities::circuit::{CircuitSettings, HeatingCircuit};
use crate::entities::dhwt::{DhwTank, DhwtSettings};
use crate::entities::heatsource::{Boiler, HeatSourceSettings};
use crate::entities::pump::{Pump, PumpSettings};
use crate::entities::valve::{Valve, ValveSettings};
use crate::hw::registry::HardwareRegistry;
use crate::inputs::LogicalTempInput;
use crate::models::{BuildingModel, BuildingModelRun, BuildingModelSettings};
use crate::outputs::LogicalRelay;
use crate::plant_data::{PlantData, PlantDefaults};
use crate::runtime::{Alarm, AlarmSeverity, AlarmSink, Runtime};
use crate::scheduler::Scheduler;
use crate::storage::{NullStorage, Storage};
use crate::timekeep::Tick;

fn encode_charge_yday(v: Option<u64>) -> Vec<u8> {
    match v {
        None => vec![0],
        Some(day) => {
            let mut bytes = vec![1];
            bytes.extend_from_slice(&day.to_le_bytes());
            bytes
        }
    }
}

fn decode_charge_yday(bytes: &[u8]) -> Option<u64> {
    if bytes.first() != Some(&1) || bytes.len() < 9 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[1..9]);
    Some(u64::from_le_bytes(buf))
}

fn idx(h: Handle) -> usize {
    h.0 as usize - 1
}

fn oob(kind: &str, h: Handle) -> Error {
    Error::NotConfigured(format!("no {kind} for handle {:?}", h))
}

/// Resolves a logical temperature reading through the sensor pool,
/// refreshing it (period-gated) against the hardware registry.
fn resolve_sensor(sensors: &mut [LogicalTempInput], registry: &HardwareRegistry, id: Handle, now: Tick) -> Result<Temperature> {
    if !id.is_set() {
        return Err(oob("sensor", id));
    }
    let input = sensors.get_mut(idx(id)).ok_or_else(|| oob("sensor", id))?;
    Ok(input.refresh(registry, now)?.value)
}

/// Fetches one mandatory and one optional disjoint mutable element from the
/// same pool (e.g. a stage1 relay plus an optional stage2 relay).
fn two_mut<T>(items: &mut [T], a: usize, b: Option<usize>) -> Result<(&mut T, Option<&mut T>)> {
    match b {
        None => {
            let len = items.len();
            let a_ref = items.get_mut(a).ok_or_else(|| Error::NotConfigured(format!("index {a} out of {len}")))?;
            Ok((a_ref, None))
        }
        Some(bi) if bi == a => Err(Error::Mismatch("duplicate pool index".into())),
        Some(bi) if a < bi => {
            let (left, right) = items.split_at_mut(bi);
            Ok((&mut left[a], Some(&mut right[0])))
        }
        Some(bi) => {
            let (left, right) = items.split_at_mut(a);
            Ok((&mut right[0], Some(&mut left[bi])))
        }
    }
}

/// Fetches two disjoint, independently-optional mutable elements from the
/// same pool (e.g. a DHWT's isolation and self-heater relays).
fn two_opt_mut<T>(items: &mut [T], a: Option<usize>, b: Option<usize>) -> Result<(Option<&mut T>, Option<&mut T>)> {
    match (a, b) {
        (None, None) => Ok((None, None)),
        (Some(ai), None) => Ok((Some(items.get_mut(ai).ok_or_else(|| Error::Mismatch("bad pool index".into()))?), None)),
        (None, Some(bi)) => Ok((None, Some(items.get_mut(bi).ok_or_else(|| Error::Mismatch("bad pool index".into()))?))),
        (Some(ai), Some(bi)) if ai == bi => Err(Error::Mismatch("duplicate pool index".into())),
        (Some(ai), Some(bi)) if ai < bi => {
            let (left, right) = items.split_at_mut(bi);
            Ok((Some(&mut left[ai]), Some(&mut right[0])))
        }
        (Some(ai), Some(bi)) => {
            let (left, right) = items.split_at_mut(ai);
            Ok((Some(&mut right[0]), Some(&mut left[bi])))
        }
    }
}

/// Owns every entity, the hardware registry, and the shared sensor/relay
/// pools entities are wired to by handle. Drives the fixed 12-step per-tick
/// pass; everything outside this module is a spoke.
pub struct Plant {
    registry: HardwareRegistry,
    scheduler: Box<dyn Scheduler>,
    alarms: Box<dyn AlarmSink>,
    storage: Box<dyn Storage>,
    runtime: Arc<Runtime>,
    pub data: PlantData,

    sensors: Vec<LogicalTempInput>,
    relays: Vec<LogicalRelay>,

    building_models: Vec<BuildingModel>,
    pumps: Vec<Pump>,
    valves: Vec<Valve>,
    circuits: Vec<HeatingCircuit>,
    dhwts: Vec<DhwTank>,
    heat_sources: Vec<Boiler>,

    /// Tick since the plant last saw a heat request or a charging DHWT;
    /// drives `plant_could_sleep` (step 11). Orchestrator-private, unlike
    /// `PlantFlags` which every entity may read.
    no_request_since: Option<Tick>,
    /// `now` of the previous tick, used to accumulate `data.energy` by
    /// elapsed ticks rather than by tick count.
    last_tick: Option<Tick>,
    online: bool,
}

impl Plant {
    pub fn new(runtime: Arc<Runtime>, scheduler: Box<dyn Scheduler>, alarms: Box<dyn AlarmSink>, defaults: PlantDefaults) -> Self {
        Self {
            registry: HardwareRegistry::new(),
            scheduler,
            alarms,
            storage: Box::new(NullStorage),
            runtime,
            data: PlantData::new(defaults),
            sensors: Vec::new(),
            relays: Vec::new(),
            building_models: Vec::new(),
            pumps: Vec::new(),
            valves: Vec::new(),
            circuits: Vec::new(),
            dhwts: Vec::new(),
            heat_sources: Vec::new(),
            no_request_since: None,
            last_tick: None,
            online: false,
        }
    }

    pub fn registry_mut(&mut self) -> &mut HardwareRegistry {
        &mut self.registry
    }

    /// Wires in a real storage backend (spec §6 storage boundary). Defaults
    /// to [`NullStorage`], which persists nothing.
    pub fn set_storage(&mut self, storage: Box<dyn Storage>) {
        self.storage = storage;
    }

    /// Restores each DHWT's last-charged day from storage, so the daily
    /// legionella/charge cadence survives a restart. Called once at
    /// `online()`; a missing or corrupt record leaves the field `None`,
    /// which is a safe "never charged today" default.
    fn restore_state(&mut self) {
        for (i, t) in self.dhwts.iter_mut().enumerate() {
            let identifier = format!("dhwt.{}.charge_yday", i + 1);
            match self.storage.fetch(&identifier) {
                Ok(Some((_version, bytes))) => t.run.charge_yday = decode_charge_yday(&bytes),
                Ok(None) => {}
                Err(_) => {}
            }
        }
    }

    /// Persists each DHWT's last-charged day to storage. Called at
    /// `offline()`, ahead of driving relays to their failsafe state.
    fn persist_state(&self) {
        for (i, t) in self.dhwts.iter().enumerate() {
            let identifier = format!("dhwt.{}.charge_yday", i + 1);
            let bytes = encode_charge_yday(t.run.charge_yday);
            let _ = self.storage.dump(&identifier, 1, &bytes);
        }
    }

    pub fn add_sensor(&mut self, input: LogicalTempInput) -> Handle {
        self.sensors.push(input);
        Handle(self.sensors.len() as u32)
    }

    pub fn add_relay(&mut self, relay: LogicalRelay) -> Handle {
        self.relays.push(relay);
        Handle(self.relays.len() as u32)
    }

    pub fn add_building_model(&mut self, set: BuildingModelSettings) -> BuildingModelId {
        self.building_models.push(BuildingModel::new(set));
        Handle(self.building_models.len() as u32)
    }

    pub fn add_pump(&mut self, set: PumpSettings) -> PumpId {
        self.pumps.push(Pump::new(set));
        Handle(self.pumps.len() as u32)
    }

    pub fn add_valve(&mut self, set: ValveSettings) -> ValveId {
        self.valves.push(Valve::new(set));
        Handle(self.valves.len() as u32)
    }

    pub fn add_circuit(&mut self, set: CircuitSettings) -> Handle {
        self.circuits.push(HeatingCircuit::new(set));
        Handle(self.circuits.len() as u32)
    }

    pub fn add_dhwt(&mut self, set: DhwtSettings) -> Handle {
        self.dhwts.push(DhwTank::new(set));
        Handle(self.dhwts.len() as u32)
    }

    pub fn add_heat_source(&mut self, set: HeatSourceSettings) -> Handle {
        self.heat_sources.push(Boiler::new(set));
        Handle(self.heat_sources.len() as u32)
    }

    /// Brings every backend and entity online. A backend failing to come
    /// online raises a warning and leaves entities wired to it to fail at
    /// their own `online()` or at tick time, per the graceful-degradation
    /// policy.
    pub fn online(&mut self) -> Result<()> {
        for outcome in self.registry.online_all() {
            if let Err(e) = outcome.result {
                self.alarms.raise(Alarm::new(
                    AlarmSeverity::Warning,
                    outcome.name,
                    format!("backend failed to come online: {e}"),
                ));
            }
        }
        for m in &mut self.building_models {
            m.online()?;
        }
        for p in &mut self.pumps {
            p.online()?;
        }
        for v in &mut self.valves {
            v.online()?;
        }
        for c in &mut self.circuits {
            c.online()?;
        }
        for t in &mut self.dhwts {
            t.online()?;
        }
        for h in &mut self.heat_sources {
            h.online()?;
        }
        self.restore_state();
        self.online = true;
        Ok(())
    }

    /// Takes every entity and backend offline, driving relays to their
    /// failsafe state.
    pub fn offline(&mut self) {
        self.online = false;
        self.persist_state();
        for m in &mut self.building_models {
            m.offline();
        }
        for t in &mut self.dhwts {
            t.offline();
        }
        for c in &mut self.circuits {
            c.offline();
        }
        for h in &mut self.heat_sources {
            h.offline();
        }
        for pi in 0..self.pumps.len() {
            let rid = self.pumps[pi].set.rid_pump;
            if let Some(relay) = self.relays.get_mut(idx(rid)) {
                self.pumps[pi].offline(relay);
            }
        }
        for vi in 0..self.valves.len() {
            let open_h = self.valves[vi].set.open_relay;
            let close_h = self.valves[vi].set.close_relay;
            let close_idx = if close_h.is_set() { Some(idx(close_h)) } else { None };
            if let Ok((open_relay, close_relay)) = two_mut(&mut self.relays, idx(open_h), close_idx) {
                self.valves[vi].offline(open_relay, close_relay);
            }
        }
        for r in &mut self.relays {
            r.commit_failsafe(&mut self.registry);
        }
        for outcome in self.registry.offline_all() {
            if let Err(e) = outcome.result {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, outcome.name, format!("backend offline failed: {e}")));
            }
        }
    }

    /// Runs one full tick: spec §4.10's fixed 12-step pass. Sensor refresh
    /// and actuator commit bracket it, per spec's closing note.
    pub fn run_tick(&mut self, now: Tick) -> Result<()> {
        if !self.online {
            return Err(Error::Offline("plant".into()));
        }

        for outcome in self.registry.input_all(now) {
            if let Err(e) = outcome.result {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, outcome.name, format!("backend input refresh failed: {e}")));
            }
        }

        let system_mode = self.runtime.system_mode().as_run_mode().unwrap_or(RunMode::Off);
        self.data.system_mode = system_mode;

        // Step 1.
        self.data.flags.reset_for_tick();

        // Step 2.
        for i in 0..self.building_models.len() {
            let sensor_id = self.building_models[i].set.outdoor_sensor;
            match resolve_sensor(&mut self.sensors, &self.registry, sensor_id, now) {
                Ok(outdoor) => {
                    if let Err(e) = self.building_models[i].run(outdoor, now) {
                        self.alarms.raise(Alarm::new(AlarmSeverity::Warning, self.building_models[i].set.name.clone(), e.to_string()));
                    }
                }
                Err(e) => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Warning, self.building_models[i].set.name.clone(), format!("outdoor sensor: {e}")));
                }
            }
        }
        self.data.flags.summer_maintenance = !self.building_models.is_empty() && self.building_models.iter().all(|m| m.run.summer);

        // Step 3.
        for ti in 0..self.dhwts.len() {
            let bottom_id = self.dhwts[ti].set.bottom_sensor;
            let top_id = self.dhwts[ti].set.top_sensor;
            let bottom_temp = resolve_sensor(&mut self.sensors, &self.registry, bottom_id, now);
            let top_temp = resolve_sensor(&mut self.sensors, &self.registry, top_id, now);
            if let Err(e) = self.dhwts[ti].logic(now, self.scheduler.as_ref(), system_mode, bottom_temp, top_temp, &mut self.data.flags) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, self.dhwts[ti].set.name.clone(), e.to_string()));
            }
        }

        // Step 4.
        let empty_bmodel = BuildingModelRun::default();
        for ci in 0..self.circuits.len() {
            let bmodel_id = self.circuits[ci].set.bmodel_id;
            let ambient_sensor = self.circuits[ci].set.ambient_sensor;
            let measured_ambient = match ambient_sensor {
                Some(h) => resolve_sensor(&mut self.sensors, &self.registry, h, now).ok(),
                None => None,
            };
            let bm_idx = idx(bmodel_id);
            let tau_seconds = self.building_models.get(bm_idx).map(|m| m.set.tau_seconds).unwrap_or(0);
            let bmodel_run = self.building_models.get(bm_idx).map(|m| &m.run).unwrap_or(&empty_bmodel);
            if let Err(e) = self.circuits[ci].logic(now, self.scheduler.as_ref(), system_mode, &self.data.flags, bmodel_run, tau_seconds, measured_ambient) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, self.circuits[ci].set.name.clone(), e.to_string()));
            }
        }

        // Step 5.
        let plant_hrequest = self
            .circuits
            .iter()
            .filter_map(|c| c.run.heat_request)
            .chain(self.dhwts.iter().filter_map(|t| t.run.heat_request))
            .max();

        // Step 6.
        for hi in 0..self.heat_sources.len() {
            let main_sensor = self.heat_sources[hi].set.main_sensor;
            let return_sensor = self.heat_sources[hi].set.return_sensor;
            let stage1_h = self.heat_sources[hi].set.stage1_relay;
            let stage2_h = self.heat_sources[hi].set.stage2_relay;
            let load_pump_id = self.heat_sources[hi].set.load_pump_id;
            let return_valve_id = self.heat_sources[hi].set.return_valve_id;
            let name = self.heat_sources[hi].set.name.clone();

            let boiler_temp_for_logic = resolve_sensor(&mut self.sensors, &self.registry, main_sensor, now);
            if let Err(e) = self.heat_sources[hi].logic(now, self.scheduler.as_ref(), system_mode, &mut self.data.flags, boiler_temp_for_logic, plant_hrequest) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name.clone(), e.to_string()));
                continue;
            }

            let boiler_temp = resolve_sensor(&mut self.sensors, &self.registry, main_sensor, now);
            let return_temp = resolve_sensor(&mut self.sensors, &self.registry, return_sensor, now);

            let stage2_idx = if stage2_h.is_set() { Some(idx(stage2_h)) } else { None };
            let (stage1_relay, stage2_relay) = match two_mut(&mut self.relays, idx(stage1_h), stage2_idx) {
                Ok(pair) => pair,
                Err(e) => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Critical, name.clone(), format!("burner relay unreachable: {e}")));
                    continue;
                }
            };
            let load_pump = load_pump_id.map(|h| self.pumps.get_mut(idx(h))).flatten();
            let return_valve = return_valve_id.map(|h| self.valves.get_mut(idx(h))).flatten();

            if let Err(e) = self.heat_sources[hi].run(
                now,
                boiler_temp,
                return_temp,
                plant_hrequest,
                &mut self.data.flags,
                stage1_relay,
                stage2_relay,
                load_pump,
                return_valve,
                self.alarms.as_ref(),
            ) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name, e.to_string()));
            }
        }

        let dt_ticks = now.saturating_sub(self.last_tick.unwrap_or(now));
        for h in &self.heat_sources {
            self.data.energy.accumulate(h.run.stage1_on, h.run.stage2_on, dt_ticks);
        }
        self.last_tick = Some(now);

        // Step 7.
        for ti in 0..self.dhwts.len() {
            let feed_pump_id = self.dhwts[ti].set.feed_pump_id;
            let recycle_pump_id = self.dhwts[ti].set.recycle_pump_id;
            let isolation_h = self.dhwts[ti].set.isolation_valve_relay;
            let self_heater_h = self.dhwts[ti].set.self_heater_relay;
            let name = self.dhwts[ti].set.name.clone();

            let recycle_idx = recycle_pump_id.map(idx);
            let (feed_pump, recycle_pump) = match two_mut(&mut self.pumps, idx(feed_pump_id), recycle_idx) {
                Ok(pair) => pair,
                Err(e) => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Critical, name.clone(), format!("feed pump unreachable: {e}")));
                    continue;
                }
            };
            let isolation_idx = isolation_h.filter(|h| h.is_set()).map(idx);
            let self_heater_idx = self_heater_h.filter(|h| h.is_set()).map(idx);
            let (isolation_relay, self_heater_relay) = match two_opt_mut(&mut self.relays, isolation_idx, self_heater_idx) {
                Ok(pair) => pair,
                Err(e) => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name.clone(), format!("dhwt relay unreachable: {e}")));
                    (None, None)
                }
            };

            if let Err(e) = self.dhwts[ti].run(feed_pump, recycle_pump, isolation_relay, self_heater_relay) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name, e.to_string()));
            }
        }

        // Step 8.
        let cshift = self.data.flags.cshift_noncrit + self.data.flags.cshift_crit;
        for ci in 0..self.circuits.len() {
            let pump_id = self.circuits[ci].set.pump_id;
            let valve_id = self.circuits[ci].set.valve_id;
            let name = self.circuits[ci].set.name.clone();
            let pump = match self.pumps.get_mut(idx(pump_id)) {
                Some(p) => p,
                None => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Critical, name.clone(), "feed pump unreachable".to_string()));
                    continue;
                }
            };
            let valve = valve_id.and_then(|h| self.valves.get_mut(idx(h)));
            if let Err(e) = self.circuits[ci].run(pump, valve, cshift) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name, e.to_string()));
            }
        }

        // Step 9.
        for vi in 0..self.valves.len() {
            let tid_hot = self.valves[vi].set.tid_hot;
            let tid_cold = self.valves[vi].set.tid_cold;
            let tid_out = self.valves[vi].set.tid_out;
            let open_h = self.valves[vi].set.open_relay;
            let close_h = self.valves[vi].set.close_relay;
            let name = self.valves[vi].set.name.clone();

            let t_hot = resolve_sensor(&mut self.sensors, &self.registry, tid_hot, now).unwrap_or(Temperature::default());
            let t_cold = resolve_sensor(&mut self.sensors, &self.registry, tid_cold, now).unwrap_or(Temperature::default());
            let t_out = match resolve_sensor(&mut self.sensors, &self.registry, tid_out, now) {
                Ok(t) => t,
                Err(e) => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name.clone(), format!("out sensor: {e}")));
                    continue;
                }
            };

            let close_idx = if close_h.is_set() { Some(idx(close_h)) } else { None };
            let (open_relay, close_relay) = match two_mut(&mut self.relays, idx(open_h), close_idx) {
                Ok(pair) => pair,
                Err(e) => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Critical, name.clone(), format!("valve relay unreachable: {e}")));
                    continue;
                }
            };

            if let Err(e) = self.valves[vi].run(now, t_hot, t_cold, t_out, open_relay, close_relay) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name, e.to_string()));
            }
        }

        // Step 10.
        for pi in 0..self.pumps.len() {
            let rid = self.pumps[pi].set.rid_pump;
            let name = self.pumps[pi].set.name.clone();
            let relay = match self.relays.get_mut(idx(rid)) {
                Some(r) => r,
                None => {
                    self.alarms.raise(Alarm::new(AlarmSeverity::Critical, name.clone(), "pump relay unreachable".to_string()));
                    continue;
                }
            };
            if let Err(e) = self.pumps[pi].run(now, relay) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, name, e.to_string()));
            }
        }

        // Step 11.
        let any_charging = self.dhwts.iter().any(|t| t.run.charge_on);
        if plant_hrequest.is_some() || any_charging {
            self.no_request_since = None;
        } else {
            self.no_request_since.get_or_insert(now);
        }
        self.data.flags.plant_could_sleep = match self.no_request_since {
            Some(since) => now.saturating_sub(since) >= self.data.defaults.sleeping_delay.0,
            None => false,
        };

        // Step 12: each heat source already raises its own overtemp alarm
        // from `run()` while `overtemp` is asserted; nothing further to do.

        for r in &mut self.relays {
            if let Err(e) = r.commit(&mut self.registry) {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, "relay".to_string(), e.to_string()));
            }
        }
        for outcome in self.registry.output_all() {
            if let Err(e) = outcome.result {
                self.alarms.raise(Alarm::new(AlarmSeverity::Warning, outcome.name, format!("backend output commit failed: {e}")));
            }
        }

        Ok(())
    }
}
