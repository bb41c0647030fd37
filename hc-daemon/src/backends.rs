//! The default backend stack `hcontrold` wires in when no real hardware
//! driver or config-parser crate is attached: an in-memory hardware bus, a
//! file-backed opaque blob store, and a small embedded plant layout. A real
//! deployment replaces [`default_plant_config`] with a parsed config file
//! and swaps the `MemoryBackend` registration for a real driver crate; the
//! orchestrator and entities don't change.

use std::fs;
use std::path::{Path, PathBuf};

use hc_core::config::PlantConfig;
use hc_core::curve::make_bilinear;
use hc_core::data::types::{Handle, RunMode, Temperature};
use hc_core::entities::circuit::CircuitSettings;
use hc_core::entities::dhwt::{CascadePriority, DhwtSettings, ForceMode};
use hc_core::entities::heatsource::{HeatSourceSettings, IdlePolicy};
use hc_core::hw::backend::RelayState;
use hc_core::hw::memory::MemoryBackend;
use hc_core::hw::registry::HardwareRegistry;
use hc_core::inputs::{LogicalTempInput, MissingPolicy, RawSource, TempOp};
use hc_core::models::BuildingModelSettings;
use hc_core::entities::pump::PumpSettings;
use hc_core::outputs::{LogicalRelay, RawTarget, RelayMissingPolicy, RelayOp};
use hc_core::plant_data::PlantDefaults;
use hc_core::storage::Storage;
use hc_core::timekeep::Tick;
use hc_error::{Error, Result};

/// A file-backed [`Storage`] implementation: one file per identifier, a
/// 4-byte little-endian version prefix followed by the raw blob. Good
/// enough for the small, infrequent writes the storage boundary makes
/// (daily DHWT charge bookkeeping, building-model filter state).
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        let safe: String = identifier
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }
}

impl Storage for FileStorage {
    fn dump(&self, identifier: &str, version: u32, bytes: &[u8]) -> Result<()> {
        let mut contents = Vec::with_capacity(4 + bytes.len());
        contents.extend_from_slice(&version.to_le_bytes());
        contents.extend_from_slice(bytes);
        fs::write(self.path_for(identifier), contents)?;
        Ok(())
    }

    fn fetch(&self, identifier: &str) -> Result<Option<(u32, Vec<u8>)>> {
        let path = self.path_for(identifier);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        let contents = fs::read(&path)?;
        if contents.len() < 4 {
            return Err(Error::Truncated(format!("storage record {identifier} too short")));
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&contents[..4]);
        let version = u32::from_le_bytes(version_bytes);
        Ok(Some((version, contents[4..].to_vec())))
    }
}

/// Builds the small embedded house `hcontrold` runs with out of the box:
/// one outdoor-compensated heating circuit, one DHW tank, one single-stage
/// boiler, all wired to an in-memory bus registered into `registry`.
pub fn default_plant_config(registry: &mut HardwareRegistry) -> Result<PlantConfig> {
    let mut backend = MemoryBackend::new();
    let outdoor = backend.add_temperature("outdoor", Temperature::from_celsius(8.0));
    let boiler_temp = backend.add_temperature("boiler_flow", Temperature::from_celsius(45.0));
    let return_temp = backend.add_temperature("boiler_return", Temperature::from_celsius(38.0));
    let dhwt_bottom = backend.add_temperature("dhwt_bottom", Temperature::from_celsius(45.0));
    let dhwt_top = backend.add_temperature("dhwt_top", Temperature::from_celsius(48.0));
    let circuit_pump_relay = backend.add_relay("circuit_pump");
    let dhwt_pump_relay = backend.add_relay("dhwt_pump");
    let burner_relay = backend.add_relay("burner_stage1");

    let bh = registry.register("embedded", Box::new(backend))?;

    let mk_sensor = |name: &str, input: Handle| {
        LogicalTempInput::new(name, Tick(0), TempOp::First, MissingPolicy::Fail, None, vec![RawSource { backend: bh, input }])
    };
    let mk_relay = |name: &str, output: Handle| {
        LogicalRelay::new(name, RelayOp::First, RelayMissingPolicy::Fail, vec![RawTarget { backend: bh, output }], RelayState::Off)
    };

    let sensors = vec![
        mk_sensor("outdoor", outdoor)?,
        mk_sensor("boiler_flow", boiler_temp)?,
        mk_sensor("boiler_return", return_temp)?,
        mk_sensor("dhwt_bottom", dhwt_bottom)?,
        mk_sensor("dhwt_top", dhwt_top)?,
    ];
    let relays = vec![
        mk_relay("circuit_pump", circuit_pump_relay)?,
        mk_relay("dhwt_pump", dhwt_pump_relay)?,
        mk_relay("burner_stage1", burner_relay)?,
    ];

    let building_models = vec![BuildingModelSettings {
        name: "house".into(),
        tau_seconds: 3 * 3600,
        limit_tsummer: Temperature::from_celsius(18.0),
        limit_tfrost: Temperature::from_celsius(2.0),
        outdoor_sensor: Handle(1),
    }];

    let pumps = vec![
        PumpSettings {
            name: "circuit_pump".into(),
            rid_pump: Handle(1),
            cooldown_time: Tick(30_000),
        },
        PumpSettings {
            name: "dhwt_pump".into(),
            rid_pump: Handle(2),
            cooldown_time: Tick(10_000),
        },
    ];

    let circuits = vec![CircuitSettings {
        name: "ground_floor".into(),
        runmode: RunMode::Auto,
        schedule_id: Handle::UNSET,
        target_comfort: Temperature::from_celsius(21.0),
        target_eco: Temperature::from_celsius(18.0),
        target_frostfree: Temperature::from_celsius(7.0),
        outhoff_comfort: Some(Temperature::from_celsius(19.0)),
        outhoff_eco: Some(Temperature::from_celsius(17.0)),
        outhoff_frostfree: None,
        outhoff_hysteresis: Temperature::from_millikelvin(500),
        ambient_factor: 0,
        am_tambient_tk: 3600,
        boostdelta: Temperature::from_millikelvin(0),
        boost_maxtime: Tick(0),
        fast_cooldown: false,
        curve: make_bilinear(
            Temperature::from_celsius(-10.0),
            Temperature::from_celsius(55.0),
            Temperature::from_celsius(15.0),
            Temperature::from_celsius(30.0),
            100,
        )?,
        temp_inoffset: Temperature::from_millikelvin(0),
        limit_wtmin: Temperature::from_celsius(20.0),
        limit_wtmax: Temperature::from_celsius(80.0),
        wtemp_rorh: 0,
        tick_period_seconds: 1,
        pump_id: Handle(1),
        valve_id: None,
        bmodel_id: Handle(1),
        ambient_sensor: None,
    }];

    let dhwts = vec![DhwtSettings {
        name: "main_tank".into(),
        runmode: RunMode::Auto,
        schedule_id: Handle::UNSET,
        target_comfort: Temperature::from_celsius(55.0),
        target_eco: Temperature::from_celsius(48.0),
        target_frostfree: Temperature::from_celsius(10.0),
        t_legionella: Temperature::from_celsius(65.0),
        hysteresis: Temperature::from_millikelvin(5000),
        limit_tmin: Temperature::from_celsius(10.0),
        limit_tmax: Temperature::from_celsius(85.0),
        limit_chargetime: Tick(2 * 3_600_000),
        force_mode: ForceMode::First,
        cprio: CascadePriority::Absolute,
        electric_failover: false,
        temp_inoffset: Temperature::from_millikelvin(0),
        feed_pump_id: Handle(2),
        recycle_pump_id: None,
        isolation_valve_relay: None,
        self_heater_relay: None,
        bottom_sensor: Handle(4),
        top_sensor: Handle(5),
    }];

    let heat_sources = vec![HeatSourceSettings {
        name: "boiler".into(),
        runmode: RunMode::Auto,
        schedule_id: Handle::UNSET,
        main_sensor: Handle(2),
        return_sensor: Handle(3),
        has_stage2: false,
        stage2_delay: Tick(0),
        idle_mode: IdlePolicy::FrostOnly,
        limit_tmin: Temperature::from_celsius(20.0),
        limit_tmax: Temperature::from_celsius(80.0),
        limit_thardmax: Temperature::from_celsius(95.0),
        hysteresis: Temperature::from_millikelvin(3000),
        burner_min_time: Tick(180_000),
        t_freeze: Temperature::from_celsius(5.0),
        limit_treturnmin: Temperature::from_celsius(25.0),
        consumer_sdelay: Tick(120_000),
        load_pump_id: None,
        return_valve_id: None,
        stage1_relay: Handle(3),
        stage2_relay: Handle::UNSET,
    }];

    Ok(PlantConfig {
        defaults: PlantDefaults {
            target_comfort: Temperature::from_celsius(21.0),
            target_eco: Temperature::from_celsius(18.0),
            target_frostfree: Temperature::from_celsius(7.0),
            limit_wtmin: Temperature::from_celsius(20.0),
            limit_wtmax: Temperature::from_celsius(80.0),
            sleeping_delay: Tick(10 * 60 * 1000),
        },
        sensors,
        relays,
        building_models,
        pumps,
        valves: Vec::new(),
        circuits,
        dhwts,
        heat_sources,
    })
}
