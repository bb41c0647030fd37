//! Plain-data contracts for the plant controller's external boundaries
//! (spec §6): scheduler queries, storage blob round-trips, and log source
//! registration. This crate carries no transport of its own — D-Bus, MQTT
//! and HTTP frontends are explicitly out of scope for the core — these are
//! the shapes such a frontend or driver crate would serialize on the wire,
//! the way the teacher's protocol crate carries its own request/response
//! wire types independent of the daemon that interprets them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on an opaque storage blob (spec §6 storage boundary: latched
/// state like building-model filter state, DHWT `charge_yday`; these are
/// small scalars and short history windows, never bulk data).
pub const MAX_BLOB_SIZE: usize = 64 * 1024;

/// Upper bound on an identifier string (storage key or log source name).
pub const MAX_IDENTIFIER_LEN: usize = 128;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique request ID for correlating a [`RequestEnvelope`] with
/// its [`ResponseEnvelope`].
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Wire mirror of `hc_core::data::types::RunMode`. Duplicated rather than
/// depended on: this crate must stay buildable by a frontend that never
/// links `hc-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunModeWire {
    Off,
    Auto,
    Comfort,
    Eco,
    Frostfree,
    Dhwonly,
    Test,
}

/// Wire mirror of `hc_core::scheduler::ScheduleEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntryWire {
    pub runmode: RunModeWire,
    pub dhwmode: RunModeWire,
    pub legionella: bool,
    pub recycle: bool,
}

/// Logging cadence bucket (spec §6 log boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCadence {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

impl LogCadence {
    pub fn seconds(self) -> u64 {
        match self {
            LogCadence::OneMinute => 60,
            LogCadence::FiveMinutes => 5 * 60,
            LogCadence::FifteenMinutes => 15 * 60,
        }
    }
}

/// Log backend kind (spec §6 log boundary: `{file, rrd, statsd, mqtt}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogBackendKind {
    File,
    Rrd,
    Statsd,
    Mqtt,
}

/// The describable part of a log source registration. The callback and the
/// object it closes over (spec §6: `cb`, `object`) are supplied in-process
/// by the registering module and are not plain data, so they live outside
/// this struct; this is only the part a log backend needs to open a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSourceDescriptor {
    pub basename: String,
    pub identifier: String,
    pub version: u32,
    pub cadence: LogCadence,
    pub keys: Vec<String>,
    pub metrics: Vec<String>,
}

impl LogSourceDescriptor {
    /// Validates the parts of a log source registration that are checkable
    /// without reaching into the backend: non-empty identifier within the
    /// length bound, at least one key and one metric.
    pub fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.basename)?;
        validate_identifier(&self.identifier)?;
        if self.keys.is_empty() {
            return Err("log source must declare at least one key".into());
        }
        if self.metrics.is_empty() {
            return Err("log source must declare at least one metric".into());
        }
        Ok(())
    }
}

fn validate_identifier(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("identifier must not be empty".into());
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier exceeds maximum length of {MAX_IDENTIFIER_LEN} characters"
        ));
    }
    Ok(())
}

fn validate_blob(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() > MAX_BLOB_SIZE {
        return Err(format!(
            "blob of {} bytes exceeds maximum of {MAX_BLOB_SIZE}",
            bytes.len()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

/// The three boundary operations a frontend or driver crate may invoke
/// against the running daemon, per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    /// Scheduler boundary: the currently active entry for one schedule.
    ScheduleCurrent { schedule_id: u32, now_tick: u64 },
    /// Storage boundary: persist an opaque blob under `identifier`.
    StorageDump {
        identifier: String,
        version: u32,
        bytes: Vec<u8>,
    },
    /// Storage boundary: retrieve the blob last dumped under `identifier`.
    StorageFetch { identifier: String },
    /// Log boundary: register a log source at init time.
    RegisterLogSource { descriptor: LogSourceDescriptor },
}

impl Request {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::ScheduleCurrent { .. } => Ok(()),
            Request::StorageDump {
                identifier, bytes, ..
            } => {
                validate_identifier(identifier)?;
                validate_blob(bytes)
            }
            Request::StorageFetch { identifier } => validate_identifier(identifier),
            Request::RegisterLogSource { descriptor } => descriptor.validate(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::ScheduleCurrent { .. } => "ScheduleCurrent",
            Request::StorageDump { .. } => "StorageDump",
            Request::StorageFetch { .. } => "StorageFetch",
            Request::RegisterLogSource { .. } => "RegisterLogSource",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response payload; exactly one field is set depending on which [`Request`]
/// it answers, following the same flat-optional shape the teacher's own
/// response type uses so a frontend can deserialize without a tagged union
/// per variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_entry: Option<ScheduleEntryWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_version: Option<u32>,
}

impl ResponseData {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn schedule(entry: ScheduleEntryWire) -> Self {
        Self {
            schedule_entry: Some(entry),
            ..Self::default()
        }
    }

    pub fn fetched(version: u32, bytes: Vec<u8>) -> Self {
        Self {
            blob: Some(bytes),
            blob_version: Some(version),
            ..Self::default()
        }
    }
}
