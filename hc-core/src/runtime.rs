//! Runtime: the plant's system mode and the alarm-sink boundary.
//!
//! Holds the current system mode (spec §4, "Runtime") behind an atomic so a
//! management-frontend thread can write it while the tick thread reads it at
//! the start of every pass, with no lock on the hot path — the same pattern
//! spec §5 describes for schedule-entry publication.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::data::types::SystemMode;

fn mode_to_u8(mode: SystemMode) -> u8 {
    match mode {
        SystemMode::Off => 0,
        SystemMode::Auto => 1,
        SystemMode::Comfort => 2,
        SystemMode::Eco => 3,
        SystemMode::Frostfree => 4,
        SystemMode::Dhwonly => 5,
        SystemMode::Test => 6,
        SystemMode::Manual => 7,
    }
}

fn u8_to_mode(v: u8) -> SystemMode {
    match v {
        1 => SystemMode::Auto,
        2 => SystemMode::Comfort,
        3 => SystemMode::Eco,
        4 => SystemMode::Frostfree,
        5 => SystemMode::Dhwonly,
        6 => SystemMode::Test,
        7 => SystemMode::Manual,
        _ => SystemMode::Off,
    }
}

/// Holds the plant's system mode. Reads/writes are `Relaxed`: mode changes
/// take effect on the next tick, never mid-pass, so no stronger ordering is
/// needed between the writer thread and the tick thread.
#[derive(Debug)]
pub struct Runtime {
    mode: AtomicU8,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(SystemMode::Off)
    }
}

impl Runtime {
    pub fn new(initial: SystemMode) -> Self {
        Self {
            mode: AtomicU8::new(mode_to_u8(initial)),
        }
    }

    pub fn system_mode(&self) -> SystemMode {
        u8_to_mode(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_system_mode(&self, mode: SystemMode) {
        self.mode.store(mode_to_u8(mode), Ordering::Relaxed);
    }
}

/// Severity of a raised [`Alarm`], mirroring spec §4.10/§7's "critical" vs.
/// "non-critical" alarm language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Alarm {
    pub severity: AlarmSeverity,
    pub source: String,
    pub message: String,
}

impl Alarm {
    pub fn new(severity: AlarmSeverity, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            source: source.into(),
            message: message.into(),
        }
    }
}

/// The alarm-notifier boundary (spec §1 lists "the alarms notifier" as an
/// external collaborator). The orchestrator and entities raise through this
/// trait; a real notifier (D-Bus, MQTT, paging) attaches here.
pub trait AlarmSink: Send + Sync {
    fn raise(&self, alarm: Alarm);
}

/// Logs every alarm via `tracing` and discards it otherwise. The default
/// sink when no real notifier is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAlarmSink;

impl AlarmSink for LoggingAlarmSink {
    fn raise(&self, alarm: Alarm) {
        match alarm.severity {
            AlarmSeverity::Info => tracing::info!(source = %alarm.source, "{}", alarm.message),
            AlarmSeverity::Warning => tracing::warn!(source = %alarm.source, "{}", alarm.message),
            AlarmSeverity::Critical => tracing::error!(source = %alarm.source, "{}", alarm.message),
        }
    }
}
