//! Unified error handling for the hydronic plant controller
//!
//! This crate provides a single error type shared by every crate in the
//! workspace. It uses thiserror for ergonomic error definitions with proper
//! `Display` and `std::error::Error` impls.

use std::io;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error taxonomy for plant control operations.
///
/// Variant names follow the error kinds enumerated in the controller's
/// error-handling design: each tick-time failure mode (safety trip, sensor
/// fault, configuration defect, ...) gets its own variant rather than a
/// single opaque string, so the plant orchestrator can match on kind and
/// decide how to degrade.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // ========================================================================
    // I/O
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ========================================================================
    // Configuration-time errors
    // ========================================================================
    #[error("entity not configured: {0}")]
    NotConfigured(String),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("invalid run mode: {0}")]
    InvalidMode(String),

    #[error("plant graph is inconsistent: {0}")]
    Mismatch(String),

    // ========================================================================
    // Tick-time / hardware errors
    // ========================================================================
    #[error("entity offline: {0}")]
    Offline(String),

    #[error("safety condition tripped: {0}")]
    Safety(String),

    #[error("requested move rejected: inside deadzone")]
    Deadzone,

    #[error("requested move rejected: below deadband")]
    Deadband,

    #[error("sensor reading invalid: {0}")]
    SensorInvalid(String),

    #[error("sensor shorted: {0}")]
    SensorShort(String),

    #[error("sensor disconnected: {0}")]
    SensorDisconnect(String),

    #[error("hardware error: {0}")]
    Hardware(String),

    // ========================================================================
    // Storage / lifecycle
    // ========================================================================
    #[error("initialization failed: {0}")]
    Init(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("value truncated: {0}")]
    Truncated(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("out of memory: {0}")]
    Oom(String),

    // ========================================================================
    // Generic
    // ========================================================================
    #[error("operation not implemented: {0}")]
    Unimplemented(String),

    #[error("{0}")]
    Generic(String),
}

impl Error {
    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfigured(msg.into())
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// True for sensor-class failures that an aggregator's `ignore`/`ignoredef`
    /// missing-source policy is meant to absorb.
    pub fn is_sensor_fault(&self) -> bool {
        matches!(
            self,
            Self::SensorInvalid(_) | Self::SensorShort(_) | Self::SensorDisconnect(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
