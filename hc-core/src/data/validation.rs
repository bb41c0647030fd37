//! Configuration-time validation for plant settings.
//!
//! Grounded on the teacher's path/percentage/curve validators: bounds
//! checks, cross-reference checks, reserved-sentinel checks, all returning
//! the unified error type rather than panicking.

use crate::constants::{curve, limits, temperature};
use crate::data::types::{Handle, Temperature as Temp};
use hc_error::{Error, Result};

/// Validates a configured temperature setpoint: not a sentinel, within the
/// operational range.
pub fn validate_setpoint(t: Temp) -> Result<Temp> {
    crate::numerics::validate_temp(t)
}

/// Validates a name used for an entity or logical input/output.
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::misconfigured("name cannot be empty"));
    }
    if trimmed.len() > limits::MAX_NAME_LEN {
        return Err(Error::misconfigured(format!(
            "name exceeds maximum length of {} characters",
            limits::MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Validates the number of aggregation sources/targets configured for a
/// logical input or output.
pub fn validate_source_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(Error::misconfigured("at least one source/target is required"));
    }
    if count > limits::MAX_AGGREGATION_SOURCES {
        return Err(Error::misconfigured(format!(
            "exceeds maximum of {} aggregation sources",
            limits::MAX_AGGREGATION_SOURCES
        )));
    }
    Ok(())
}

/// Validates the two calibration points and non-linearity exponent for a
/// bilinear-20C temperature law, per spec: `tout1 < tout2`, `twater2 < twater1`,
/// `50 <= nH100 <= 200`.
pub fn validate_bilinear_params(
    tout1: Temp,
    twater1: Temp,
    tout2: Temp,
    twater2: Temp,
    nh100: i32,
) -> Result<()> {
    if tout2.millikelvin() - tout1.millikelvin() < curve::MIN_CALIBRATION_SPREAD {
        return Err(Error::misconfigured("tout1 must be strictly less than tout2"));
    }
    if twater2.millikelvin() >= twater1.millikelvin() {
        return Err(Error::misconfigured("twater2 must be strictly less than twater1"));
    }
    if nh100 < curve::NH100_MIN || nh100 > curve::NH100_MAX {
        return Err(Error::misconfigured(format!(
            "nH100 must be in [{}, {}], got {}",
            curve::NH100_MIN,
            curve::NH100_MAX,
            nh100
        )));
    }
    Ok(())
}

/// Validates that `lo <= hi` for a min/max temperature pair, e.g. water
/// temperature limits or tank limits.
pub fn validate_temp_range(lo: Temp, hi: Temp) -> Result<()> {
    if lo.millikelvin() > hi.millikelvin() {
        return Err(Error::misconfigured("min temperature exceeds max temperature"));
    }
    if lo.millikelvin() < temperature::MIN_VALID || hi.millikelvin() > temperature::MAX_VALID {
        return Err(Error::misconfigured("temperature range outside operational bounds"));
    }
    Ok(())
}

/// Validates that a mandatory handle reference into a pool of `pool_len`
/// already-declared entries is set and in range.
pub fn validate_handle_ref(what: &str, handle: Handle, pool_len: usize) -> Result<()> {
    if !handle.is_set() {
        return Err(Error::misconfigured(format!("{what} is not configured")));
    }
    if handle.0 as usize > pool_len {
        return Err(Error::misconfigured(format!(
            "{what} references handle {} but only {} are declared",
            handle.0, pool_len
        )));
    }
    Ok(())
}

/// Same as [`validate_handle_ref`] but for an optional reference: `None` is
/// always fine, `Some(unset)` is rejected as a parser bug.
pub fn validate_optional_handle_ref(what: &str, handle: Option<Handle>, pool_len: usize) -> Result<()> {
    match handle {
        None => Ok(()),
        Some(h) if !h.is_set() => Err(Error::misconfigured(format!("{what} handle is set to the unset sentinel"))),
        Some(h) => validate_handle_ref(what, h, pool_len),
    }
}
