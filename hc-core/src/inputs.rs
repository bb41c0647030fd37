//! Logical temperature and switch inputs: named aggregations over one or
//! more backend raw inputs, each with an aggregation policy and a
//! missing-source policy.

use hc_error::{Error, Result};

use crate::data::types::{Handle, Temperature};
use crate::hw::backend::{InputKind, InputValue};
use crate::hw::registry::HardwareRegistry;
use crate::timekeep::Tick;

/// How multiple raw sources combine into one logical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempOp {
    First,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOp {
    First,
    And,
    Or,
}

/// What to do when a configured source is unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    Fail,
    Ignore,
    Ignoredef,
}

#[derive(Debug, Clone, Copy)]
pub struct RawSource {
    pub backend: Handle,
    pub input: Handle,
}

/// The last-published value/timestamp pair for a logical input. Published
/// atomically: a reader takes a full snapshot, never a torn read.
#[derive(Debug, Clone, Copy)]
pub struct Published<T> {
    pub value: T,
    pub last_update: Tick,
}

pub struct LogicalTempInput {
    pub name: String,
    pub period: Tick,
    pub op: TempOp,
    pub missing: MissingPolicy,
    /// Substitute value used by `Ignoredef`; required when that policy is set.
    pub igntemp: Option<Temperature>,
    pub sources: Vec<RawSource>,
    published: Option<Published<Temperature>>,
}

impl LogicalTempInput {
    pub fn new(
        name: impl Into<String>,
        period: Tick,
        op: TempOp,
        missing: MissingPolicy,
        igntemp: Option<Temperature>,
        sources: Vec<RawSource>,
    ) -> Result<Self> {
        if missing == MissingPolicy::Ignoredef && igntemp.is_none() {
            return Err(Error::misconfigured(
                "ignoredef missing-policy requires igntemp to be configured",
            ));
        }
        if sources.is_empty() {
            return Err(Error::misconfigured("logical input requires at least one source"));
        }
        Ok(Self {
            name: name.into(),
            period,
            op,
            missing,
            igntemp,
            sources,
            published: None,
        })
    }

    /// Reads and republishes the logical value if `period` has elapsed
    /// since the last update; otherwise returns the previously published
    /// snapshot unchanged.
    pub fn refresh(&mut self, registry: &HardwareRegistry, now: Tick) -> Result<Published<Temperature>> {
        if let Some(p) = self.published {
            if now.saturating_sub(p.last_update) < self.period.0 {
                return Ok(p);
            }
        }

        let mut readings = Vec::with_capacity(self.sources.len());
        for src in &self.sources {
            match read_one_temp(registry, src) {
                Ok(t) => readings.push(t),
                Err(e) => match self.missing {
                    MissingPolicy::Fail => return Err(e),
                    MissingPolicy::Ignore => continue,
                    MissingPolicy::Ignoredef => {
                        readings.push(self.igntemp.expect("validated at construction"))
                    }
                },
            }
        }

        if readings.is_empty() {
            return Err(Error::SensorInvalid(format!(
                "logical input {} has no readable sources",
                self.name
            )));
        }

        let combined = match self.op {
            TempOp::First => readings[0],
            TempOp::Min => readings.into_iter().min().unwrap(),
            TempOp::Max => readings.into_iter().max().unwrap(),
        };

        let published = Published {
            value: combined,
            last_update: now,
        };
        self.published = Some(published);
        Ok(published)
    }

    /// Returns the last published snapshot without triggering a refresh.
    pub fn snapshot(&self) -> Option<Published<Temperature>> {
        self.published
    }
}

fn read_one_temp(registry: &HardwareRegistry, src: &RawSource) -> Result<Temperature> {
    let backend = registry.get(src.backend)?;
    match backend.input_value(InputKind::Temperature, src.input)? {
        InputValue::Temperature(t) => crate::numerics::validate_temp(t),
        InputValue::Switch(_) => Err(Error::Mismatch("expected temperature source, got switch".into())),
    }
}

pub struct LogicalSwitchInput {
    pub name: String,
    pub period: Tick,
    pub op: SwitchOp,
    pub missing: MissingPolicy,
    pub sources: Vec<RawSource>,
    published: Option<Published<bool>>,
}

impl LogicalSwitchInput {
    pub fn new(
        name: impl Into<String>,
        period: Tick,
        op: SwitchOp,
        missing: MissingPolicy,
        sources: Vec<RawSource>,
    ) -> Result<Self> {
        if missing == MissingPolicy::Ignoredef {
            return Err(Error::misconfigured("switch inputs do not support ignoredef"));
        }
        if sources.is_empty() {
            return Err(Error::misconfigured("logical input requires at least one source"));
        }
        Ok(Self {
            name: name.into(),
            period,
            op,
            missing,
            sources,
            published: None,
        })
    }

    pub fn refresh(&mut self, registry: &HardwareRegistry, now: Tick) -> Result<Published<bool>> {
        if let Some(p) = self.published {
            if now.saturating_sub(p.last_update) < self.period.0 {
                return Ok(p);
            }
        }

        let mut readings = Vec::with_capacity(self.sources.len());
        for src in &self.sources {
            match read_one_switch(registry, src) {
                Ok(v) => readings.push(v),
                Err(e) => match self.missing {
                    MissingPolicy::Fail => return Err(e),
                    MissingPolicy::Ignore => continue,
                    MissingPolicy::Ignoredef => unreachable!("rejected at construction"),
                },
            }
        }

        if readings.is_empty() {
            return Err(Error::SensorInvalid(format!(
                "logical input {} has no readable sources",
                self.name
            )));
        }

        let combined = match self.op {
            SwitchOp::First => readings[0],
            SwitchOp::And => readings.iter().all(|&v| v),
            SwitchOp::Or => readings.iter().any(|&v| v),
        };

        let published = Published {
            value: combined,
            last_update: now,
        };
        self.published = Some(published);
        Ok(published)
    }

    pub fn snapshot(&self) -> Option<Published<bool>> {
        self.published
    }
}

fn read_one_switch(registry: &HardwareRegistry, src: &RawSource) -> Result<bool> {
    let backend = registry.get(src.backend)?;
    match backend.input_value(InputKind::Switch, src.input)? {
        InputValue::Switch(v) => Ok(v),
        InputValue::Temperature(_) => Err(Error::Mismatch("expected switch source, got temperature".into())),
    }
}
