//! Logical relays: fan a commanded state out to one or more backend raw
//! relays, with a missing-target policy and a failsafe default.

use hc_error::{Error, Result};

use crate::data::types::Handle;
use crate::hw::backend::{OutputKind, RelayState};
use crate::hw::registry::HardwareRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOp {
    /// The first live target only (basic failover when `missing = Ignore`).
    First,
    /// Every target.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMissingPolicy {
    /// Aborts the tick's output phase for this relay.
    Fail,
    /// Masks unreachable targets.
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct RawTarget {
    pub backend: Handle,
    pub output: Handle,
}

pub struct LogicalRelay {
    pub name: String,
    pub op: RelayOp,
    pub missing: RelayMissingPolicy,
    pub targets: Vec<RawTarget>,
    pub failsafe: RelayState,
    pending: Option<bool>,
}

impl LogicalRelay {
    pub fn new(
        name: impl Into<String>,
        op: RelayOp,
        missing: RelayMissingPolicy,
        targets: Vec<RawTarget>,
        failsafe: RelayState,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(Error::misconfigured("logical relay requires at least one target"));
        }
        Ok(Self {
            name: name.into(),
            op,
            missing,
            targets,
            failsafe,
            pending: None,
        })
    }

    /// Stores a pending command, atomically replacing any earlier one from
    /// this tick.
    pub fn set(&mut self, on: bool) {
        self.pending = Some(on);
    }

    /// Forwards the pending command to targets, once per tick, after the
    /// plant pass. Returns an error only under `missing = Fail` with an
    /// unreachable target.
    pub fn commit(&mut self, registry: &mut HardwareRegistry) -> Result<()> {
        let Some(on) = self.pending.take() else {
            return Ok(());
        };
        let state = if on { RelayState::On } else { RelayState::Off };

        match self.op {
            RelayOp::First => {
                for target in &self.targets {
                    match write_one(registry, target, state) {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            if self.missing == RelayMissingPolicy::Fail {
                                return Err(e);
                            }
                        }
                    }
                }
                if self.missing == RelayMissingPolicy::Fail {
                    return Err(Error::Hardware(format!(
                        "relay {}: no reachable target",
                        self.name
                    )));
                }
                Ok(())
            }
            RelayOp::All => {
                let mut last_err = None;
                for target in &self.targets {
                    if let Err(e) = write_one(registry, target, state) {
                        if self.missing == RelayMissingPolicy::Fail {
                            return Err(e);
                        }
                        last_err = Some(e);
                    }
                }
                let _ = last_err;
                Ok(())
            }
        }
    }

    /// Drives every target to the configured failsafe state, used by
    /// `offline()`.
    pub fn commit_failsafe(&mut self, registry: &mut HardwareRegistry) {
        for target in &self.targets {
            let _ = write_one(registry, target, self.failsafe);
        }
        self.pending = None;
    }
}

fn write_one(registry: &mut HardwareRegistry, target: &RawTarget, state: RelayState) -> Result<()> {
    let backend = registry.get_mut(target.backend)?;
    backend.output_state_set(OutputKind::Relay, target.output, state)
}
