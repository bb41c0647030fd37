//! Circulation pump: on/off request with an optional cooldown before
//! turning off, to protect against short-cycling.

use hc_error::{Error, Result};

use crate::data::types::Handle;
use crate::hw::backend::RelayState;
use crate::hw::registry::HardwareRegistry;
use crate::outputs::LogicalRelay;
use crate::timekeep::Tick;

pub struct PumpSettings {
    pub name: String,
    pub rid_pump: Handle,
    /// Minimum time the pump must stay commanded on after being requested
    /// off, unless `force` bypasses it.
    pub cooldown_time: Tick,
}

#[derive(Default)]
pub struct PumpRun {
    requested_on: bool,
    commanded_on: bool,
    cooldown_until: Option<Tick>,
}

pub struct Pump {
    pub set: PumpSettings,
    pub run: PumpRun,
    configured: bool,
    online: bool,
}

impl Pump {
    pub fn new(set: PumpSettings) -> Self {
        let configured = set.rid_pump.is_set();
        Self {
            set,
            run: PumpRun::default(),
            configured,
            online: false,
        }
    }

    pub fn online(&mut self) -> Result<()> {
        if !self.configured {
            return Err(Error::misconfigured(format!("pump {} has no relay configured", self.set.name)));
        }
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self, relay: &mut LogicalRelay) {
        self.run = PumpRun::default();
        self.online = false;
        relay.set(false);
    }

    /// Records a pump request; `force` bypasses the cooldown on an
    /// on-to-off transition.
    pub fn set_state(&mut self, req_on: bool, force: bool) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }
        self.run.requested_on = req_on;
        if force && !req_on {
            self.run.commanded_on = false;
            self.run.cooldown_until = None;
        }
        Ok(())
    }

    /// Currently commanded physical state.
    pub fn get_state(&self) -> bool {
        self.run.commanded_on
    }

    /// Enacts the pump request, applying cooldown discipline on an
    /// on-to-off transition.
    pub fn run(&mut self, now: Tick, relay: &mut LogicalRelay) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.set.name.clone()));
        }

        if self.run.requested_on {
            self.run.commanded_on = true;
            self.run.cooldown_until = None;
        } else if self.run.commanded_on {
            if self.set.cooldown_time.0 > 0 {
                let deadline = *self
                    .run
                    .cooldown_until
                    .get_or_insert_with(|| Tick(now.0 + self.set.cooldown_time.0));
                if now >= deadline {
                    self.run.commanded_on = false;
                    self.run.cooldown_until = None;
                }
            } else {
                self.run.commanded_on = false;
            }
        }

        relay.set(self.run.commanded_on);
        Ok(())
    }
}
