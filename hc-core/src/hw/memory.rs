//! An in-memory [`HardwareBackend`] used by tests and by the daemon before
//! a real driver crate is wired in. Trivial to script from test code in
//! place of a real bus, the way the teacher's tests fake hwmon files.

use std::collections::HashMap;

use hc_error::{Error, Result};

use crate::data::types::{Handle, Temperature};
use crate::timekeep::Tick;

use super::backend::{HardwareBackend, InputKind, InputValue, OutputKind, RelayState};

#[derive(Default)]
pub struct MemoryBackend {
    name: String,
    online: bool,
    temp_names: Vec<String>,
    switch_names: Vec<String>,
    relay_names: Vec<String>,
    temps: HashMap<u32, Temperature>,
    switches: HashMap<u32, bool>,
    relay_shadow: HashMap<u32, RelayState>,
    relay_committed: HashMap<u32, RelayState>,
    input_times: HashMap<(InputKind, u32), Tick>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/demo helper: declares a named temperature input and seeds its
    /// initial reading.
    pub fn add_temperature(&mut self, name: &str, initial: Temperature) -> Handle {
        let id = self.temp_names.len() as u32 + 1;
        self.temp_names.push(name.to_string());
        self.temps.insert(id, initial);
        Handle(id)
    }

    /// Test/demo helper: declares a named switch input.
    pub fn add_switch(&mut self, name: &str, initial: bool) -> Handle {
        let id = self.switch_names.len() as u32 + 1;
        self.switch_names.push(name.to_string());
        self.switches.insert(id, initial);
        Handle(id)
    }

    /// Test/demo helper: declares a named relay output.
    pub fn add_relay(&mut self, name: &str) -> Handle {
        let id = self.relay_names.len() as u32 + 1;
        self.relay_names.push(name.to_string());
        self.relay_committed.insert(id, RelayState::Off);
        Handle(id)
    }

    /// Test helper: overwrites a temperature reading as if the bus refreshed it.
    pub fn set_temperature(&mut self, id: Handle, value: Temperature) {
        self.temps.insert(id.0, value);
    }

    pub fn committed_relay_state(&self, id: Handle) -> Option<RelayState> {
        self.relay_committed.get(&id.0).copied()
    }
}

impl HardwareBackend for MemoryBackend {
    fn setup(&mut self, name: &str) -> Result<()> {
        self.name = name.to_string();
        Ok(())
    }

    fn online(&mut self) -> Result<()> {
        let now = Tick::ZERO;
        for id in 1..=self.temp_names.len() as u32 {
            self.input_times.insert((InputKind::Temperature, id), now);
        }
        for id in 1..=self.switch_names.len() as u32 {
            self.input_times.insert((InputKind::Switch, id), now);
        }
        self.online = true;
        Ok(())
    }

    fn input(&mut self, now: Tick) -> Result<()> {
        if !self.online {
            return Err(Error::Offline(self.name.clone()));
        }
        for id in 1..=self.temp_names.len() as u32 {
            self.input_times.insert((InputKind::Temperature, id), now);
        }
        for id in 1..=self.switch_names.len() as u32 {
            self.input_times.insert((InputKind::Switch, id), now);
        }
        Ok(())
    }

    fn output(&mut self) -> Result<()> {
        for (id, state) in self.relay_shadow.drain() {
            self.relay_committed.insert(id, state);
        }
        Ok(())
    }

    fn offline(&mut self) -> Result<()> {
        for id in self.relay_committed.keys().copied().collect::<Vec<_>>() {
            self.relay_committed.insert(id, RelayState::Off);
        }
        self.online = false;
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        Ok(())
    }

    fn input_by_name(&self, kind: InputKind, name: &str) -> Result<Handle> {
        let list = match kind {
            InputKind::Temperature => &self.temp_names,
            InputKind::Switch => &self.switch_names,
        };
        list.iter()
            .position(|n| n == name)
            .map(|idx| Handle(idx as u32 + 1))
            .ok_or_else(|| Error::NotConfigured(format!("no input named {name}")))
    }

    fn output_by_name(&self, _kind: OutputKind, name: &str) -> Result<Handle> {
        self.relay_names
            .iter()
            .position(|n| n == name)
            .map(|idx| Handle(idx as u32 + 1))
            .ok_or_else(|| Error::NotConfigured(format!("no output named {name}")))
    }

    fn input_value(&self, kind: InputKind, id: Handle) -> Result<InputValue> {
        match kind {
            InputKind::Temperature => self
                .temps
                .get(&id.0)
                .map(|t| InputValue::Temperature(*t))
                .ok_or_else(|| Error::NotConfigured(format!("no temperature input {:?}", id))),
            InputKind::Switch => self
                .switches
                .get(&id.0)
                .map(|s| InputValue::Switch(*s))
                .ok_or_else(|| Error::NotConfigured(format!("no switch input {:?}", id))),
        }
    }

    fn input_time(&self, kind: InputKind, id: Handle) -> Result<Tick> {
        self.input_times
            .get(&(kind, id.0))
            .copied()
            .ok_or_else(|| Error::NotConfigured(format!("no input time for {:?}", id)))
    }

    fn output_state_set(&mut self, _kind: OutputKind, id: Handle, state: RelayState) -> Result<()> {
        if !self.relay_committed.contains_key(&id.0) {
            return Err(Error::NotConfigured(format!("no relay output {:?}", id)));
        }
        self.relay_shadow.insert(id.0, state);
        Ok(())
    }

    fn output_state_get(&self, _kind: OutputKind, id: Handle) -> Result<RelayState> {
        self.relay_shadow
            .get(&id.0)
            .or_else(|| self.relay_committed.get(&id.0))
            .copied()
            .ok_or_else(|| Error::NotConfigured(format!("no relay output {:?}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_succeeds_before_input_called() {
        let mut b = MemoryBackend::new();
        b.setup("test").unwrap();
        let t = b.add_temperature("boiler", Temperature::from_celsius(55.0));
        b.online().unwrap();
        assert!(b.input_time(InputKind::Temperature, t).is_ok());
    }

    fn r(b: &MemoryBackend, id: Handle) -> RelayState {
        b.output_state_get(OutputKind::Relay, id).unwrap()
    }

    #[test]
    fn relay_commits_only_after_output() {
        let mut b = MemoryBackend::new();
        b.setup("test").unwrap();
        let relay = b.add_relay("pump");
        b.online().unwrap();
        b.output_state_set(OutputKind::Relay, relay, RelayState::On).unwrap();
        assert_eq!(r(&b, relay), RelayState::On);
        assert_eq!(b.committed_relay_state(relay), Some(RelayState::Off));
        b.output().unwrap();
        assert_eq!(b.committed_relay_state(relay), Some(RelayState::On));
    }
}
