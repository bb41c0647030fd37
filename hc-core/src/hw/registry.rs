//! Indexes hardware backend instances by unique name and fans the per-tick
//! `input()`/`output()` passes out to every registered backend.

use std::collections::HashMap;

use hc_error::{Error, Result};

use crate::data::types::Handle;
use crate::timekeep::Tick;

use super::backend::HardwareBackend;

/// Outcome of driving one phase (`input`/`output`/`online`/`offline`) on one
/// backend. The registry collects one of these per backend rather than
/// aborting the whole pass on first error, so the orchestrator can decide
/// per backend which dependent entities are affected.
pub struct BackendOutcome {
    pub backend: Handle,
    pub name: String,
    pub result: Result<()>,
}

#[derive(Default)]
pub struct HardwareRegistry {
    backends: Vec<Box<dyn HardwareBackend>>,
    names: Vec<String>,
    by_name: HashMap<String, Handle>,
}

impl HardwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under a unique name, returning its handle.
    pub fn register(&mut self, name: &str, mut backend: Box<dyn HardwareBackend>) -> Result<Handle> {
        if self.by_name.contains_key(name) {
            return Err(Error::Exists(format!("backend {name} already registered")));
        }
        backend.setup(name)?;
        let idx = self.backends.len() as u32 + 1; // 0 reserved as unset
        let handle = Handle(idx);
        self.backends.push(backend);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn handle_by_name(&self, name: &str) -> Option<Handle> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, handle: Handle) -> Result<&dyn HardwareBackend> {
        self.backends
            .get(handle.0 as usize - 1)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::NotConfigured(format!("no backend for handle {:?}", handle)))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut dyn HardwareBackend> {
        self.backends
            .get_mut(handle.0 as usize - 1)
            .map(|b| b.as_mut())
            .ok_or_else(|| Error::NotConfigured(format!("no backend for handle {:?}", handle)))
    }

    /// Brings every registered backend online, reporting a per-backend
    /// outcome.
    pub fn online_all(&mut self) -> Vec<BackendOutcome> {
        let names = self.names.clone();
        self.backends
            .iter_mut()
            .enumerate()
            .map(|(i, b)| BackendOutcome {
                backend: Handle(i as u32 + 1),
                name: names[i].clone(),
                result: b.online(),
            })
            .collect()
    }

    /// Refreshes raw reads on every backend, one outcome per backend
    /// (spec §7 graceful degradation: a single backend failing does not
    /// abort the whole input phase).
    pub fn input_all(&mut self, now: Tick) -> Vec<BackendOutcome> {
        let names = self.names.clone();
        self.backends
            .iter_mut()
            .enumerate()
            .map(|(i, b)| BackendOutcome {
                backend: Handle(i as u32 + 1),
                name: names[i].clone(),
                result: b.input(now),
            })
            .collect()
    }

    /// Commits pending writes on every backend, one outcome per backend.
    pub fn output_all(&mut self) -> Vec<BackendOutcome> {
        let names = self.names.clone();
        self.backends
            .iter_mut()
            .enumerate()
            .map(|(i, b)| BackendOutcome {
                backend: Handle(i as u32 + 1),
                name: names[i].clone(),
                result: b.output(),
            })
            .collect()
    }

    /// Takes every backend offline in registration order, commanding
    /// relays to their configured failsafe states.
    pub fn offline_all(&mut self) -> Vec<BackendOutcome> {
        let names = self.names.clone();
        self.backends
            .iter_mut()
            .enumerate()
            .map(|(i, b)| BackendOutcome {
                backend: Handle(i as u32 + 1),
                name: names[i].clone(),
                result: b.offline(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
