//! The hardware backend capability table: every driver (1-wire, MQTT I/O,
//! parallel-port I/O, ...) implements this trait. The core owns only the
//! opaque handle and the vtable, never driver-private state directly.

use crate::data::types::{Handle, Temperature};
use crate::timekeep::Tick;
use hc_error::Result;

/// Typed input kinds a backend may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Temperature,
    Switch,
}

/// Typed output kinds a backend may expose. The core supports one kind:
/// relays (simple on/off actuators).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Relay,
}

/// Commanded/observed state of a relay output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Off,
    On,
}

/// A single raw input reading as published by a backend: either a
/// temperature or a switch value, paired with the backend's last-update
/// tick for that input.
#[derive(Debug, Clone, Copy)]
pub enum InputValue {
    Temperature(Temperature),
    Switch(bool),
}

/// Driver capability table. Each driver exposes an opaque handle internally
/// and this callback table externally; the registry indexes instances by
/// unique name.
pub trait HardwareBackend: Send {
    /// One-time setup, given the backend's configured name.
    fn setup(&mut self, name: &str) -> Result<()>;

    /// Brings the backend online. Must make `input_time` succeed for every
    /// configured input even before `input()` has been called.
    fn online(&mut self) -> Result<()>;

    /// Refreshes raw reads from the underlying hardware/bus.
    fn input(&mut self, now: Tick) -> Result<()>;

    /// Commits pending raw writes to the underlying hardware/bus. Atomic
    /// per driver.
    fn output(&mut self) -> Result<()>;

    /// Takes the backend offline; commands known outputs to safe states.
    fn offline(&mut self) -> Result<()>;

    /// Releases backend resources.
    fn exit(&mut self) -> Result<()>;

    fn input_by_name(&self, kind: InputKind, name: &str) -> Result<Handle>;
    fn output_by_name(&self, kind: OutputKind, name: &str) -> Result<Handle>;

    fn input_value(&self, kind: InputKind, id: Handle) -> Result<InputValue>;
    fn input_time(&self, kind: InputKind, id: Handle) -> Result<Tick>;

    /// Updates a pending shadow; hardware only reflects the last-set value
    /// after the next `output()`. Idempotent within a tick.
    fn output_state_set(&mut self, kind: OutputKind, id: Handle, state: RelayState) -> Result<()>;
    fn output_state_get(&self, kind: OutputKind, id: Handle) -> Result<RelayState>;
}
