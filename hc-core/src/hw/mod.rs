//! Hardware backends: the boundary between the plant and physical I/O.
//!
//! The core never touches a driver directly, only through the
//! [`HardwareBackend`] capability table and the [`registry::HardwareRegistry`]
//! that indexes instances by unique name.

pub mod backend;
pub mod memory;
pub mod registry;

pub use backend::{HardwareBackend, InputKind, OutputKind, RelayState};
pub use registry::HardwareRegistry;
