//! Active entities: pump, valve, heating circuit, DHW tank, heat source.

pub mod circuit;
pub mod dhwt;
pub mod heatsource;
pub mod pump;
pub mod valve;

pub use circuit::HeatingCircuit;
pub use dhwt::DhwTank;
pub use heatsource::Boiler;
pub use pump::Pump;
pub use valve::Valve;
