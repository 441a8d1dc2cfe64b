pub mod event_bus;
pub mod histogram;

pub use event_bus::*;
pub use histogram::*;
