mod bus;
mod registry;

pub use bus::ConferenceBus;
pub use registry::{PortKind, PortRef, PortRegistry};
