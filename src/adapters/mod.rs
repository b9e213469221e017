// Adapters layer: concrete implementations of the domain ports (host transports, choosers).

pub mod chooser;
pub mod virtual_transport;

pub use chooser::{ById, FirstCandidate};
pub use virtual_transport::{DeviceConnection, VirtualDevice, VirtualTransport};
