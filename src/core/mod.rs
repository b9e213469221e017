pub mod access;
pub mod negotiation;
pub mod port;
pub mod registry;
pub mod session;

pub use crate::domain::model::{
    Filter, PortDescriptor, PortEvent, PortId, PortInfo, PortStatus, SerialOptions, SessionState,
};
pub use crate::domain::ports::{DeviceLink, HostTransport, PortChooser};
pub use crate::utils::error::Result;
