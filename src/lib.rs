pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{ById, FirstCandidate, VirtualDevice, VirtualTransport};
pub use config::toml_config::TomlConfig;
pub use core::{
    access::SerialAccess,
    port::SerialPort,
    session::{ClosePolicy, PortSession},
};
pub use domain::model::{
    Filter, FlowControl, Parity, PortDescriptor, PortEvent, PortId, PortInfo, PortStatus,
    SerialOptions, SessionState,
};
pub use utils::error::{Result, SerialError};
