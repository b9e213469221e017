#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command, FilterArgs};
pub use toml_config::{DeviceConfig, LoggingConfig, TomlConfig};
