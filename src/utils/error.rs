use crate::domain::model::PortId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Port {port} is already open")]
    AlreadyOpen { port: PortId },

    #[error("Port {port} is unavailable: {reason}")]
    Unavailable { port: PortId, reason: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Session is closed")]
    Closed,

    #[error("Port {port} was disconnected")]
    Disconnected { port: PortId },

    #[error("No port matched the requested filters")]
    NoMatch,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Access,
    Session,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SerialError {
    pub fn unavailable(port: &PortId, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            port: port.clone(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig { .. } | Self::Config { .. } => ErrorCategory::Configuration,
            Self::AlreadyOpen { .. } | Self::Unavailable { .. } | Self::NoMatch => {
                ErrorCategory::Access
            }
            Self::Closed | Self::Disconnected { .. } => ErrorCategory::Session,
            Self::Io(_) | Self::Transport { .. } => ErrorCategory::Transport,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Closed => ErrorSeverity::Low,
            Self::AlreadyOpen { .. } | Self::NoMatch | Self::Disconnected { .. } => {
                ErrorSeverity::Medium
            }
            Self::Unavailable { .. } | Self::InvalidConfig { .. } | Self::Config { .. } => {
                ErrorSeverity::High
            }
            Self::Io(_) | Self::Transport { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::AlreadyOpen { .. } => "Close the existing session before opening the port again",
            Self::Unavailable { .. } => "Check that the device is attached and access was granted",
            Self::InvalidConfig { .. } => "Fix the serial options and try again",
            Self::Closed => "Open a new session on the port",
            Self::Disconnected { .. } => "Reconnect the device and reopen the port",
            Self::NoMatch => "Relax the vendor/product filters or attach a matching device",
            Self::Io(_) | Self::Transport { .. } => "Check the host driver and device cabling",
            Self::Config { .. } => "Check the configuration file syntax and device entries",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Access => format!("Cannot access port: {}", self),
            ErrorCategory::Session => format!("Session ended: {}", self),
            ErrorCategory::Transport => format!("Device communication failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
