use crate::utils::error::{Result, SerialError};
use crate::utils::validation::{validate_one_of, validate_positive_number, validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum chunk size returned by a single read.
pub const DEFAULT_BUFFER_SIZE: usize = 255;
/// Upper bound for `SerialOptions::buffer_size` (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Stable identifier assigned to a port by the host transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub usb_vendor_id: Option<u16>,
    pub usb_product_id: Option<u16>,
}

impl PortInfo {
    pub fn usb(vendor_id: u16, product_id: u16) -> Self {
        Self {
            usb_vendor_id: Some(vendor_id),
            usb_product_id: Some(product_id),
        }
    }
}

/// What the host reports for a device on enumeration or attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub id: PortId,
    pub info: PortInfo,
}

impl PortDescriptor {
    pub fn new(id: impl Into<String>, info: PortInfo) -> Self {
        Self {
            id: PortId::new(id),
            info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Available,
    Open,
    Unavailable,
}

/// Lifecycle of a single `PortSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// Close requested; queued writes are still being accepted by the transport.
    Draining,
    Closed,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Disconnected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Attached(PortDescriptor),
    Detached(PortId),
}

/// Caller supplied matching criterion. Unset fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub usb_vendor_id: Option<u16>,
    pub usb_product_id: Option<u16>,
}

impl Filter {
    pub fn vendor(vendor_id: u16) -> Self {
        Self {
            usb_vendor_id: Some(vendor_id),
            usb_product_id: None,
        }
    }

    pub fn vendor_product(vendor_id: u16, product_id: u16) -> Self {
        Self {
            usb_vendor_id: Some(vendor_id),
            usb_product_id: Some(product_id),
        }
    }

    pub fn matches(&self, info: &PortInfo) -> bool {
        let vendor_ok = self
            .usb_vendor_id
            .map_or(true, |vid| info.usb_vendor_id == Some(vid));
        let product_ok = self
            .usb_product_id
            .map_or(true, |pid| info.usb_product_id == Some(pid));
        vendor_ok && product_ok
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(SerialError::invalid_config(
                "data_bits",
                other,
                "Value must be between 5 and 8",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub fn bits(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(SerialError::invalid_config(
                "stop_bits",
                other,
                "Value must be one of: 1, 2",
            )),
        }
    }
}

/// Options requested by the caller when opening a port.
///
/// Integers are kept raw here so that configuration files and CLI flags can
/// carry them; `validate`/`line_settings` reject anything the line cannot do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialOptions {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub buffer_size: usize,
}

impl SerialOptions {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    pub fn data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn stop_bits(mut self, stop_bits: u8) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn line_settings(&self) -> Result<LineSettings> {
        self.validate()?;
        Ok(LineSettings {
            baud_rate: self.baud_rate,
            data_bits: DataBits::try_from(self.data_bits)?,
            stop_bits: StopBits::try_from(self.stop_bits)?,
            parity: self.parity,
            flow_control: self.flow_control,
            buffer_size: self.buffer_size,
        })
    }
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl Validate for SerialOptions {
    fn validate(&self) -> Result<()> {
        validate_positive_number("baud_rate", self.baud_rate)?;
        validate_range("data_bits", self.data_bits, 5, 8)?;
        validate_one_of("stop_bits", self.stop_bits, &[1, 2])?;
        validate_range("buffer_size", self.buffer_size, 1, MAX_BUFFER_SIZE)?;

        // UARTs emit 1.5 stop bits when 2 are requested with 5-bit frames.
        if self.data_bits == 5 && self.stop_bits == 2 {
            return Err(SerialError::invalid_config(
                "stop_bits",
                self.stop_bits,
                "2 stop bits cannot be combined with 5 data bits",
            ));
        }

        Ok(())
    }
}

/// Validated line configuration handed to the host transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub buffer_size: usize,
}
