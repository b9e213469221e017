//! Hex formatting helpers for device ids and byte dumps.

use crate::utils::error::{Result, SerialError};

/// Formats a USB id the way device listings show it, e.g. `0x2341`.
pub fn format_id(id: u16) -> String {
    format!("0x{:04x}", id)
}

pub fn format_optional_id(id: Option<u16>) -> String {
    id.map(format_id).unwrap_or_else(|| "-".to_string())
}

/// Space separated lowercase byte dump: `de ad be ef`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accepts `0x2341`, `0X2341` or bare `2341`; digits are always hex.
pub fn parse_id(field_name: &str, input: &str) -> Result<u16> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(SerialError::invalid_config(
            field_name,
            input,
            "Hex id cannot be empty",
        ));
    }

    u16::from_str_radix(digits, 16).map_err(|e| {
        SerialError::invalid_config(field_name, input, format!("Invalid hex id: {}", e))
    })
}
