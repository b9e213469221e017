use crate::utils::error::{Result, SerialError};
use std::collections::HashSet;
use std::fmt::Display;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_positive_number<T>(field_name: &str, value: T) -> Result<()>
where
    T: PartialOrd + Default + Display,
{
    if value <= T::default() {
        return Err(SerialError::invalid_config(
            field_name,
            value,
            "Value must be a positive integer",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SerialError::invalid_config(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

pub fn validate_one_of<T: PartialEq + Display + Copy>(
    field_name: &str,
    value: T,
    allowed: &[T],
) -> Result<()> {
    if !allowed.contains(&value) {
        let allowed = allowed
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(SerialError::invalid_config(
            field_name,
            value,
            format!("Value must be one of: {}", allowed),
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SerialError::invalid_config(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_unique<'a, I>(field_name: &str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(SerialError::invalid_config(
                field_name,
                value,
                "Duplicate entry",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("baud_rate", 9600u32).is_ok());
        assert!(validate_positive_number("baud_rate", 0u32).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("data_bits", 8u8, 5, 8).is_ok());
        assert!(validate_range("data_bits", 5u8, 5, 8).is_ok());
        assert!(validate_range("data_bits", 4u8, 5, 8).is_err());
        assert!(validate_range("data_bits", 9u8, 5, 8).is_err());
    }

    #[test]
    fn test_validate_one_of() {
        assert!(validate_one_of("stop_bits", 2u8, &[1, 2]).is_ok());
        let err = validate_one_of("stop_bits", 3u8, &[1, 2]).unwrap_err();
        assert!(err.to_string().contains("one of: 1, 2"));
    }

    #[test]
    fn test_validate_unique() {
        assert!(validate_unique("devices.id", ["a", "b"]).is_ok());
        assert!(validate_unique("devices.id", ["a", "b", "a"]).is_err());
    }
}
