pub mod error;
pub mod hex;
pub mod logger;
pub mod validation;
