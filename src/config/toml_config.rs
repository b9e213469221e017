use crate::adapters::virtual_transport::VirtualTransport;
use crate::domain::model::{PortDescriptor, PortInfo, SerialOptions};
use crate::utils::error::{Result, SerialError};
use crate::utils::hex::parse_id;
use crate::utils::validation::{validate_non_empty_string, validate_unique, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::task::JoinHandle;

/// Device manifest for the virtual host, plus default line options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub serial: SerialOptions,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    /// Hex string such as `"0x2341"`.
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

impl DeviceConfig {
    pub fn descriptor(&self) -> Result<PortDescriptor> {
        let vendor = self
            .vendor_id
            .as_deref()
            .map(|raw| parse_id("devices.vendor_id", raw))
            .transpose()?;
        let product = self
            .product_id
            .as_deref()
            .map(|raw| parse_id("devices.product_id", raw))
            .transpose()?;

        Ok(PortDescriptor::new(
            self.id.clone(),
            PortInfo {
                usb_vendor_id: vendor,
                usb_product_id: product,
            },
        ))
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SerialError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Two loopback boards, used when no manifest is given.
    pub fn demo() -> Self {
        Self {
            serial: SerialOptions::new(115_200),
            devices: vec![
                DeviceConfig {
                    id: "ttyACM0".to_string(),
                    vendor_id: Some("0x2341".to_string()),
                    product_id: Some("0x0043".to_string()),
                },
                DeviceConfig {
                    id: "ttyUSB0".to_string(),
                    vendor_id: Some("0x1a86".to_string()),
                    product_id: Some("0x7523".to_string()),
                },
            ],
            logging: None,
        }
    }

    /// 替換環境變數 (例如 ${SERIAL_PORT})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SerialError::Config {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn descriptors(&self) -> Result<Vec<PortDescriptor>> {
        self.devices.iter().map(DeviceConfig::descriptor).collect()
    }

    /// Attaches every configured device to `transport` as a loopback board.
    pub fn attach_devices(&self, transport: &VirtualTransport) -> Result<Vec<JoinHandle<()>>> {
        Ok(self
            .descriptors()?
            .into_iter()
            .map(|descriptor| transport.attach_loopback(descriptor))
            .collect())
    }

    pub fn verbose(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.serial.validate()?;

        for device in &self.devices {
            validate_non_empty_string("devices.id", &device.id)?;
            device.descriptor()?;
        }
        validate_unique("devices.id", self.devices.iter().map(|d| d.id.as_str()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Parity;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[serial]
baud_rate = 57600
parity = "even"

[[devices]]
id = "ttyACM0"
vendor_id = "0x2341"
product_id = "0x0043"

[[devices]]
id = "virtual0"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.data_bits, 8);

        let descriptors = config.descriptors().unwrap();
        assert_eq!(descriptors[0].info, PortInfo::usb(0x2341, 0x0043));
        assert_eq!(descriptors[1].info, PortInfo::default());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.serial, SerialOptions::default());
        assert!(config.devices.is_empty());
        assert!(!config.verbose());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SERIAL_GATE_TEST_PORT", "ttyS7");

        let toml_content = r#"
[[devices]]
id = "${SERIAL_GATE_TEST_PORT}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.devices[0].id, "ttyS7");

        std::env::remove_var("SERIAL_GATE_TEST_PORT");
    }

    #[test]
    fn test_config_validation() {
        let duplicate = r#"
[[devices]]
id = "a"

[[devices]]
id = "a"
"#;
        let config = TomlConfig::from_toml_str(duplicate).unwrap();
        assert!(config.validate().is_err());

        let bad_id = r#"
[[devices]]
id = "a"
vendor_id = "0xnothex"
"#;
        let config = TomlConfig::from_toml_str(bad_id).unwrap();
        assert!(config.validate().is_err());

        let bad_options = "[serial]\ndata_bits = 9\n";
        let config = TomlConfig::from_toml_str(bad_options).unwrap();
        assert!(matches!(
            config.validate(),
            Err(SerialError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_invalid_toml() {
        let result = TomlConfig::from_toml_str("[[devices]\nid = ");
        assert!(matches!(result, Err(SerialError::Config { .. })));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[logging]
verbose = true

[[devices]]
id = "file-port"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.devices[0].id, "file-port");
        assert!(config.verbose());
    }

    #[test]
    fn test_demo_config_is_valid() {
        let config = TomlConfig::demo();
        assert!(config.validate().is_ok());
        assert_eq!(config.descriptors().unwrap().len(), 2);
    }
}
