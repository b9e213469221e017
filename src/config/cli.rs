use crate::domain::model::{Filter, SerialOptions};
use crate::utils::error::Result;
use crate::utils::hex::parse_id;
use crate::utils::validation::{validate_positive_number, Validate};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "serial-gate")]
#[command(about = "Serial port access over a virtual host")]
pub struct CliConfig {
    /// Device manifest (TOML). A two-board demo manifest is used when omitted.
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List every attached port with its status
    List {
        #[arg(long)]
        json: bool,
    },
    /// Negotiate and grant a port without opening it
    Request(FilterArgs),
    /// Open a matching port, write data and print what comes back
    Send {
        #[arg(long)]
        data: String,

        #[arg(long)]
        baud: Option<u32>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// USB vendor id, hex (e.g. 0x2341)
    #[arg(long)]
    pub vendor: Option<String>,

    /// USB product id, hex (e.g. 0x0043)
    #[arg(long)]
    pub product: Option<String>,
}

impl FilterArgs {
    /// No flags means no filters, which negotiates against every port.
    pub fn filters(&self) -> Result<Vec<Filter>> {
        let vendor = self
            .vendor
            .as_deref()
            .map(|raw| parse_id("vendor", raw))
            .transpose()?;
        let product = self
            .product
            .as_deref()
            .map(|raw| parse_id("product", raw))
            .transpose()?;

        if vendor.is_none() && product.is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![Filter {
            usb_vendor_id: vendor,
            usb_product_id: product,
        }])
    }
}

impl CliConfig {
    /// Applies command line overrides on top of the manifest's options.
    pub fn serial_options(&self, base: SerialOptions) -> SerialOptions {
        match &self.command {
            Command::Send {
                baud: Some(baud), ..
            } => SerialOptions {
                baud_rate: *baud,
                ..base
            },
            _ => base,
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::List { .. } => Ok(()),
            Command::Request(filter) => filter.filters().map(|_| ()),
            Command::Send { baud, filter, .. } => {
                if let Some(baud) = baud {
                    validate_positive_number("baud", *baud)?;
                }
                filter.filters().map(|_| ())
            }
        }
    }
}
