use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use serial_gate::config::Command;
use serial_gate::utils::error::ErrorSeverity;
use serial_gate::utils::hex::{format_optional_id, to_hex};
use serial_gate::utils::{logger, validation::Validate};
use serial_gate::{CliConfig, SerialAccess, SerialError, TomlConfig, VirtualTransport};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct PortListing {
    id: String,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
    status: serial_gate::PortStatus,
    granted: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 載入裝置清單
    let manifest = match &config.config {
        Some(path) => TomlConfig::from_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path))?,
        None => TomlConfig::demo(),
    };

    // 初始化日誌
    let verbose = config.verbose || manifest.verbose();
    if config.log_json || manifest.json_logs() {
        logger::init_json_logger(verbose);
    } else {
        logger::init_cli_logger(verbose);
    }

    tracing::info!("Starting serial-gate");
    tracing::debug!("CLI config: {:?}", config);

    // 驗證配置
    if let Err(e) = config.validate().and_then(|_| manifest.validate()) {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let transport = Arc::new(VirtualTransport::new());
    manifest.attach_devices(&transport)?;
    let access = SerialAccess::start(transport).await?;

    let outcome = run(&config, &manifest, &access).await;
    access.shutdown();

    if let Err(e) = outcome {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(
    config: &CliConfig,
    manifest: &TomlConfig,
    access: &SerialAccess,
) -> Result<(), SerialError> {
    match &config.command {
        Command::List { json } => list_ports(access, *json),
        Command::Request(filter) => {
            let port = access.request_port(&filter.filters()?).await?;
            let info = port.info();
            println!(
                "✅ Granted {} (vendor {}, product {})",
                port.id(),
                format_optional_id(info.usb_vendor_id),
                format_optional_id(info.usb_product_id)
            );
            Ok(())
        }
        Command::Send { data, filter, .. } => {
            let port = access.request_port(&filter.filters()?).await?;
            let options = config.serial_options(manifest.serial);
            let session = port.open(options).await?;
            tracing::info!("🔌 Opened {} at {} baud", port.id(), options.baud_rate);

            session.write(data.as_bytes()).await?;

            let mut received = Vec::with_capacity(data.len());
            while received.len() < data.len() {
                match session.read().await? {
                    Some(chunk) => received.extend_from_slice(&chunk),
                    None => break,
                }
            }
            session.close().await?;

            println!("📨 {}", String::from_utf8_lossy(&received));
            println!("🔢 {}", to_hex(&received));
            Ok(())
        }
    }
}

fn list_ports(access: &SerialAccess, json: bool) -> Result<(), SerialError> {
    let registry = access.registry();
    let listings: Vec<PortListing> = registry
        .list_known()
        .into_iter()
        .map(|descriptor| PortListing {
            status: registry.status(&descriptor.id),
            granted: registry.is_granted(&descriptor.id),
            id: descriptor.id.to_string(),
            vendor_id: descriptor.info.usb_vendor_id,
            product_id: descriptor.info.usb_product_id,
        })
        .collect();

    if json {
        let rendered = serde_json::to_string_pretty(&listings).map_err(|e| SerialError::Config {
            message: format!("failed to render port list: {}", e),
        })?;
        println!("{}", rendered);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No ports attached");
    }
    for listing in &listings {
        println!(
            "{:<12} vendor {:<8} product {:<8} {:?}{}",
            listing.id,
            format_optional_id(listing.vendor_id),
            format_optional_id(listing.product_id),
            listing.status,
            if listing.granted { " (granted)" } else { "" }
        );
    }
    Ok(())
}
