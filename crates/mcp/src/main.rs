//! Hubbridge MCP Server Binary
//!
//! Speaks MCP over stdio; logs go to stderr so stdout stays clean for the protocol.
//!
//! ## Usage
//!
//! ```bash
//! # Token from the environment
//! HUBBRIDGE_HUBSPOT_ACCESS_TOKEN=pat-... hubbridge-mcp
//!
//! # Explicit config file and log level
//! hubbridge-mcp --config hubbridge.toml --log-level debug
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use hubbridge_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use hubbridge_mcp::{HubbridgeMcpServer, TOTAL_TOOLS};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hubbridge-mcp", version, about = "HubSpot CRM tools over the Model Context Protocol")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level or filter directive (e.g. `info`, `hubbridge_core=debug`)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: compact, pretty or json
    #[arg(long)]
    log_format: Option<LogFormat>,
}

fn init_logging(config: &AppConfig) {
    use LogFormat::*;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let require_file = args.config.is_some();

    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions {
        config_path: args.config,
        require_file,
        overrides: ConfigOverrides {
            log_level: args.log_level,
            log_format: args.log_format,
            ..ConfigOverrides::default()
        },
    })?;
    init_logging(&config);

    info!(
        event_name = "system.mcp.started",
        correlation_id = "bootstrap",
        base_url = %config.hubspot.base_url,
        tools = TOTAL_TOOLS,
        "hubbridge mcp server starting"
    );

    HubbridgeMcpServer::from_config(&config)?.run_stdio().await
}
