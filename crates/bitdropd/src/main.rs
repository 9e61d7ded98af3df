//! bitdropd: BitDrop file-drop server
//!
//! Usage:
//!   bitdropd [--config /etc/bitdrop/config.toml] [--log info] [--log-format text|json]

mod api;
mod daemon;
mod metrics;

use anyhow::{Context, Result};
use bitdrop_core::BitdropConfig;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bitdropd", version, about = "BitDrop encrypted file-drop server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        short = 'c',
        env = "BITDROP_CONFIG",
        default_value = "/etc/bitdrop/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides server.log_level
    #[arg(long, env = "BITDROP_LOG")]
    log: Option<String>,

    /// Log format; overrides server.log_format
    #[arg(long, env = "BITDROP_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging is up, so a missing file is reported after
    let (config, config_found) = load_config(&cli.config).await?;

    let level = cli.log.as_deref().unwrap_or(&config.server.log_level);
    let format = match cli.log_format {
        Some(format) => format,
        None if config.server.log_format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, &format);

    if !config_found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "bitdropd starting"
    );

    daemon::run(config).await
}

async fn load_config(path: &Path) -> Result<(BitdropConfig, bool)> {
    if !path.exists() {
        return Ok((BitdropConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok((config, true))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
