//! guildd: the Guild hello service daemon.
//!
//! Single binary that assembles the service:
//! - State store (redb) holding the greeting parameter
//! - Warm pool of greeting handlers
//! - Metrics collector
//! - Concurrency autoscaler
//! - Health monitor (error and latency alarms)
//! - HTTP gateway
//!
//! # Usage
//!
//! ```text
//! guildd serve --port 8080 --data-dir /var/lib/guild
//! guildd greet --name Ada
//! guildd param put "Hi there, {name}!"
//! guildd config
//! ```

mod commands;
mod service;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use guild_core::ServiceConfig;

#[derive(Parser)]
#[command(name = "guildd", about = "Guild hello service daemon")]
struct Cli {
    /// Service configuration file. Defaults apply when it does not exist.
    #[arg(long, short, global = true, env = "GUILD_CONFIG", default_value = "guild.toml")]
    config: PathBuf,

    /// Data directory for persistent state.
    #[arg(long, global = true, env = "GUILD_DATA_DIR", default_value = "/var/lib/guild")]
    data_dir: PathBuf,

    /// Log level or filter directive, overriding the config file.
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the hello service.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,

        /// Environment name surfaced in logs, /healthz, and alarm payloads.
        #[arg(long, env = "ENVIRONMENT")]
        environment: Option<String>,

        /// Service version surfaced in logs and /healthz.
        #[arg(long = "service-version", env = "SERVICE_VERSION")]
        version: Option<String>,
    },

    /// Print the greeting for a name using the stored template.
    Greet {
        #[arg(long, default_value = "world")]
        name: String,
    },

    /// Read, set, or clear the greeting template.
    Param {
        #[command(subcommand)]
        action: ParamAction,
    },

    /// Print the effective configuration after file and flag overrides.
    Config,
}

#[derive(Subcommand)]
enum ParamAction {
    /// Print the stored template.
    Get {
        /// Parameter key (defaults to the configured greeting parameter).
        #[arg(long)]
        key: Option<String>,
    },
    /// Store a new template.
    Put {
        value: String,
        #[arg(long)]
        key: Option<String>,
    },
    /// Remove the stored template so the fallback applies.
    Delete {
        #[arg(long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.service.log_level = level;
    }
    init_tracing(&config.service.log_level, cli.log_json);

    match cli.command {
        Command::Serve {
            port,
            environment,
            version,
        } => {
            if let Some(environment) = environment {
                config.service.environment = environment;
            }
            if let Some(version) = version {
                config.service.version = version;
            }
            service::run_service(config, port, cli.data_dir).await
        }
        Command::Greet { name } => commands::greet(&config, &cli.data_dir, &name),
        Command::Param { action } => match action {
            ParamAction::Get { key } => commands::param_get(&config, &cli.data_dir, key.as_deref()),
            ParamAction::Put { value, key } => {
                commands::param_put(&config, &cli.data_dir, key.as_deref(), &value)
            }
            ParamAction::Delete { key } => {
                commands::param_delete(&config, &cli.data_dir, key.as_deref())
            }
        },
        Command::Config => commands::show_config(&config),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    if !path.exists() {
        return Ok(ServiceConfig::default());
    }
    ServiceConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
