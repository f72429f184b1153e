use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use temple_bridge::config::{BridgeConfig, ConfigOverrides};
use temple_bridge::telemetry::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "temple-bridge")]
#[command(version, about = "MCP bridge with spiral phase tracking between an action repository and a governance repository")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: temple.toml in the working directory, if present)
    #[arg(long, global = true, env = "TEMPLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "TEMPLE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Action repository (back-to-the-basics)
    #[arg(long, global = true)]
    pub basics: Option<PathBuf>,

    /// Governance repository (threshold-protocols)
    #[arg(long, global = true)]
    pub threshold: Option<PathBuf>,

    /// Journey log (JSONL) path
    #[arg(long, global = true)]
    pub journey_log: Option<PathBuf>,

    /// Disable the journey log
    #[arg(long, global = true)]
    pub no_journey: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            basics: self.basics.clone(),
            threshold: self.threshold.clone(),
            journey_log: self.journey_log.clone(),
            no_journey: self.no_journey,
        }
    }

    fn load_config(&self) -> Result<BridgeConfig> {
        Ok(BridgeConfig::load(self.config.as_deref(), &self.overrides())?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdio
    Serve,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Replay a journey log and summarize it
    Journey {
        /// Journey log to read (default: the configured journey log)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Number of recent transitions to show
        #[arg(long, default_value = "5")]
        last: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration as TOML
    Show,
    /// Check that repositories and the journey log directory exist
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = telemetry::init(cli.verbose, cli.log_dir.as_deref(), cli.log_format)?;

    let config = cli.load_config()?;

    match &cli.command {
        Commands::Serve => cmd::cmd_serve(&config).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
        Commands::Journey { log, last } => cmd::cmd_journey(&config, log.as_deref(), *last)?,
    }

    Ok(())
}
