//! Zappy AI: autonomous team agent.
//!
//! Usage:
//!   zappy-ai -p <port> -n <team> [-h <host>]
//!
//! `-h` names the host, so help lives on `-a/--help`.

use anyhow::Result;
use clap::{ArgAction, Parser};
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zappy_ai::agent::{self, Shutdown};
use zappy_ai::config::{self, AgentConfig};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "zappy-ai")]
#[command(version)]
#[command(about = "Autonomous team agent for the Zappy game server")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Server port.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Team name.
    #[arg(short = 'n', long = "name")]
    team: Option<String>,

    /// Server host.
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Print help.
    #[arg(short = 'a', long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
            .unwrap_or_else(config::default_config_path)
    }

    /// Flags win over the config file.
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(team) = &self.team {
            config.team = team.clone();
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(&cli.config_path())?;
    cli.apply(&mut config);

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    config::validate(&config)?;

    println!(
        "{} Joining team '{}' on {}:{}",
        ">>>".green().bold(),
        config.team,
        config.host,
        config.port,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    match agent::run_agent_loop(config, cancel).await? {
        Shutdown::Died => println!("{} Agent died", "xxx".red().bold()),
        Shutdown::Cancelled => {
            warn!("Agent stopped before the end of its life");
            println!("{} Agent stopped", ">>>".yellow().bold());
        }
    }
    Ok(())
}
