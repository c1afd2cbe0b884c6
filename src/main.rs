mod config;
mod daemon;
mod error;
mod executor;
mod logging;
mod observable;
mod orchestrator;
mod reconciler;
mod remote;
mod scanner;
mod secret_store;
mod state_store;
mod trigger;
mod watcher;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use config::{Config, ConfigOverrides};
use remote::RemoteClient;
use secret_store::{Account, SecretStore};

#[derive(Parser, Debug)]
#[command(name = "seasync", version)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Seafile server URL override (takes precedence over env/config)
    #[arg(long = "server")]
    server: Option<String>,

    /// Local sync path override (takes precedence over env/config)
    #[arg(long = "path")]
    local_sync_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in to the Seafile server and persist the account in the OS keychain
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Run the sync daemon (periodic timer + filesystem watcher)
    Daemon,

    /// Run a single sync cycle across all libraries and exit
    SyncOnce,

    /// Print the resolved config file path
    ConfigPath,

    /// Remove the stored account and any library passwords
    Logout,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        server_url: cli.server.clone(),
        local_sync_path: cli.local_sync_path.clone(),
        ..Default::default()
    };

    let config_path = Config::resolve_config_path(cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Login { username, password } => cmd_login(&config_path, overrides, &username, &password).await,
        Commands::Daemon => cmd_daemon(&config_path, overrides).await,
        Commands::SyncOnce => cmd_sync_once(&config_path, overrides).await,
        Commands::ConfigPath => {
            println!("{}", config_path.display());
            Ok(())
        }
        Commands::Logout => cmd_logout(),
        Commands::Version => {
            println!("seasync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn cmd_login(config_path: &PathBuf, overrides: ConfigOverrides, username: &str, password: &str) -> Result<()> {
    let cfg = Config::load_with_overrides(config_path, overrides)?;
    let client = RemoteClient::new(&cfg.server_url)?;
    let token = client.login(username, password).await?;

    let secret_store = SecretStore::new();
    secret_store.save_account(&Account {
        server_url: cfg.server_url.clone(),
        username: username.to_string(),
        token,
    })?;

    println!("logged in as {username} on {}", cfg.server_url);
    Ok(())
}

async fn cmd_daemon(config_path: &PathBuf, overrides: ConfigOverrides) -> Result<()> {
    let cfg = Config::load_with_overrides(config_path, overrides)?;
    let shutdown = std::sync::Arc::new(tokio::sync::Notify::new());

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.notify_waiters();
    });

    daemon::run_daemon_with_shutdown(cfg, daemon::DaemonOptions::default(), shutdown).await?;
    Ok(())
}

async fn cmd_sync_once(config_path: &PathBuf, overrides: ConfigOverrides) -> Result<()> {
    let cfg = Config::load_with_overrides(config_path, overrides)?;
    let secret_store = std::sync::Arc::new(SecretStore::new());
    let account = secret_store
        .load_account()?
        .context("no account on file; run `seasync login` first")?;

    let state_store = std::sync::Arc::new(state_store::StateStore::open(&cfg.database_path)?);
    let client = RemoteClient::with_token(&account.server_url, &account.token)?;
    let (observable, _rx) = observable::Observable::new();

    let orchestrator = orchestrator::Orchestrator::new(cfg, client, state_store, secret_store, observable.clone());
    orchestrator.run_cycle().await;

    let snapshot = observable.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_logout() -> Result<()> {
    let secret_store = SecretStore::new();
    secret_store.delete_account()?;
    println!("logged out");
    Ok(())
}
