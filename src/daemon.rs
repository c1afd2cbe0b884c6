use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::{Config, ConfigOverrides};
use crate::observable::Observable;
use crate::orchestrator::Orchestrator;
use crate::remote::RemoteClient;
use crate::secret_store::SecretStore;
use crate::state_store::StateStore;
use crate::trigger::TriggerLoop;

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub log_path: Option<PathBuf>,
}

pub struct ThreadedDaemonHandle {
    shutdown: std::sync::mpsc::Sender<()>,
    join: Option<thread::JoinHandle<Result<()>>>,
}

impl ThreadedDaemonHandle {
    pub fn stop(mut self) -> Result<()> {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            match join.join() {
                Ok(res) => res,
                Err(_) => anyhow::bail!("seasync daemon thread panicked"),
            }
        } else {
            Ok(())
        }
    }
}

/// Wires Config/StateStore/SecretStore/RemoteClient/Orchestrator/TriggerLoop
/// together and runs until `shutdown` is notified (§4.6, §4.7). A login must
/// already be on file in the secret store; this does not perform one.
pub async fn run_daemon_with_shutdown(
    cfg: Config,
    opts: DaemonOptions,
    shutdown: Arc<tokio::sync::Notify>,
) -> Result<(Arc<Observable>, std::sync::Arc<StateStore>)> {
    let log_path = opts
        .log_path
        .unwrap_or_else(|| Config::default_log_file_path());
    crate::logging::init_log_file(&log_path)?;
    crate::logging::info(format!(
        "daemon start version={} server={} local_sync_path={}",
        env!("CARGO_PKG_VERSION"),
        cfg.server_url,
        cfg.local_sync_path.display()
    ));

    let secret_store = Arc::new(SecretStore::new());
    let account = secret_store
        .load_account()?
        .context("no account on file; run configure/login before starting the daemon")?;

    let state_store = Arc::new(StateStore::open(&cfg.database_path)?);
    let client = RemoteClient::with_token(&account.server_url, &account.token)
        .context("build remote client")?;

    let (observable, _rx) = Observable::new();
    observable.set_configured(true);

    let orchestrator = Arc::new(Orchestrator::new(
        cfg.clone(),
        client,
        state_store.clone(),
        secret_store,
        observable.clone(),
    ));

    let trigger = TriggerLoop::start(
        orchestrator.clone(),
        &cfg.local_sync_path,
        Duration::from_secs(cfg.sync_interval_seconds),
        Duration::from_secs_f64(cfg.file_change_debounce_seconds),
    )?;

    shutdown.notified().await;
    crate::logging::info("daemon shutdown requested");
    drop(trigger);

    Ok((observable, state_store))
}

/// Starts a daemon in a dedicated background thread with its own tokio
/// runtime, for embedding in host applications (mirrors the teacher's
/// thread-owned-runtime pattern for daemon embedding).
pub fn start_threaded(cfg: Config, opts: DaemonOptions) -> Result<ThreadedDaemonHandle> {
    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
    let join = thread::Builder::new()
        .name("seasync-daemon".to_string())
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .worker_threads(2)
                .build()
                .context("build tokio runtime")?;

            rt.block_on(async move {
                let shutdown = Arc::new(tokio::sync::Notify::new());
                let shutdown_task = shutdown.clone();
                tokio::task::spawn_blocking(move || {
                    let _ = shutdown_rx.recv();
                    shutdown_task.notify_waiters();
                });

                run_daemon_with_shutdown(cfg, opts, shutdown).await.map(|_| ())
            })
        })
        .context("spawn seasync daemon thread")?;

    Ok(ThreadedDaemonHandle {
        shutdown: shutdown_tx,
        join: Some(join),
    })
}

pub fn start_threaded_from_config_path(
    config_path: &std::path::Path,
    overrides: ConfigOverrides,
    opts: DaemonOptions,
) -> Result<ThreadedDaemonHandle> {
    let cfg = Config::load_with_overrides(config_path, overrides)?;
    start_threaded(cfg, opts)
}
