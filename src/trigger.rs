use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::watcher::{self, FsWatcher};

/// Converges the periodic timer, the filesystem watcher, and manual triggers
/// onto the Orchestrator's single-flight guard (C7, §4.7).
pub struct TriggerLoop {
    tx: mpsc::Sender<()>,
    _watcher: FsWatcher,
}

impl TriggerLoop {
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        local_root: &Path,
        sync_interval: Duration,
        debounce: Duration,
    ) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<()>(32);

        let cycle_orchestrator = orchestrator;
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                cycle_orchestrator.run_cycle().await;
            }
        });

        let timer_tx = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sync_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                let _ = timer_tx.send(()).await;
            }
        });

        let fs_watcher = watcher::start(local_root, debounce, tx.clone())?;

        Ok(TriggerLoop {
            tx,
            _watcher: fs_watcher,
        })
    }

    /// An external call that posts a cycle request immediately (§4.7 "Manual trigger").
    pub async fn trigger_manual(&self) {
        let _ = self.tx.send(()).await;
    }
}
