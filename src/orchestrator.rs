use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{CoreError, Result, SyncError};
use crate::observable::{ErrorRecord, Observable, SyncStatus};
use crate::reconciler::{reconcile, SyncAction};
use crate::remote::{Library, RemoteClient};
use crate::scanner;
use crate::secret_store::SecretStore;
use crate::state_store::{StateStore, SyncedFile};
use crate::{executor, logging};

/// Drives one full sync cycle across every library (C6, §4.6).
pub struct Orchestrator {
    config: Config,
    client: RemoteClient,
    state_store: Arc<StateStore>,
    secret_store: Arc<SecretStore>,
    observable: Arc<Observable>,
    is_syncing: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        client: RemoteClient,
        state_store: Arc<StateStore>,
        secret_store: Arc<SecretStore>,
        observable: Arc<Observable>,
    ) -> Self {
        Orchestrator {
            config,
            client,
            state_store,
            secret_store,
            observable,
            is_syncing: AtomicBool::new(false),
        }
    }

    /// Attempts to start a cycle; a cycle already running causes this call to
    /// return immediately without queuing (§4.6 "Single-flight guard").
    pub async fn run_cycle(&self) {
        if self
            .is_syncing
            .compare_exchange(false, true, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_err()
        {
            logging::info("sync cycle requested while one is already in progress, dropping");
            return;
        }

        self.observable.set_status(SyncStatus::Syncing);
        self.observable.set_current_operation("listing libraries");

        let result = self.run_cycle_inner().await;

        match result {
            Ok(()) => {
                self.observable.set_status(SyncStatus::Idle);
                self.observable.set_last_sync_time(now_unix());
            }
            Err(e) => {
                self.observable.set_status(SyncStatus::Error);
                self.observable.push_error(ErrorRecord {
                    library_id: None,
                    message: e.to_string(),
                });
            }
        }
        self.observable.set_current_operation("");
        self.observable.set_progress(0.0);
        self.is_syncing.store(false, AtomicOrdering::SeqCst);
    }

    async fn run_cycle_inner(&self) -> Result<()> {
        let libraries = self.client.list_libraries().await?;
        self.observable.set_libraries(libraries.clone());

        let count = libraries.len().max(1);
        for (index, library) in libraries.iter().enumerate() {
            self.observable.set_progress(index as f64 / count as f64);
            self.observable
                .set_current_operation(&format!("syncing {}", library.name));

            if let Err(e) = self.sync_one_library(library).await {
                self.observable.push_error(ErrorRecord {
                    library_id: Some(library.id.clone()),
                    message: e.to_string(),
                });
            }
        }
        self.observable.set_progress(1.0);
        Ok(())
    }

    async fn sync_one_library(&self, library: &Library) -> Result<()> {
        if library.encrypted {
            match self.secret_store.load_library_password(&library.id)? {
                Some(password) => {
                    if self.client.set_library_password(&library.id, &password).await.is_err() {
                        return Err(CoreError::Sync(SyncError::EncryptedLibraryNeedsPassword(
                            library.name.clone(),
                        )));
                    }
                }
                None => {
                    return Err(CoreError::Sync(SyncError::EncryptedLibraryNeedsPassword(
                        library.name.clone(),
                    )));
                }
            }
        }

        let local_root = self.config.local_sync_path.join(sanitize_library_dir(&library.name));
        tokio::fs::create_dir_all(&local_root).await?;

        let remote_entries = self.client.list_directory_recursive(&library.id).await?;
        let local_entries = scanner::scan(&local_root)?;
        let baseline = self
            .state_store
            .get_state(&library.id)?
            .map(|s| s.files)
            .unwrap_or_default();

        let read_only = library.is_read_only();
        let actions: Vec<SyncAction> = reconcile(&remote_entries, &local_entries, &baseline, read_only);

        let report = executor::execute_actions(&self.client, &library.id, &local_root, &actions).await;
        for failure in &report.failed {
            logging::info_kv(
                "action failed",
                &[("library", &library.id), ("path", &failure.path), ("error", &failure.message)],
            );
        }

        // §4.6 step h builds the new baseline from the remote listing
        // observed at cycle start. A path whose Download/CreateDirectory
        // failed is excluded here (§9 mitigation) so it doesn't get marked
        // synced when it never actually landed locally, which would read
        // back as a local deletion and emit a phantom DeleteRemote next cycle.
        let unlanded: std::collections::HashSet<&str> = report
            .failed
            .iter()
            .filter(|f| {
                actions.iter().any(|a| {
                    a.path() == f.path
                        && matches!(a, SyncAction::Download { .. } | SyncAction::CreateDirectory { .. })
                })
            })
            .map(|f| f.path.as_str())
            .collect();

        let files: Vec<SyncedFile> = remote_entries
            .into_iter()
            .filter(|e| !unlanded.contains(e.path.as_str()))
            .map(|e| SyncedFile {
                path: e.path,
                object_id: e.object_id,
                mtime: e.mtime,
                size: e.size,
                is_dir: e.is_dir,
            })
            .collect();
        self.state_store.save_state(&library.id, now_unix(), &files)?;

        Ok(())
    }
}

fn sanitize_library_dir(name: &str) -> String {
    name.replace('/', "_")
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
