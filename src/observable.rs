use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::watch;

use crate::remote::Library;

/// §4.6 "Observable signals": `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Paused,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub library_id: Option<String>,
    pub message: String,
}

/// A point-in-time snapshot of everything a UI needs to render sync state,
/// mirroring the control plane's status surface without the HTTP layer
/// (§4.6, §9 "no outer HTTP surface for this core").
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub status: SyncStatus,
    pub is_configured: bool,
    pub last_sync_time: Option<i64>,
    pub progress: f64,
    pub current_operation: String,
    pub libraries: Vec<LibrarySummary>,
    pub errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibrarySummary {
    pub id: String,
    pub name: String,
    pub encrypted: bool,
    pub read_only: bool,
}

impl From<&Library> for LibrarySummary {
    fn from(l: &Library) -> Self {
        LibrarySummary {
            id: l.id.clone(),
            name: l.name.clone(),
            encrypted: l.encrypted,
            read_only: l.is_read_only(),
        }
    }
}

struct State {
    status: SyncStatus,
    is_configured: bool,
    last_sync_time: Option<i64>,
    progress: f64,
    current_operation: String,
    libraries: Vec<LibrarySummary>,
    errors: Vec<ErrorRecord>,
}

impl Default for State {
    fn default() -> Self {
        State {
            status: SyncStatus::Idle,
            is_configured: false,
            last_sync_time: None,
            progress: 0.0,
            current_operation: String::new(),
            libraries: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Change-notified, lock-guarded sync status, handed to callers that render
/// UI and to the Orchestrator that updates it (C6's publishing side of §4.6).
pub struct Observable {
    state: Mutex<State>,
    tx: watch::Sender<()>,
}

const MAX_ERRORS: usize = 50;

impl Observable {
    pub fn new() -> (std::sync::Arc<Self>, watch::Receiver<()>) {
        let (tx, rx) = watch::channel(());
        let observable = std::sync::Arc::new(Observable {
            state: Mutex::new(State::default()),
            tx,
        });
        (observable, rx)
    }

    pub fn snapshot(&self) -> Snapshot {
        let s = self.state.lock().unwrap();
        Snapshot {
            status: s.status,
            is_configured: s.is_configured,
            last_sync_time: s.last_sync_time,
            progress: s.progress,
            current_operation: s.current_operation.clone(),
            libraries: s.libraries.clone(),
            errors: s.errors.clone(),
        }
    }

    fn notify(&self) {
        let _ = self.tx.send(());
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.state.lock().unwrap().status = status;
        self.notify();
    }

    pub fn set_configured(&self, configured: bool) {
        self.state.lock().unwrap().is_configured = configured;
        self.notify();
    }

    pub fn set_last_sync_time(&self, ts: i64) {
        self.state.lock().unwrap().last_sync_time = Some(ts);
        self.notify();
    }

    pub fn set_progress(&self, progress: f64) {
        self.state.lock().unwrap().progress = progress.clamp(0.0, 1.0);
        self.notify();
    }

    pub fn set_current_operation(&self, op: &str) {
        self.state.lock().unwrap().current_operation = op.to_string();
        self.notify();
    }

    pub fn set_libraries(&self, libraries: Vec<Library>) {
        self.state.lock().unwrap().libraries = libraries.iter().map(LibrarySummary::from).collect();
        self.notify();
    }

    pub fn push_error(&self, error: ErrorRecord) {
        let mut s = self.state.lock().unwrap();
        s.errors.push(error);
        if s.errors.len() > MAX_ERRORS {
            let overflow = s.errors.len() - MAX_ERRORS;
            s.errors.drain(0..overflow);
        }
        drop(s);
        self.notify();
    }

    pub fn clear_errors(&self) {
        self.state.lock().unwrap().errors.clear();
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_observable_starts_idle_and_unconfigured() {
        let (observable, _rx) = Observable::new();
        let snap = observable.snapshot();
        assert_eq!(snap.status, SyncStatus::Idle);
        assert!(!snap.is_configured);
        assert!(snap.last_sync_time.is_none());
    }

    #[test]
    fn setting_status_notifies_watchers() {
        let (observable, mut rx) = Observable::new();
        observable.set_status(SyncStatus::Syncing);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert_eq!(observable.snapshot().status, SyncStatus::Syncing);
    }

    #[test]
    fn error_log_caps_at_max_entries() {
        let (observable, _rx) = Observable::new();
        for i in 0..(MAX_ERRORS + 10) {
            observable.push_error(ErrorRecord {
                library_id: None,
                message: format!("error {i}"),
            });
        }
        assert_eq!(observable.snapshot().errors.len(), MAX_ERRORS);
    }

    #[test]
    fn progress_is_clamped() {
        let (observable, _rx) = Observable::new();
        observable.set_progress(1.5);
        assert_eq!(observable.snapshot().progress, 1.0);
        observable.set_progress(-1.0);
        assert_eq!(observable.snapshot().progress, 0.0);
    }
}
