use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CoreError, Result};

/// Holds the live `notify` watcher; dropping this stops watching (C8, §4.7).
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

/// Subscribes to `root` recursively, coalescing bursts of raw events into a
/// single cycle request after `debounce` quiet time, ignoring hidden paths
/// (any component starting with `.`).
pub fn start(root: &Path, debounce: Duration, trigger_tx: mpsc::Sender<()>) -> Result<FsWatcher> {
    let (raw_tx, raw_rx) = std_mpsc::channel::<()>();

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if event.paths.iter().any(|p| !is_hidden_path(p)) {
                    let _ = raw_tx.send(());
                }
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|e| CoreError::Other(format!("failed to start filesystem watcher: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| CoreError::Other(format!("failed to watch {}: {e}", root.display())))?;

    thread::Builder::new()
        .name("seasync-watcher-debounce".into())
        .spawn(move || debounce_loop(raw_rx, debounce, trigger_tx))
        .map_err(|e| CoreError::Other(e.to_string()))?;

    Ok(FsWatcher { _watcher: watcher })
}

fn debounce_loop(raw_rx: std_mpsc::Receiver<()>, debounce: Duration, trigger_tx: mpsc::Sender<()>) {
    loop {
        if raw_rx.recv().is_err() {
            return;
        }
        loop {
            match raw_rx.recv_timeout(debounce) {
                Ok(()) => continue,
                Err(std_mpsc::RecvTimeoutError::Timeout) => break,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
        if trigger_tx.blocking_send(()).is_err() {
            return;
        }
    }
}

/// §4.7 "Hidden paths (containing `/.`) are ignored."
fn is_hidden_path(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s.starts_with('.') && s != "." && s != "..")
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn hidden_path_detects_dotted_segment() {
        assert!(is_hidden_path(&PathBuf::from("/sync/.git/config")));
        assert!(is_hidden_path(&PathBuf::from("/sync/docs/.hidden.txt")));
    }

    #[test]
    fn visible_path_is_not_hidden() {
        assert!(!is_hidden_path(&PathBuf::from("/sync/docs/a.txt")));
    }
}
