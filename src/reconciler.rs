use std::cmp::Ordering;
use std::collections::HashMap;

use crate::remote::RemoteEntry;
use crate::scanner::LocalEntry;
use crate::state_store::SyncedFile;

/// One step of a reconciliation plan (§3 `SyncAction`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    CreateDirectory { path: String },
    Download { path: String },
    Upload { path: String },
    DeleteRemote { path: String, is_dir: bool },
    DeleteLocal { path: String, is_dir: bool },
    /// Reserved for a future conflict-resolution strategy; the current
    /// last-modified-wins reconciliation never emits this (§9).
    Conflict { path: String },
}

impl SyncAction {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::CreateDirectory { path }
            | SyncAction::Download { path }
            | SyncAction::Upload { path }
            | SyncAction::DeleteRemote { path, .. }
            | SyncAction::DeleteLocal { path, .. }
            | SyncAction::Conflict { path } => path,
        }
    }

    fn order_rank(&self) -> u8 {
        match self {
            SyncAction::CreateDirectory { .. } => 0,
            SyncAction::Download { .. } => 1,
            SyncAction::Upload { .. } => 2,
            SyncAction::DeleteRemote { .. } => 3,
            SyncAction::DeleteLocal { .. } => 4,
            SyncAction::Conflict { .. } => 5,
        }
    }
}

/// Pure reconciliation (C4, §4.4): three passes over remote/local/baseline
/// sets, keyed by path, producing an ordered action list. `read_only`
/// suppresses `Upload` and `DeleteRemote` for libraries with `permission == "r"`.
pub fn reconcile(
    remote_entries: &[RemoteEntry],
    local_entries: &HashMap<String, LocalEntry>,
    baseline: &[SyncedFile],
    read_only: bool,
) -> Vec<SyncAction> {
    let remote_by_path: HashMap<&str, &RemoteEntry> =
        remote_entries.iter().map(|e| (e.path.as_str(), e)).collect();
    let baseline_by_path: HashMap<&str, &SyncedFile> =
        baseline.iter().map(|b| (b.path.as_str(), b)).collect();

    let mut actions: Vec<SyncAction> = Vec::new();

    // 1. Descend remote, emit downloads/mkdirs.
    for entry in remote_entries {
        if entry.is_dir {
            if !local_entries.contains_key(&entry.path) {
                actions.push(SyncAction::CreateDirectory {
                    path: entry.path.clone(),
                });
            }
        } else {
            let local_mtime = local_entries.get(&entry.path).map(|l| l.mtime);
            match local_mtime {
                None => actions.push(SyncAction::Download {
                    path: entry.path.clone(),
                }),
                Some(m) if m < entry.mtime => actions.push(SyncAction::Download {
                    path: entry.path.clone(),
                }),
                _ => {}
            }
        }
    }

    // 2. Walk local, emit uploads.
    if !read_only {
        for (path, local) in local_entries {
            if local.is_dir {
                continue;
            }
            match remote_by_path.get(path.as_str()) {
                Some(remote) if !remote.is_dir => {
                    if local.mtime > remote.mtime {
                        actions.push(SyncAction::Upload { path: path.clone() });
                    }
                }
                Some(_) => {
                    // Remote side holds a directory at this path; a type flip,
                    // left to the baseline pass below.
                }
                None => {
                    // Absent from the remote listing: only a genuinely new
                    // local file is uploaded here. A path already in the
                    // baseline that vanished remotely is a deletion, handled
                    // by the baseline pass below, not re-uploaded.
                    if !baseline_by_path.contains_key(path.as_str()) {
                        actions.push(SyncAction::Upload { path: path.clone() });
                    }
                }
            }
        }
    }

    // 3. Deletion detection via baseline.
    for b in baseline {
        let in_remote = remote_by_path.contains_key(b.path.as_str());
        let in_local = local_entries.contains_key(&b.path);
        if !in_remote && in_local {
            actions.push(SyncAction::DeleteLocal {
                path: b.path.clone(),
                is_dir: b.is_dir,
            });
        } else if !in_local && in_remote && !read_only {
            actions.push(SyncAction::DeleteRemote {
                path: b.path.clone(),
                is_dir: b.is_dir,
            });
        }
    }

    sort_actions(&mut actions);
    actions
}

/// §4.4 "Action ordering rule": CreateDirectory (top-down by depth), then
/// Download, then Upload (bottom-up), then DeleteRemote (children before
/// parents), then DeleteLocal (children before parents).
fn sort_actions(actions: &mut [SyncAction]) {
    actions.sort_by(|a, b| {
        let by_rank = a.order_rank().cmp(&b.order_rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        let depth_a = depth(a.path());
        let depth_b = depth(b.path());
        match a {
            SyncAction::CreateDirectory { .. } => depth_a.cmp(&depth_b),
            SyncAction::Upload { .. } | SyncAction::DeleteRemote { .. } | SyncAction::DeleteLocal { .. } => {
                depth_b.cmp(&depth_a)
            }
            _ => Ordering::Equal,
        }
    });
}

fn depth(path: &str) -> usize {
    path.trim_matches('/').matches('/').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(path: &str, mtime: i64, is_dir: bool) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            object_id: "oid".to_string(),
            mtime,
            size: if is_dir { 0 } else { 10 },
            is_dir,
        }
    }

    fn local(entries: &[(&str, i64, bool)]) -> HashMap<String, LocalEntry> {
        entries
            .iter()
            .map(|(p, m, d)| {
                (
                    p.to_string(),
                    LocalEntry {
                        mtime: *m,
                        is_dir: *d,
                    },
                )
            })
            .collect()
    }

    fn synced(path: &str, mtime: i64, is_dir: bool) -> SyncedFile {
        SyncedFile {
            path: path.to_string(),
            object_id: "oid".to_string(),
            mtime,
            size: 10,
            is_dir,
        }
    }

    #[test]
    fn new_remote_file_is_downloaded() {
        let remote_entries = vec![remote("/a.txt", 100, false)];
        let local_entries = local(&[]);
        let actions = reconcile(&remote_entries, &local_entries, &[], false);
        assert_eq!(actions, vec![SyncAction::Download { path: "/a.txt".into() }]);
    }

    #[test]
    fn newer_local_file_wins_upload_over_download() {
        let remote_entries = vec![remote("/c.txt", 100, false)];
        let local_entries = local(&[("/c.txt", 200, false)]);
        let actions = reconcile(&remote_entries, &local_entries, &[], false);
        assert_eq!(actions, vec![SyncAction::Upload { path: "/c.txt".into() }]);
    }

    #[test]
    fn equal_mtimes_are_no_op() {
        let remote_entries = vec![remote("/a.txt", 100, false)];
        let local_entries = local(&[("/a.txt", 100, false)]);
        let actions = reconcile(&remote_entries, &local_entries, &[], false);
        assert!(actions.is_empty());
    }

    #[test]
    fn new_local_file_is_uploaded() {
        let remote_entries = vec![];
        let local_entries = local(&[("/new.txt", 100, false)]);
        let actions = reconcile(&remote_entries, &local_entries, &[], false);
        assert_eq!(actions, vec![SyncAction::Upload { path: "/new.txt".into() }]);
    }

    #[test]
    fn missing_remote_dir_creates_locally() {
        let remote_entries = vec![remote("/docs", 0, true)];
        let local_entries = local(&[]);
        let actions = reconcile(&remote_entries, &local_entries, &[], false);
        assert_eq!(
            actions,
            vec![SyncAction::CreateDirectory { path: "/docs".into() }]
        );
    }

    #[test]
    fn server_deleted_file_propagates_as_delete_local() {
        let remote_entries = vec![];
        let local_entries = local(&[("/gone.txt", 100, false)]);
        let baseline = vec![synced("/gone.txt", 50, false)];
        let actions = reconcile(&remote_entries, &local_entries, &baseline, false);
        assert_eq!(
            actions,
            vec![SyncAction::DeleteLocal {
                path: "/gone.txt".into(),
                is_dir: false
            }]
        );
    }

    #[test]
    fn local_deleted_file_propagates_as_delete_remote() {
        let remote_entries = vec![remote("/gone.txt", 100, false)];
        let local_entries = local(&[]);
        let baseline = vec![synced("/gone.txt", 50, false)];
        let actions = reconcile(&remote_entries, &local_entries, &baseline, false);
        assert_eq!(
            actions,
            vec![SyncAction::DeleteRemote {
                path: "/gone.txt".into(),
                is_dir: false
            }]
        );
    }

    #[test]
    fn gone_on_both_sides_is_no_op() {
        let baseline = vec![synced("/gone.txt", 50, false)];
        let actions = reconcile(&[], &HashMap::new(), &baseline, false);
        assert!(actions.is_empty());
    }

    #[test]
    fn read_only_library_suppresses_upload_and_delete_remote() {
        let remote_entries = vec![remote("/keep.txt", 100, false)];
        let local_entries = local(&[("/new.txt", 100, false)]);
        let baseline = vec![synced("/keep.txt", 50, false)];
        let actions = reconcile(&remote_entries, &local_entries, &baseline, true);
        assert!(actions.iter().all(|a| !matches!(
            a,
            SyncAction::Upload { .. } | SyncAction::DeleteRemote { .. }
        )));
    }

    #[test]
    fn action_ordering_groups_by_kind() {
        let remote_entries = vec![remote("/dir", 0, true), remote("/down.txt", 100, false)];
        let local_entries = local(&[("/up.txt", 100, false)]);
        let baseline = vec![synced("/del-remote.txt", 50, false)];
        let remote_with_del = {
            let mut r = remote_entries.clone();
            r.push(remote("/del-remote.txt", 50, false));
            r
        };
        let local_missing_for_del = local_entries.clone();
        let actions = reconcile(&remote_with_del, &local_missing_for_del, &baseline, false);
        let ranks: Vec<u8> = actions.iter().map(|a| a.order_rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }
}
