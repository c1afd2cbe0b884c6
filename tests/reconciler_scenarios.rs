use std::collections::HashMap;

use seasync_core::reconciler::{reconcile, SyncAction};
use seasync_core::remote::RemoteEntry;
use seasync_core::scanner::LocalEntry;
use seasync_core::state_store::SyncedFile;

fn remote(path: &str, mtime: i64, is_dir: bool) -> RemoteEntry {
    RemoteEntry {
        path: path.to_string(),
        object_id: "x".to_string(),
        mtime,
        size: if is_dir { 0 } else { 10 },
        is_dir,
    }
}

fn local_map(entries: &[(&str, i64, bool)]) -> HashMap<String, LocalEntry> {
    entries
        .iter()
        .map(|(p, m, d)| (p.to_string(), LocalEntry { mtime: *m, is_dir: *d }))
        .collect()
}

fn baseline_entry(path: &str, mtime: i64, is_dir: bool) -> SyncedFile {
    SyncedFile {
        path: path.to_string(),
        object_id: "x".to_string(),
        mtime,
        size: 10,
        is_dir,
    }
}

#[test]
fn scenario_1_first_run_download() {
    let remote_entries = vec![remote("/docs", 0, true), remote("/docs/a.txt", 100, false)];
    let local_entries = local_map(&[]);
    let actions = reconcile(&remote_entries, &local_entries, &[], false);

    assert_eq!(
        actions,
        vec![
            SyncAction::CreateDirectory { path: "/docs".into() },
            SyncAction::Download { path: "/docs/a.txt".into() },
        ]
    );
}

#[test]
fn scenario_2_local_edit_uploads() {
    let remote_entries = vec![remote("/docs", 0, true), remote("/docs/a.txt", 100, false)];
    let local_entries = local_map(&[("/docs", 0, true), ("/docs/a.txt", 150, false)]);
    let baseline = vec![
        baseline_entry("/docs", 0, true),
        baseline_entry("/docs/a.txt", 100, false),
    ];
    let actions = reconcile(&remote_entries, &local_entries, &baseline, false);

    assert_eq!(actions, vec![SyncAction::Upload { path: "/docs/a.txt".into() }]);
}

#[test]
fn scenario_3_remote_deletion_propagates_to_local() {
    let remote_entries = vec![remote("/docs", 0, true)];
    let local_entries = local_map(&[("/docs", 0, true), ("/docs/a.txt", 100, false)]);
    let baseline = vec![
        baseline_entry("/docs", 0, true),
        baseline_entry("/docs/a.txt", 100, false),
    ];
    let actions = reconcile(&remote_entries, &local_entries, &baseline, false);

    assert_eq!(
        actions,
        vec![SyncAction::DeleteLocal {
            path: "/docs/a.txt".into(),
            is_dir: false
        }]
    );
}

#[test]
fn scenario_4_local_deletion_propagates_to_remote() {
    let remote_entries = vec![remote("/docs", 0, true), remote("/docs/a.txt", 100, false)];
    let local_entries = local_map(&[("/docs", 0, true)]);
    let baseline = vec![
        baseline_entry("/docs", 0, true),
        baseline_entry("/docs/a.txt", 100, false),
    ];
    let actions = reconcile(&remote_entries, &local_entries, &baseline, false);

    assert_eq!(
        actions,
        vec![SyncAction::DeleteRemote {
            path: "/docs/a.txt".into(),
            is_dir: false
        }]
    );
}

#[test]
fn scenario_5_both_sides_new_no_conflict() {
    let remote_entries = vec![remote("/r.txt", 200, false)];
    let local_entries = local_map(&[("/l.txt", 210, false)]);
    let actions = reconcile(&remote_entries, &local_entries, &[], false);

    assert_eq!(actions.len(), 2);
    assert!(actions.contains(&SyncAction::Download { path: "/r.txt".into() }));
    assert!(actions.contains(&SyncAction::Upload { path: "/l.txt".into() }));
}

#[test]
fn scenario_6_concurrent_edit_last_modified_wins() {
    let remote_entries = vec![remote("/c.txt", 300, false)];
    let local_entries = local_map(&[("/c.txt", 305, false)]);
    let actions = reconcile(&remote_entries, &local_entries, &[], false);

    assert_eq!(actions, vec![SyncAction::Upload { path: "/c.txt".into() }]);
}

#[test]
fn invariant_idempotent_cycle_on_matching_mtimes() {
    let remote_entries = vec![remote("/a.txt", 100, false)];
    let local_entries = local_map(&[("/a.txt", 100, false)]);
    let baseline = vec![baseline_entry("/a.txt", 100, false)];
    let actions = reconcile(&remote_entries, &local_entries, &baseline, false);
    assert!(actions.is_empty());
}

#[test]
fn invariant_read_only_library_emits_no_outbound_mutations() {
    let remote_entries = vec![remote("/keep.txt", 100, false)];
    let local_entries = local_map(&[("/new.txt", 100, false), ("/keep.txt", 50, false)]);
    let baseline = vec![baseline_entry("/deleted-locally.txt", 10, false)];
    let remote_with_deleted = {
        let mut r = remote_entries.clone();
        r.push(remote("/deleted-locally.txt", 10, false));
        r
    };
    let actions = reconcile(&remote_with_deleted, &local_entries, &baseline, true);
    assert!(actions
        .iter()
        .all(|a| !matches!(a, SyncAction::Upload { .. } | SyncAction::DeleteRemote { .. })));
}

#[test]
fn invariant_deletion_requires_baseline_presence() {
    // Present only remotely and not in baseline: no deletion, it's simply new.
    let remote_entries = vec![remote("/new-on-remote.txt", 100, false)];
    let local_entries = local_map(&[]);
    let actions = reconcile(&remote_entries, &local_entries, &[], false);
    assert!(actions
        .iter()
        .all(|a| !matches!(a, SyncAction::DeleteLocal { .. } | SyncAction::DeleteRemote { .. })));
}

#[test]
fn boundary_empty_library_produces_zero_actions() {
    let actions = reconcile(&[], &HashMap::new(), &[], false);
    assert!(actions.is_empty());
}
