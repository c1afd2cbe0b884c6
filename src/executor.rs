use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, CoreError, Result};
use crate::reconciler::SyncAction;
use crate::remote::RemoteClient;

/// One action's outcome, captured rather than propagated (§4.5 "Per-action
/// failure"): a single failing action never aborts the rest of the cycle.
#[derive(Debug, Clone)]
pub struct ActionFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<ActionFailure>,
}

/// Executes an ordered action list against the Remote Client and local
/// filesystem (C5, §4.5), one action at a time, continuing past failures.
pub async fn execute_actions(
    client: &RemoteClient,
    library_id: &str,
    local_root: &Path,
    actions: &[SyncAction],
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    for action in actions {
        let path = action.path().to_string();
        match execute_one(client, library_id, local_root, action).await {
            Ok(()) => report.succeeded.push(path),
            Err(e) => report.failed.push(ActionFailure {
                path,
                message: e.to_string(),
            }),
        }
    }
    report
}

async fn execute_one(
    client: &RemoteClient,
    library_id: &str,
    local_root: &Path,
    action: &SyncAction,
) -> Result<()> {
    match action {
        SyncAction::CreateDirectory { path } => {
            let local = to_local_path(local_root, path);
            tokio::fs::create_dir_all(local).await?;
            Ok(())
        }
        SyncAction::Download { path } => download_one(client, library_id, local_root, path).await,
        SyncAction::Upload { path } => upload_one(client, library_id, local_root, path).await,
        SyncAction::DeleteLocal { path, is_dir } => delete_local_one(local_root, path, *is_dir).await,
        SyncAction::DeleteRemote { path, is_dir } => {
            if *is_dir {
                client.delete_dir(library_id, path).await
            } else {
                client.delete_file(library_id, path).await
            }
        }
        SyncAction::Conflict { .. } => Ok(()),
    }
}

async fn download_one(client: &RemoteClient, library_id: &str, local_root: &Path, path: &str) -> Result<()> {
    let link = client.get_download_link(library_id, path).await?;
    let mut resp = client.download(&link).await?;

    let target = to_local_path(local_root, path);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_name = format!(
        "{}.seasync-tmp",
        target.file_name().and_then(|n| n.to_str()).unwrap_or("download")
    );
    let tmp_path = target.with_file_name(tmp_name);

    {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        while let Some(chunk) = resp.chunk().await.map_err(CoreError::from)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
    }

    tokio::fs::rename(&tmp_path, &target).await?;
    Ok(())
}

async fn upload_one(client: &RemoteClient, library_id: &str, local_root: &Path, path: &str) -> Result<()> {
    let local_path = to_local_path(local_root, path);
    let bytes = tokio::fs::read(&local_path).await?;

    let (parent_dir, filename) = split_parent(path);

    let link = match client.get_upload_link(library_id, &parent_dir).await {
        Ok(link) => link,
        Err(CoreError::Api(ApiError::NotFound)) => {
            ensure_remote_parent_chain(client, library_id, &parent_dir).await;
            client.get_upload_link(library_id, &parent_dir).await?
        }
        Err(e) => return Err(e),
    };

    client.upload(&link, &parent_dir, &filename, bytes).await
}

/// Best-effort creation of every ancestor of `parent_dir`, shallowest first;
/// a directory that already exists is tolerated since only the subsequent
/// upload-link retry determines success.
async fn ensure_remote_parent_chain(client: &RemoteClient, library_id: &str, parent_dir: &str) {
    let segments: Vec<&str> = parent_dir.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let mut cumulative = String::new();
    for segment in segments {
        cumulative.push('/');
        cumulative.push_str(segment);
        let _ = client.mkdir(library_id, &cumulative).await;
    }
}

async fn delete_local_one(local_root: &Path, path: &str, is_dir: bool) -> Result<()> {
    let target = to_local_path(local_root, path);
    let result = if is_dir {
        tokio::fs::remove_dir_all(&target).await
    } else {
        tokio::fs::remove_file(&target).await
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::from(e)),
    }
}

fn to_local_path(root: &Path, scan_path: &str) -> PathBuf {
    root.join(scan_path.trim_start_matches('/'))
}

fn split_parent(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) => (format!("/{parent}"), name.to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_local_path_strips_leading_slash() {
        let root = Path::new("/sync");
        assert_eq!(to_local_path(root, "/docs/a.txt"), PathBuf::from("/sync/docs/a.txt"));
    }

    #[test]
    fn split_parent_handles_top_level_file() {
        assert_eq!(split_parent("/a.txt"), ("/".to_string(), "a.txt".to_string()));
    }

    #[test]
    fn split_parent_handles_nested_file() {
        assert_eq!(
            split_parent("/docs/sub/a.txt"),
            ("/docs/sub".to_string(), "a.txt".to_string())
        );
    }

    #[tokio::test]
    async fn delete_local_missing_file_is_not_an_error() {
        let tmp = std::env::temp_dir().join("seasync-executor-delete-missing");
        let _ = tokio::fs::remove_dir_all(&tmp).await;
        tokio::fs::create_dir_all(&tmp).await.unwrap();
        let result = delete_local_one(&tmp, "/does-not-exist.txt", false).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn create_directory_action_creates_nested_dirs() {
        let tmp = std::env::temp_dir().join("seasync-executor-mkdir");
        let _ = tokio::fs::remove_dir_all(&tmp).await;
        tokio::fs::create_dir_all(&tmp).await.unwrap();

        let target = to_local_path(&tmp, "/a/b/c");
        tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();
        tokio::fs::create_dir_all(&target).await.unwrap();
        assert!(target.is_dir());
    }
}
