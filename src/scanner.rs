use std::collections::HashMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// One entry produced by a local scan (§3 `LocalEntry`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEntry {
    pub mtime: i64,
    pub is_dir: bool,
}

/// Walks a local subtree producing `(relative path, mtime, is_dir)` entries
/// (C2, §4.2), skipping hidden files and following-but-not-recursing symlinks.
pub fn scan(root: &Path) -> Result<HashMap<String, LocalEntry>> {
    let mut out = HashMap::new();

    if !root.exists() {
        return Ok(out);
    }

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref()))
        .filter_map(|e| e.ok())
    {
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();
        let rel = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let key = to_scan_key(rel);
        if has_hidden_segment(&key) {
            continue;
        }

        let ftype = entry.file_type();
        // Symlinks are followed for mtime but never recursed into as a
        // directory: WalkDir doesn't descend into them (follow_links is
        // false), and they're reported here as files regardless of what
        // they point to.
        let is_symlink = ftype.is_symlink();
        let is_dir = ftype.is_dir();

        let meta = if is_symlink {
            match std::fs::metadata(path) {
                Ok(m) => m,
                Err(_) => continue,
            }
        } else {
            match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            }
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        out.insert(
            key,
            LocalEntry {
                mtime,
                is_dir: is_dir && !is_symlink,
            },
        );
    }

    Ok(out)
}

fn to_scan_key(rel: &Path) -> String {
    let mut out = String::from("/");
    out.push_str(&rel.to_string_lossy().replace('\\', "/"));
    out
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn has_hidden_segment(key: &str) -> bool {
    key.split('/').any(|seg| !seg.is_empty() && seg.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let tmp = std::env::temp_dir().join(format!("seasync-scanner-{name}"));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    #[test]
    fn absent_root_returns_empty_map() {
        let root = std::env::temp_dir().join("seasync-scanner-does-not-exist");
        let _ = fs::remove_dir_all(&root);
        let result = scan(&root).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn scan_collects_files_and_directories() {
        let root = tmp_dir("basic");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.txt"), b"hello").unwrap();

        let result = scan(&root).unwrap();
        assert!(result.contains_key("/docs"));
        assert!(result["/docs"].is_dir);
        assert!(result.contains_key("/docs/a.txt"));
        assert!(!result["/docs/a.txt"].is_dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_treated_as_file_not_recursed() {
        let root = tmp_dir("symlink");
        fs::create_dir_all(root.join("real")).unwrap();
        fs::write(root.join("real/inner.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let result = scan(&root).unwrap();
        assert!(result.contains_key("/link"));
        assert!(!result["/link"].is_dir);
        assert!(!result.contains_key("/link/inner.txt"));
    }

    #[test]
    fn hidden_entries_are_excluded() {
        let root = tmp_dir("hidden");
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/config"), b"x").unwrap();
        fs::write(root.join(".hidden.txt"), b"x").unwrap();
        fs::create_dir_all(root.join("visible")).unwrap();
        fs::write(root.join("visible/.also_hidden"), b"x").unwrap();

        let result = scan(&root).unwrap();
        assert!(!result.keys().any(|k| k.contains(".git")));
        assert!(!result.contains_key("/.hidden.txt"));
        assert!(!result.contains_key("/visible/.also_hidden"));
        assert!(result.contains_key("/visible"));
    }
}
