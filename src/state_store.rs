use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::error::{CoreError, Result, StorageError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_state (
    library_id TEXT PRIMARY KEY,
    last_sync_time INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS synced_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    library_id TEXT NOT NULL,
    path TEXT NOT NULL,
    object_id TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    is_directory INTEGER NOT NULL,
    UNIQUE(library_id, path)
);

CREATE INDEX IF NOT EXISTS idx_synced_files_library ON synced_files(library_id);
CREATE INDEX IF NOT EXISTS idx_synced_files_library_path ON synced_files(library_id, path);
"#;

/// One baseline entry for a `(library_id, path)` pair (§3 `SyncedFile`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedFile {
    pub path: String,
    pub object_id: String,
    pub mtime: i64,
    pub size: i64,
    pub is_dir: bool,
}

/// Per-library baseline plus the last successful sync timestamp (§3 `SyncState`).
#[derive(Debug, Clone)]
pub struct SyncState {
    pub last_sync_time: i64,
    pub files: Vec<SyncedFile>,
}

/// Durable `(library, path) -> descriptor` baseline (C1). Opened once at
/// process start and held for the process lifetime.
pub struct StateStore {
    db_path: PathBuf,
}

impl StateStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Storage(StorageError::StateStore(e.to_string())))?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(StateStore {
            db_path: db_path.to_path_buf(),
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// §4.1: returns `None` iff there are zero baseline rows for the library,
    /// even if a `last_sync_time` row exists (the documented anomaly — see
    /// DESIGN.md Open Question 1 — is preserved deliberately, not fixed).
    pub fn get_state(&self, library_id: &str) -> Result<Option<SyncState>> {
        let conn = self.connect()?;
        let last_sync_time: i64 = conn
            .query_row(
                "SELECT last_sync_time FROM sync_state WHERE library_id = ?1",
                params![library_id],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let mut stmt = conn.prepare(
            "SELECT path, object_id, mtime, size, is_directory FROM synced_files WHERE library_id = ?1",
        )?;
        let rows = stmt.query_map(params![library_id], |row| {
            Ok(SyncedFile {
                path: row.get(0)?,
                object_id: row.get(1)?,
                mtime: row.get(2)?,
                size: row.get(3)?,
                is_dir: row.get::<_, i64>(4)? != 0,
            })
        })?;
        let files: Vec<SyncedFile> = rows.collect::<rusqlite::Result<_>>()?;

        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(SyncState {
            last_sync_time,
            files,
        }))
    }

    /// §4.1: atomically replaces both the timestamp and the full row set for
    /// one library. Implemented as upsert-timestamp, delete-all-rows, then
    /// bulk-insert, inside one transaction (grounded on the teacher's
    /// delete-then-upsert journal-save pattern).
    pub fn save_state(&self, library_id: &str, last_sync_time: i64, files: &[SyncedFile]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO sync_state (library_id, last_sync_time) VALUES (?1, ?2)
             ON CONFLICT(library_id) DO UPDATE SET last_sync_time = excluded.last_sync_time",
            params![library_id, last_sync_time],
        )?;

        tx.execute(
            "DELETE FROM synced_files WHERE library_id = ?1",
            params![library_id],
        )?;

        {
            let mut insert_stmt = tx.prepare(
                "INSERT INTO synced_files (library_id, path, object_id, mtime, size, is_directory)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for f in files {
                insert_stmt.execute(params![
                    library_id,
                    f.path,
                    f.object_id,
                    f.mtime,
                    f.size,
                    f.is_dir as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_file(&self, library_id: &str, path: &str) -> Result<Option<SyncedFile>> {
        let conn = self.connect()?;
        let result = conn.query_row(
            "SELECT path, object_id, mtime, size, is_directory FROM synced_files
             WHERE library_id = ?1 AND path = ?2",
            params![library_id, path],
            |row| {
                Ok(SyncedFile {
                    path: row.get(0)?,
                    object_id: row.get(1)?,
                    mtime: row.get(2)?,
                    size: row.get(3)?,
                    is_dir: row.get::<_, i64>(4)? != 0,
                })
            },
        );
        match result {
            Ok(f) => Ok(Some(f)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_all(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch("DELETE FROM synced_files; DELETE FROM sync_state;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp(name: &str) -> StateStore {
        let tmp = std::env::temp_dir().join(format!("seasync-state-store-{name}"));
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        StateStore::open(&tmp.join("state.sqlite")).unwrap()
    }

    fn sample_file(path: &str, mtime: i64) -> SyncedFile {
        SyncedFile {
            path: path.to_string(),
            object_id: "oid".to_string(),
            mtime,
            size: 10,
            is_dir: false,
        }
    }

    #[test]
    fn get_state_absent_for_unknown_library() {
        let store = open_tmp("absent");
        assert!(store.get_state("lib1").unwrap().is_none());
    }

    #[test]
    fn save_then_get_state_round_trips() {
        let store = open_tmp("roundtrip");
        let files = vec![sample_file("/a.txt", 100), sample_file("/docs/b.txt", 200)];
        store.save_state("lib1", 1000, &files).unwrap();

        let state = store.get_state("lib1").unwrap().unwrap();
        assert_eq!(state.last_sync_time, 1000);
        assert_eq!(state.files.len(), 2);
    }

    #[test]
    fn save_state_replaces_atomically() {
        let store = open_tmp("replace");
        store
            .save_state("lib1", 1000, &[sample_file("/a.txt", 100)])
            .unwrap();
        store
            .save_state("lib1", 2000, &[sample_file("/b.txt", 200)])
            .unwrap();

        let state = store.get_state("lib1").unwrap().unwrap();
        assert_eq!(state.last_sync_time, 2000);
        assert_eq!(state.files.len(), 1);
        assert_eq!(state.files[0].path, "/b.txt");
    }

    #[test]
    fn empty_row_set_is_absent_even_with_timestamp() {
        // DESIGN.md Open Question 1: the anomaly is preserved deliberately.
        let store = open_tmp("empty-anomaly");
        store.save_state("lib1", 1000, &[]).unwrap();
        assert!(store.get_state("lib1").unwrap().is_none());
    }

    #[test]
    fn get_file_point_lookup() {
        let store = open_tmp("point-lookup");
        store
            .save_state("lib1", 1000, &[sample_file("/a.txt", 100)])
            .unwrap();
        assert!(store.get_file("lib1", "/a.txt").unwrap().is_some());
        assert!(store.get_file("lib1", "/missing.txt").unwrap().is_none());
    }

    #[test]
    fn delete_all_wipes_every_library() {
        let store = open_tmp("delete-all");
        store
            .save_state("lib1", 1000, &[sample_file("/a.txt", 100)])
            .unwrap();
        store
            .save_state("lib2", 1000, &[sample_file("/b.txt", 100)])
            .unwrap();
        store.delete_all().unwrap();
        assert!(store.get_state("lib1").unwrap().is_none());
        assert!(store.get_state("lib2").unwrap().is_none());
    }
}
