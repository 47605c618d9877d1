//! Durable storage for the download cache index.

use crate::cache::CacheEntry;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS cache_entries (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    artist TEXT NOT NULL,
    album TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    local_path TEXT NOT NULL,
    source TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    cover_path TEXT
);
";

/// SQLite table with one row per cached id.
///
/// Every write is committed before the call returns, so an entry written here
/// survives a crash of the process right after.
pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
}

impl IndexStore {
    /// Open the index at `path`, creating it if missing.
    ///
    /// A file that is not a usable database is deleted and replaced by an
    /// empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if even a fresh database cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = match Self::init(path) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(
                    "Cache index at {} is unreadable ({}), starting with an empty cache",
                    path.display(),
                    e
                );
                discard_database_files(path)?;
                Self::init(path)?
            }
        };

        info!("Cache index opened at {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn init(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Catches files that open but are damaged past the header
        conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(conn)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every well-formed row. Malformed rows are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be queried.
    pub fn load_all(&self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, artist, album, duration_ms, local_path, source, cached_at, cover_path
             FROM cache_entries",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                name: row.get(1)?,
                artist: row.get(2)?,
                album: row.get(3)?,
                duration_ms: row.get(4)?,
                local_path: row.get(5)?,
                source: row.get(6)?,
                cached_at: row.get(7)?,
                cover_path: row.get(8)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            match row.map_err(Into::into).and_then(RawRow::into_entry) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping malformed cache index row: {}", e),
            }
        }
        debug!("Loaded {} cache index entries", entries.len());
        Ok(entries)
    }

    /// Insert or replace the row for `entry.id`
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (id, name, artist, album, duration_ms, local_path, source, cached_at, cover_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.name,
                entry.artist,
                entry.album,
                i64::try_from(entry.duration_ms).unwrap_or(i64::MAX),
                entry.local_path.to_string_lossy(),
                entry.source,
                entry.cached_at.to_rfc3339(),
                entry.cover_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            ],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }
}

struct RawRow {
    id: String,
    name: String,
    artist: String,
    album: String,
    duration_ms: i64,
    local_path: String,
    source: String,
    cached_at: String,
    cover_path: Option<String>,
}

impl RawRow {
    fn into_entry(self) -> Result<CacheEntry> {
        let cached_at = DateTime::parse_from_rfc3339(&self.cached_at)
            .map_err(|e| CoreError::MalformedIndexRow {
                message: format!("bad cached_at {:?} for {}: {e}", self.cached_at, self.id),
            })?
            .with_timezone(&Utc);
        Ok(CacheEntry {
            id: self.id,
            name: self.name,
            artist: self.artist,
            album: self.album,
            duration_ms: u64::try_from(self.duration_ms).unwrap_or(0),
            local_path: PathBuf::from(self.local_path),
            source: self.source,
            cached_at,
            cover_path: self.cover_path.map(PathBuf::from),
        })
    }
}

/// Remove the database and its WAL side files, ignoring missing ones.
fn discard_database_files(path: &Path) -> Result<()> {
    let mut side_files = Vec::with_capacity(3);
    side_files.push(path.to_path_buf());
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        side_files.push(PathBuf::from(name));
    }
    for file in side_files {
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> CacheEntry {
        CacheEntry {
            id: id.to_string(),
            name: "Song".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            duration_ms: 180_000,
            local_path: PathBuf::from(format!("/cache/songs/{id}_Artist - Song.mp3")),
            source: "remote".to_string(),
            cached_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            cover_path: Some(PathBuf::from(format!("/cache/covers/{id}.jpg"))),
        }
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache_index.db");

        let store = IndexStore::open(&path).unwrap();
        store.upsert(&entry("1")).unwrap();
        store.upsert(&entry("2")).unwrap();
        store.delete("1").unwrap();
        drop(store);

        let store = IndexStore::open(&path).unwrap();
        let entries = store.load_all().unwrap();
        assert_eq!(entries, vec![entry("2")]);
    }

    #[test]
    fn test_upsert_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("cache_index.db")).unwrap();

        let mut updated = entry("1");
        store.upsert(&updated).unwrap();
        updated.name = "Renamed".to_string();
        store.upsert(&updated).unwrap();

        let entries = store.load_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Renamed");

        store.clear().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_garbage_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache_index.db");
        fs::write(&path, b"{ this is not sqlite ]").unwrap();

        let store = IndexStore::open(&path).unwrap();
        assert!(store.load_all().unwrap().is_empty());
        store.upsert(&entry("1")).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("cache_index.db")).unwrap();
        store.upsert(&entry("good")).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO cache_entries VALUES ('bad', 'n', 'a', 'b', 0, '/x', 's', 'yesterday', NULL)",
                [],
            )
            .unwrap();

        let ids: Vec<String> = store.load_all().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["good".to_string()]);
    }
}
