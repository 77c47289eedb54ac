//! Directory Cache (§6 "Cache API"): a local index of remote directory
//! listings so a collaborator can search and browse the remote tree without
//! a round trip per request. Built on the same `rusqlite` store-behind-a-
//! `Mutex` pattern as the Job Store, with its own single-table migration.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::transfer::{Entry, EntryKind, RemoteClient};

struct Migration {
    version: i64,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: "
        CREATE TABLE cache_entries (
            path TEXT PRIMARY KEY,
            parent_dir TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            size INTEGER NOT NULL,
            modified_at TEXT,
            is_hidden INTEGER NOT NULL
        );
        CREATE INDEX idx_cache_parent ON cache_entries(parent_dir);
        CREATE TABLE cache_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
    ",
}];

fn run_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)", [])?;
    let current: i64 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute("DELETE FROM schema_version", [])?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", params![migration.version])?;
        tx.commit()?;
        tracing::info!(version = migration.version, "applied cache migration");
    }
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entry_count: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FolderStats {
    pub file_count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub video_only: bool,
    pub limit: Option<usize>,
}

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "webm", "m4v", "ts"];

fn is_video(name: &str) -> bool {
    name.rsplit_once('.').map(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())).unwrap_or(false)
}

pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    pub fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        run_migrations(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn set_synced_now(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO cache_meta (key, value) VALUES ('last_synced_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_stats(&self) -> anyhow::Result<CacheStats> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        let entry_count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;
        let last_synced_at: Option<String> = conn
            .query_row("SELECT value FROM cache_meta WHERE key = 'last_synced_at'", [], |r| r.get(0))
            .optional()?;
        let last_synced_at = last_synced_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc));
        Ok(CacheStats { entry_count, last_synced_at })
    }

    /// Whether the cache is stale enough that a collaborator should trigger
    /// `fullIndex`/`sync` before relying on it.
    pub fn needs_refresh(&self, max_age_hours: i64) -> anyhow::Result<bool> {
        let stats = self.get_stats()?;
        Ok(match stats.last_synced_at {
            None => true,
            Some(last) => Utc::now() - last > chrono::Duration::hours(max_age_hours),
        })
    }

    /// Walks `root_path` recursively over `client` and replaces every entry
    /// under it with a fresh listing.
    pub async fn full_index(&self, client: &dyn RemoteClient, root_path: &str) -> anyhow::Result<usize> {
        self.invalidate(root_path)?;
        let mut indexed = 0;
        let mut stack = vec![root_path.to_string()];
        while let Some(dir) = stack.pop() {
            let entries = client.list(&dir).await?;
            for entry in &entries {
                if entry.kind == EntryKind::Directory {
                    stack.push(entry.path.clone());
                }
            }
            self.upsert_entries(&dir, &entries)?;
            indexed += entries.len();
        }
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        self.set_synced_now(&conn)?;
        Ok(indexed)
    }

    /// Re-lists a single directory, leaving the rest of the cache untouched.
    pub async fn sync(&self, client: &dyn RemoteClient, dir_path: &str) -> anyhow::Result<usize> {
        let entries = client.list(dir_path).await?;
        self.upsert_entries(dir_path, &entries)?;
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        self.set_synced_now(&conn)?;
        Ok(entries.len())
    }

    fn upsert_entries(&self, dir_path: &str, entries: &[Entry]) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        conn.execute("DELETE FROM cache_entries WHERE parent_dir = ?1", params![dir_path])?;
        for entry in entries {
            conn.execute(
                "INSERT INTO cache_entries (path, parent_dir, name, kind, size, modified_at, is_hidden)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(path) DO UPDATE SET
                   parent_dir = excluded.parent_dir, name = excluded.name, kind = excluded.kind,
                   size = excluded.size, modified_at = excluded.modified_at, is_hidden = excluded.is_hidden",
                params![
                    entry.path,
                    dir_path,
                    entry.name,
                    kind_label(entry.kind),
                    entry.size,
                    entry.modified_at.map(|d| d.to_rfc3339()),
                    entry.is_hidden as i64,
                ],
            )?;
        }
        Ok(())
    }

    pub fn get_directory(&self, dir_path: &str) -> anyhow::Result<Vec<Entry>> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT path, name, kind, size, modified_at, is_hidden FROM cache_entries WHERE parent_dir = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![dir_path], row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_folder_stats(&self, folder_path: &str) -> anyhow::Result<FolderStats> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        let like_pattern = format!("{folder_path}%");
        let (file_count, total_size): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM cache_entries
             WHERE kind = 'file' AND (parent_dir = ?1 OR parent_dir LIKE ?2)",
            params![folder_path, like_pattern],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(FolderStats { file_count: file_count as u64, total_size: total_size as u64 })
    }

    pub fn search(&self, query: &str, options: SearchOptions) -> anyhow::Result<Vec<Entry>> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        let pattern = format!("%{}%", query.to_ascii_lowercase());
        let mut stmt = conn.prepare(
            "SELECT path, name, kind, size, modified_at, is_hidden FROM cache_entries
             WHERE LOWER(name) LIKE ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![pattern], row_to_entry)?;
        let mut results = Vec::new();
        for row in rows {
            let entry = row?;
            if options.video_only && !is_video(&entry.name) {
                continue;
            }
            results.push(entry);
            if options.limit.is_some_and(|limit| results.len() >= limit) {
                break;
            }
        }
        Ok(results)
    }

    /// Drops every cached entry at or beneath `item_path`.
    pub fn invalidate(&self, item_path: &str) -> anyhow::Result<usize> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        let like_pattern = format!("{item_path}%");
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE path = ?1 OR parent_dir = ?1 OR parent_dir LIKE ?2",
            params![item_path, like_pattern],
        )?;
        Ok(removed)
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("cache store mutex poisoned");
        conn.execute("DELETE FROM cache_entries", [])?;
        conn.execute("DELETE FROM cache_meta", [])?;
        Ok(())
    }
}

fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Directory => "directory",
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    let kind: String = row.get(2)?;
    let modified_at: Option<String> = row.get(4)?;
    let is_hidden: i64 = row.get(5)?;
    Ok(Entry {
        path: row.get(0)?,
        name: row.get(1)?,
        kind: if kind == "directory" { EntryKind::Directory } else { EntryKind::File },
        size: row.get::<_, i64>(3)? as u64,
        modified_at: modified_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        is_hidden: is_hidden != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::MockClient;

    async fn seeded_client() -> MockClient {
        let client = MockClient::new();
        client.seed_file("/videos/movie.mkv", b"1234567890").await;
        client.seed_file("/videos/notes.txt", b"hi").await;
        client
    }

    #[tokio::test]
    async fn full_index_then_get_directory_lists_children() {
        let cache = CacheStore::open_in_memory().unwrap();
        let client = seeded_client().await;

        cache.full_index(&client, "/videos").await.unwrap();
        let entries = cache.get_directory("/videos").unwrap();

        assert_eq!(entries.len(), 2);
        assert!(!cache.needs_refresh(24).unwrap());
    }

    #[tokio::test]
    async fn search_can_filter_to_video_files_only() {
        let cache = CacheStore::open_in_memory().unwrap();
        let client = seeded_client().await;
        cache.full_index(&client, "/videos").await.unwrap();

        let all = cache.search("", SearchOptions::default()).unwrap();
        let videos = cache.search("", SearchOptions { video_only: true, limit: None }).unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].name, "movie.mkv");
    }

    #[tokio::test]
    async fn invalidate_removes_entries_under_a_path() {
        let cache = CacheStore::open_in_memory().unwrap();
        let client = seeded_client().await;
        cache.full_index(&client, "/videos").await.unwrap();

        let removed = cache.invalidate("/videos").unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get_directory("/videos").unwrap().is_empty());
    }

    #[test]
    fn empty_cache_always_needs_refresh() {
        let cache = CacheStore::open_in_memory().unwrap();
        assert!(cache.needs_refresh(24).unwrap());
    }

    #[tokio::test]
    async fn get_folder_stats_sums_file_sizes_under_the_folder() {
        let cache = CacheStore::open_in_memory().unwrap();
        let client = seeded_client().await;
        cache.full_index(&client, "/videos").await.unwrap();

        let stats = cache.get_folder_stats("/videos").unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_size, 12);
    }
}
