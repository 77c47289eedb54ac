//! Job Store (§4.2): a durable relational store over `rusqlite`, opened
//! once behind a `Mutex<Connection>` the same way the reference server
//! persistence opens its connection, generalized from scattered
//! `CREATE TABLE IF NOT EXISTS` calls into an explicit, numbered migration
//! runner with a `schema_version` table.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::{AudioPolicy, CodecFamily, Job, JobPaths, JobProgress, JobStatus, OutcomeFacts, SourceFacts, Timing};
use crate::error::ErrorKind;

struct Migration {
    version: i64,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        up: "
            CREATE TABLE jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_path TEXT NOT NULL UNIQUE,
                target_family TEXT NOT NULL,
                status_json TEXT NOT NULL,
                source_json TEXT NOT NULL,
                progress_json TEXT NOT NULL,
                outcome_json TEXT NOT NULL,
                timing_json TEXT NOT NULL,
                paths_json TEXT NOT NULL
            );
            CREATE INDEX idx_jobs_remote_path ON jobs(remote_path);
        ",
    },
];

/// Runs every migration whose version exceeds the store's current
/// `schema_version`, each inside its own transaction. A failed `up` rolls
/// back and the caller gets a fatal error before any job is admitted (§4.2
/// "no partial migration is ever committed").
fn run_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
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
        tracing::info!(version = migration.version, "applied job store migration");
    }
    Ok(())
}

pub struct JobStore {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFilter {
    pub terminal: Option<bool>,
}

impl JobStore {
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

    /// Admits a new job, returning its assigned id. `remote_path` is the
    /// true uniqueness key (§3): a duplicate admission is rejected by the
    /// `UNIQUE` constraint and surfaced as `ErrorKind::InvalidConfig`.
    pub fn insert(&self, mut job: Job) -> anyhow::Result<i64> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let result = conn.execute(
            "INSERT INTO jobs (remote_path, target_family, status_json, source_json, progress_json, outcome_json, timing_json, paths_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.remote_path,
                serde_json::to_string(&job.target_family)?,
                serde_json::to_string(&job.status)?,
                serde_json::to_string(&job.source)?,
                serde_json::to_string(&job.progress)?,
                serde_json::to_string(&job.outcome)?,
                serde_json::to_string(&job.timing)?,
                serde_json::to_string(&job.paths)?,
            ],
        );
        match result {
            Ok(_) => {
                job.id = conn.last_insert_rowid();
                Ok(job.id)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(crate::error::err(ErrorKind::InvalidConfig, format!("job already admitted for {}", job.remote_path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, id: i64) -> anyhow::Result<Option<Job>> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        conn.query_row(
            "SELECT id, remote_path, target_family, status_json, source_json, progress_json, outcome_json, timing_json, paths_json
             FROM jobs WHERE id = ?1",
            params![id],
            row_to_job,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_by_remote_path(&self, remote_path: &str) -> anyhow::Result<Option<Job>> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        conn.query_row(
            "SELECT id, remote_path, target_family, status_json, source_json, progress_json, outcome_json, timing_json, paths_json
             FROM jobs WHERE remote_path = ?1",
            params![remote_path],
            row_to_job,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list(&self, filter: StatusFilter) -> anyhow::Result<Vec<Job>> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, remote_path, target_family, status_json, source_json, progress_json, outcome_json, timing_json, paths_json
             FROM jobs ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_job)?;
        let mut jobs = Vec::new();
        for row in rows {
            let job = row?;
            match filter.terminal {
                Some(want_terminal) if job.status.is_terminal() != want_terminal => continue,
                _ => jobs.push(job),
            }
        }
        Ok(jobs)
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0)).map_err(Into::into)
    }

    /// Replaces the whole job (status, progress, outcome, timing, paths) in
    /// one statement; callers read-modify-write through `get`/`update` since
    /// there is no partial-field patch API at this layer (§4.2 `update(id,
    /// patch)` is satisfied by the caller building the patched `Job`).
    pub fn update(&self, job: &Job) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let changed = conn.execute(
            "UPDATE jobs SET status_json = ?1, source_json = ?2, progress_json = ?3, outcome_json = ?4, timing_json = ?5, paths_json = ?6
             WHERE id = ?7",
            params![
                serde_json::to_string(&job.status)?,
                serde_json::to_string(&job.source)?,
                serde_json::to_string(&job.progress)?,
                serde_json::to_string(&job.outcome)?,
                serde_json::to_string(&job.timing)?,
                serde_json::to_string(&job.paths)?,
                job.id,
            ],
        )?;
        if changed == 0 {
            anyhow::bail!("update() called for unknown job id {}", job.id);
        }
        Ok(())
    }

    pub fn delete(&self, id: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// `clear()` (§6 Job API): drops every job regardless of state. Intended
    /// for an operator resetting the queue, not normal retention cleanup.
    pub fn clear_all(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        Ok(conn.execute("DELETE FROM jobs", [])?)
    }

    /// `getStats()` (§6 Job API): job counts grouped by status label.
    pub fn stats_by_status(&self) -> anyhow::Result<std::collections::HashMap<String, i64>> {
        let jobs = self.list(StatusFilter::default())?;
        let mut counts = std::collections::HashMap::new();
        for job in jobs {
            *counts.entry(job.status.label().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Purges terminal jobs older than `days` (§4.1 `advanced.cleanup_old_jobs_days`).
    pub fn cleanup_older_than(&self, days: u32) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timing_json FROM jobs",
        )?;
        let mut to_delete = Vec::new();
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let timing_json: String = row.get(1)?;
            Ok((id, timing_json))
        })?;
        for row in rows {
            let (id, timing_json) = row?;
            let timing: Timing = serde_json::from_str(&timing_json)?;
            if timing.finished_at.is_some_and(|t| t < cutoff) {
                to_delete.push(id);
            }
        }
        drop(stmt);
        for id in &to_delete {
            conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        }
        Ok(to_delete.len())
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let id: i64 = row.get(0)?;
    let remote_path: String = row.get(1)?;
    let target_family_json: String = row.get(2)?;
    let status_json: String = row.get(3)?;
    let source_json: String = row.get(4)?;
    let progress_json: String = row.get(5)?;
    let outcome_json: String = row.get(6)?;
    let timing_json: String = row.get(7)?;
    let paths_json: String = row.get(8)?;

    let parse = |col: usize, label: &'static str, json: &str| -> rusqlite::Result<serde_json::Value> {
        serde_json::from_str(json).map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, format!("{label}: {e}").into()))
    };

    let target_family: CodecFamily = serde_json::from_value(parse(2, "target_family", &target_family_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into()))?;
    let status: JobStatus = serde_json::from_value(parse(3, "status", &status_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into()))?;
    let source: SourceFacts = serde_json::from_value(parse(4, "source", &source_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into()))?;
    let progress: JobProgress = serde_json::from_value(parse(5, "progress", &progress_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into()))?;
    let outcome: OutcomeFacts = serde_json::from_value(parse(6, "outcome", &outcome_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into()))?;
    let timing: Timing = serde_json::from_value(parse(7, "timing", &timing_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, e.into()))?;
    let paths: JobPaths = serde_json::from_value(parse(8, "paths", &paths_json)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, e.into()))?;

    Ok(Job { id, remote_path, source, status, progress, outcome, timing, paths, target_family })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(remote_path: &str) -> Job {
        Job::new(
            0,
            remote_path.to_string(),
            SourceFacts {
                size: 1_000_000,
                codec_before: "h264".into(),
                container: "mkv".into(),
                resolution: Some((1920, 1080)),
                duration: 120.0,
                bitrate: Some(4_000_000),
                audio: AudioPolicy { track_count: 1, codec: Some("aac".into()) },
                subtitle_track_count: 0,
            },
            CodecFamily::Hevc,
        )
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = JobStore::open_in_memory().unwrap();
        let id = store.insert(sample_job("/videos/a.mkv")).unwrap();
        let fetched = store.get(id).unwrap().unwrap();
        assert_eq!(fetched.remote_path, "/videos/a.mkv");
        assert_eq!(fetched.status, JobStatus::Waiting);
    }

    #[test]
    fn duplicate_remote_path_is_rejected() {
        let store = JobStore::open_in_memory().unwrap();
        store.insert(sample_job("/videos/a.mkv")).unwrap();
        let err = store.insert(sample_job("/videos/a.mkv")).unwrap_err();
        assert_eq!(crate::error::classify(&err), ErrorKind::InvalidConfig);
    }

    #[test]
    fn update_persists_status_change() {
        let store = JobStore::open_in_memory().unwrap();
        let id = store.insert(sample_job("/videos/a.mkv")).unwrap();
        let mut job = store.get(id).unwrap().unwrap();
        job.status = JobStatus::Downloading;
        store.update(&job).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().status, JobStatus::Downloading);
    }

    #[test]
    fn list_filters_by_terminal() {
        let store = JobStore::open_in_memory().unwrap();
        let id = store.insert(sample_job("/videos/a.mkv")).unwrap();
        store.insert(sample_job("/videos/b.mkv")).unwrap();
        let mut job = store.get(id).unwrap().unwrap();
        job.status = JobStatus::Completed;
        store.update(&job).unwrap();

        let terminal = store.list(StatusFilter { terminal: Some(true) }).unwrap();
        assert_eq!(terminal.len(), 1);
        let active = store.list(StatusFilter { terminal: Some(false) }).unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn cleanup_removes_only_old_finished_jobs() {
        let store = JobStore::open_in_memory().unwrap();
        let id = store.insert(sample_job("/videos/a.mkv")).unwrap();
        let mut job = store.get(id).unwrap().unwrap();
        job.status = JobStatus::Completed;
        job.timing.finished_at = Some(Utc::now() - chrono::Duration::days(40));
        store.update(&job).unwrap();

        store.insert(sample_job("/videos/b.mkv")).unwrap();

        let removed = store.cleanup_older_than(30).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
