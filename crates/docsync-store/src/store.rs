use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use docsync::{
    CheckpointError, CheckpointKey, CheckpointStore, RecordError, RefType, VersionRecord,
    VersionRecorder,
};

use crate::schema;

/// SQLite-backed persistence for version records and workflow checkpoints.
pub struct SyncStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SyncStore {
    /// Open a store backed by a file on disk, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
        }
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: rusqlite::Connection) -> Result<Self, StoreError> {
        schema::migrations()
            .to_latest(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for `(source_id, version_folder_name)`.
    pub fn upsert_version(&self, record: &VersionRecord) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO source_versions
                    (source_id, version_folder_name, ref_type, resolved_ref, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    record.source_id,
                    record.version_folder_name,
                    record.ref_type.as_str(),
                    record.resolved_ref,
                    to_sql_secs(record.synced_at),
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// All records, or only those of `source_id`, newest first.
    pub fn versions(&self, source_id: Option<&str>) -> Result<Vec<VersionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT source_id, version_folder_name, ref_type, resolved_ref, synced_at
                 FROM source_versions
                 WHERE ?1 IS NULL OR source_id = ?1
                 ORDER BY synced_at DESC, source_id, version_folder_name",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let records = stmt
            .query_map([source_id], row_to_record)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(records)
    }

    /// Most recent `synced_at` across every source.
    pub fn last_synced_at(&self) -> Result<Option<u64>, StoreError> {
        let latest: Option<i64> = self
            .conn()
            .query_row("SELECT MAX(synced_at) FROM source_versions", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(latest.map(from_sql_secs))
    }

    /// Number of checkpoints held for `run_id`.
    pub fn checkpoint_count(&self, run_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM workflow_checkpoints WHERE run_id = ?1",
                [run_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<VersionRecord> {
    let ref_type: String = row.get(2)?;
    let ref_type = RefType::parse(&ref_type).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "ref_type".into(), rusqlite::types::Type::Text)
    })?;
    let synced_at: i64 = row.get(4)?;

    Ok(VersionRecord {
        source_id: row.get(0)?,
        version_folder_name: row.get(1)?,
        ref_type,
        resolved_ref: row.get(3)?,
        synced_at: from_sql_secs(synced_at),
    })
}

fn to_sql_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn from_sql_secs(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or_default()
}

impl VersionRecorder for SyncStore {
    fn upsert(&self, record: &VersionRecord) -> Result<(), RecordError> {
        self.upsert_version(record)
            .map_err(|e| RecordError(e.to_string()))
    }
}

impl CheckpointStore for SyncStore {
    fn load(&self, key: &CheckpointKey) -> Result<Option<String>, CheckpointError> {
        let result = self.conn().query_row(
            "SELECT output FROM workflow_checkpoints
             WHERE run_id = ?1 AND step_id = ?2 AND input_hash = ?3",
            [&key.run_id, &key.step_id, &key.input_hash],
            |row| row.get(0),
        );
        match result {
            Ok(output) => Ok(Some(output)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CheckpointError(e.to_string())),
        }
    }

    fn save(&self, key: &CheckpointKey, output: &str) -> Result<(), CheckpointError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO workflow_checkpoints
                    (run_id, step_id, input_hash, output, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    key.run_id,
                    key.step_id,
                    key.input_hash,
                    output,
                    to_sql_secs(docsync::sync::epoch_secs()),
                ],
            )
            .map_err(|e| CheckpointError(e.to_string()))?;
        Ok(())
    }

    fn clear_run(&self, run_id: &str) -> Result<(), CheckpointError> {
        let removed = self
            .conn()
            .execute("DELETE FROM workflow_checkpoints WHERE run_id = ?1", [run_id])
            .map_err(|e| CheckpointError(e.to_string()))?;
        tracing::debug!(run = run_id, removed, "cleared checkpoints");
        Ok(())
    }
}

/// Errors specific to store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),
}
