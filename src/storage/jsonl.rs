//! # JSON Lines Store
//!
//! File-backed [`RelationalStore`] writing one JSON object per statement.
//!
//! Files are named `telemetry_<UTC timestamp>_<sequence>.jsonl` under the
//! log directory. A new file is started after `max_records_per_file` lines;
//! only the newest `max_files_to_keep` files are retained.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{RelationalStore, Statement, StatementKind, Table};
use crate::config::StorageConfig;
use crate::error::StoreError;

const FILE_PREFIX: &str = "telemetry_";
const FILE_SUFFIX: &str = ".jsonl";

/// One line in the log
#[derive(Debug, Serialize)]
struct LogLine<'a> {
    recorded_at: DateTime<Utc>,
    statement: StatementKind,
    table: Table,
    row: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<&'a str>,
}

/// Rotating JSON lines store
pub struct JsonlStore {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    files_created: u64,
    include_sql: bool,
    closed: bool,
}

impl std::fmt::Debug for JsonlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStore")
            .field("dir", &self.dir)
            .field("current_path", &self.current_path)
            .field("records_in_file", &self.records_in_file)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl JsonlStore {
    /// Create the store, making `dir` if needed
    ///
    /// No file is created until the first statement is executed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(
        dir: impl AsRef<Path>,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Storing telemetry as JSON lines under {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            files_created: 0,
            include_sql: false,
            closed: false,
        })
    }

    /// Open using the `[storage]` section
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::open(&config.log_dir, config.max_records_per_file, config.max_files_to_keep)
    }

    /// Also record the SQL text of each statement
    pub fn with_sql(mut self, include_sql: bool) -> Self {
        self.include_sql = include_sql;
        self
    }

    /// File currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    fn rotate(&mut self) -> Result<(), StoreError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.files_created += 1;
        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            self.files_created,
            FILE_SUFFIX
        );
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;
        self.prune()
    }

    /// Remove the oldest files beyond `max_files_to_keep`
    fn prune(&self) -> Result<(), StoreError> {
        let mut files = log_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            debug!("Removing old telemetry file {}", path.display());
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

/// Telemetry files in `dir`, unsorted
pub fn log_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
            .unwrap_or(false);
        if is_log {
            files.push(path);
        }
    }
    Ok(files)
}

impl RelationalStore for JsonlStore {
    fn execute(&mut self, statement: &Statement) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if statement.values.len() != statement.table.columns().len() {
            return Err(StoreError::Execute {
                table: statement.table.to_string(),
                reason: format!(
                    "{} values for {} columns",
                    statement.values.len(),
                    statement.table.columns().len()
                ),
            });
        }

        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let sql = self.include_sql.then(|| statement.to_sql());
        let row = statement
            .row()
            .map(|(column, value)| serde_json::to_value(value).map(|v| (column.to_string(), v)))
            .collect::<Result<Map<String, Value>, serde_json::Error>>()?;
        let line = serde_json::to_string(&LogLine {
            recorded_at: Utc::now(),
            statement: statement.kind,
            table: statement.table,
            row,
            sql: sql.as_deref(),
        })?;

        let writer = self.writer.as_mut().ok_or(StoreError::Closed)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.records_in_file += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        info!("Telemetry store closed");
        Ok(())
    }
}

impl Drop for JsonlStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close telemetry store: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqlValue;
    use tempfile::TempDir;

    fn heart_row(bpm: u8) -> Statement {
        Statement::insert(
            Table::SensorHeart,
            vec![1u64.into(), 1000i64.into(), 0i64.into(), bpm.into()],
        )
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlStore::open(dir.path(), 100, 5).unwrap();

        store.execute(&heart_row(72)).unwrap();
        store
            .execute(&Statement::upsert(
                Table::MonitoringNodes,
                vec![1u64.into(), 0x10u16.into(), "Undefined".into()],
            ))
            .unwrap();
        let path = store.current_path().unwrap().to_path_buf();
        store.close().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["table"], "sensorHeart");
        assert_eq!(lines[0]["statement"], "insert");
        assert_eq!(lines[0]["row"]["bpm"], 72);
        assert_eq!(lines[0]["row"]["offset_ms"], 0);
        assert_eq!(lines[1]["statement"], "upsert");
        assert_eq!(lines[1]["row"]["identifier"], "Undefined");
        assert!(lines[0].get("sql").is_none());
    }

    #[test]
    fn test_rows_reach_disk_before_close() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlStore::open(dir.path(), 100, 5).unwrap();

        store.execute(&heart_row(72)).unwrap();
        store.execute(&heart_row(74)).unwrap();
        let path = store.current_path().unwrap().to_path_buf();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["row"]["bpm"], 74);

        // Skipping Drop must not lose rows already executed
        std::mem::forget(store);
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[test]
    fn test_includes_sql_when_requested() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlStore::open(dir.path(), 100, 5).unwrap().with_sql(true);

        store.execute(&heart_row(60)).unwrap();
        let path = store.current_path().unwrap().to_path_buf();
        store.close().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines[0]["sql"], "INSERT INTO sensorHeart VALUES(1, 1000, 0, 60)");
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlStore::open(dir.path(), 2, 2).unwrap();

        for bpm in 0..7 {
            store.execute(&heart_row(bpm)).unwrap();
        }
        let current = store.current_path().unwrap().to_path_buf();
        store.close().unwrap();

        // 7 rows at 2 per file -> 4 files created, newest 2 kept
        let mut files = log_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1], current);
        assert_eq!(read_lines(&current).len(), 1);
        assert_eq!(read_lines(&files[0]).len(), 2);
    }

    #[test]
    fn test_execute_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlStore::open(dir.path(), 10, 1).unwrap();

        store.close().unwrap();
        assert!(store.close().is_ok());
        assert!(matches!(store.execute(&heart_row(1)), Err(StoreError::Closed)));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlStore::open(dir.path(), 10, 1).unwrap();

        let result = store.execute(&Statement::insert(Table::SensorHeart, vec![SqlValue::Integer(1)]));
        assert!(matches!(result, Err(StoreError::Execute { .. })));
        assert!(store.current_path().is_none());
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        let config = StorageConfig {
            log_dir: nested.to_string_lossy().into_owned(),
            max_records_per_file: 10,
            max_files_to_keep: 3,
        };
        JsonlStore::from_config(&config).unwrap();
        assert!(nested.is_dir());
    }
}
