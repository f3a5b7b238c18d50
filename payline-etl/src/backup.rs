//! Backup and rollback manager
//!
//! A snapshot is one pretty-printed JSON document holding every managed
//! table's rows and a SHA-256 checksum per table:
//!
//! ```text
//! <backup_dir>/<name>_<yyyyMMddTHHmmssSSSZ>.json
//! <backup_dir>/latest.json          (pointer to the newest snapshot)
//! ```
//!
//! Checksums are order independent: each row is serialized with its keys
//! sorted, the serializations are sorted, then hashed. Restore verifies every
//! checksum before it touches live data.

use chrono::{DateTime, Utc};
use payline_common::db::table_schemas::all_table_names;
use payline_common::time;
use payline_common::{Filter, Row, RowStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{EtlError, EtlResult};
use crate::utils::retry_on_lock;

const LATEST_POINTER: &str = "latest.json";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub table_count: usize,
    pub total_rows: usize,
}

/// One table inside a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDump {
    pub row_count: usize,
    pub checksum: String,
    pub rows: Vec<Row>,
}

/// Snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: SnapshotMetadata,
    /// Table name -> dump
    pub tables: BTreeMap<String, TableDump>,
}

/// Snapshot header without the rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: SnapshotMetadata,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    name: String,
    file: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Pass,
    Fail,
}

/// Integrity check for one table of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCheck {
    pub table: String,
    pub status: CheckStatus,
    pub rows: usize,
    pub expected: String,
    pub actual: String,
    /// Live table currently holds exactly the snapshot's rows
    pub matches_live: bool,
}

/// Result of `validate`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupValidation {
    pub snapshot: SnapshotInfo,
    pub tables: Vec<TableCheck>,
}

impl BackupValidation {
    pub fn passed(&self) -> bool {
        self.tables.iter().all(|t| t.status == CheckStatus::Pass)
    }
}

/// Result of `restore`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreReport {
    pub snapshot: SnapshotInfo,
    /// (table, rows deleted, rows restored) in restore order
    pub tables: Vec<(String, u64, u64)>,
}

/// Order-independent SHA-256 checksum of a table's rows
pub fn table_checksum(rows: &[Row]) -> String {
    let mut lines: Vec<String> = rows.iter().map(|row| canonical_json(&Value::Object(row.clone()))).collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// JSON text with object keys sorted at every level
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Snapshot names become file names
fn validate_name(name: &str) -> EtlResult<()> {
    let ok = !name.is_empty()
        && name != "latest"
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(EtlError::Configuration(format!(
            "Invalid backup name '{}': use letters, digits, '-', '_' or '.'",
            name
        )))
    }
}

/// Snapshot manager over a row store and a backup directory
pub struct BackupManager<'a> {
    store: &'a dyn RowStore,
    dir: PathBuf,
    tables: Vec<&'static str>,
    chunk_size: usize,
    max_lock_wait_ms: u64,
}

impl<'a> BackupManager<'a> {
    /// Manager for every registered table
    pub fn new(store: &'a dyn RowStore, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
            tables: all_table_names(),
            chunk_size: 100,
            max_lock_wait_ms: 5000,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture every managed table into a new snapshot
    pub async fn backup(&self, name: &str) -> EtlResult<SnapshotInfo> {
        validate_name(name)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut tables = BTreeMap::new();
        let mut total_rows = 0;
        for table in &self.tables {
            let rows = self.store.select(table, &Filter::All).await?;
            total_rows += rows.len();
            debug!(table, rows = rows.len(), "Captured table");
            tables.insert(
                table.to_string(),
                TableDump {
                    row_count: rows.len(),
                    checksum: table_checksum(&rows),
                    rows,
                },
            );
        }

        let snapshot = BackupSnapshot {
            name: name.to_string(),
            timestamp: time::now(),
            metadata: SnapshotMetadata {
                table_count: tables.len(),
                total_rows,
            },
            tables,
        };

        let file_name = format!("{}_{}.json", name, snapshot.timestamp.format(TIMESTAMP_FORMAT));
        let path = self.dir.join(&file_name);
        std::fs::write(&path, serde_json::to_vec_pretty(&snapshot)?)?;

        let pointer = LatestPointer {
            name: name.to_string(),
            file: file_name,
            timestamp: snapshot.timestamp,
        };
        std::fs::write(self.dir.join(LATEST_POINTER), serde_json::to_vec_pretty(&pointer)?)?;

        info!(
            name,
            path = %path.display(),
            tables = snapshot.metadata.table_count,
            rows = total_rows,
            "Backup written"
        );

        Ok(SnapshotInfo {
            name: snapshot.name,
            timestamp: snapshot.timestamp,
            metadata: snapshot.metadata,
            path,
        })
    }

    /// Every snapshot in the backup directory, newest first
    pub fn list(&self) -> EtlResult<Vec<SnapshotInfo>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_snapshot = path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.file_name().and_then(|n| n.to_str()) != Some(LATEST_POINTER);
            if !is_snapshot {
                continue;
            }
            match read_info(&path) {
                Ok(info) => snapshots.push(info),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot"),
            }
        }

        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Newest snapshot with the given name (`latest` follows the pointer)
    pub fn find(&self, name: &str) -> EtlResult<SnapshotInfo> {
        if name == "latest" {
            let pointer_path = self.dir.join(LATEST_POINTER);
            if pointer_path.is_file() {
                let pointer: LatestPointer = serde_json::from_slice(&std::fs::read(&pointer_path)?)?;
                let path = self.dir.join(&pointer.file);
                if path.is_file() {
                    return read_info(&path);
                }
            }
            return self
                .list()?
                .into_iter()
                .next()
                .ok_or_else(|| EtlError::SnapshotNotFound(name.to_string()));
        }

        self.list()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| EtlError::SnapshotNotFound(name.to_string()))
    }

    /// Recompute every table checksum of a snapshot; never mutates
    pub async fn validate(&self, name: &str) -> EtlResult<BackupValidation> {
        let info = self.find(name)?;
        let snapshot = read_snapshot(&info.path)?;

        let mut tables = Vec::new();
        for (table, dump) in &snapshot.tables {
            let actual = table_checksum(&dump.rows);
            let status = if actual == dump.checksum && dump.row_count == dump.rows.len() {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            };
            let matches_live = if self.tables.iter().any(|t| *t == table.as_str()) {
                let live = self.store.select(table, &Filter::All).await?;
                table_checksum(&live) == actual
            } else {
                false
            };
            tables.push(TableCheck {
                table: table.clone(),
                status,
                rows: dump.rows.len(),
                expected: dump.checksum.clone(),
                actual,
                matches_live,
            });
        }

        let validation = BackupValidation {
            snapshot: info,
            tables,
        };
        info!(name, passed = validation.passed(), "Backup validated");
        Ok(validation)
    }

    /// Replace live data with a snapshot's rows
    ///
    /// Aborts with [`EtlError::ChecksumMismatch`] before any write when a
    /// table fails verification.
    pub async fn restore(&self, name: &str) -> EtlResult<RestoreReport> {
        let info = self.find(name)?;
        let snapshot = read_snapshot(&info.path)?;

        let failed: Vec<String> = snapshot
            .tables
            .iter()
            .filter(|(_, dump)| table_checksum(&dump.rows) != dump.checksum)
            .map(|(table, _)| table.clone())
            .collect();
        if !failed.is_empty() {
            warn!(snapshot = %info.name, tables = ?failed, "Snapshot failed verification, restore aborted");
            return Err(EtlError::ChecksumMismatch {
                snapshot: info.name,
                tables: failed,
            });
        }

        // Managed tables present in the snapshot, in dependency order
        let order: Vec<&'static str> = self
            .tables
            .iter()
            .copied()
            .filter(|t| snapshot.tables.contains_key(*t))
            .collect();

        let all = Filter::All;
        let mut deleted = BTreeMap::new();
        for table in order.iter().rev() {
            let operation = format!("clear {}", table);
            let count = retry_on_lock(&operation, self.max_lock_wait_ms, || {
                self.store.delete(table, &all)
            })
            .await?;
            deleted.insert(*table, count);
        }

        let mut report_tables = Vec::new();
        for table in &order {
            let rows = &snapshot.tables[*table].rows;
            let mut restored = 0u64;
            for (chunk_no, chunk) in rows.chunks(self.chunk_size).enumerate() {
                let operation = format!("restore chunk {} into {}", chunk_no, table);
                restored += retry_on_lock(&operation, self.max_lock_wait_ms, || {
                    self.store.insert(table, chunk)
                })
                .await?;
            }
            report_tables.push((table.to_string(), deleted.get(table).copied().unwrap_or(0), restored));
        }

        info!(
            name = %info.name,
            path = %info.path.display(),
            rows = snapshot.metadata.total_rows,
            "Snapshot restored"
        );

        Ok(RestoreReport {
            snapshot: info,
            tables: report_tables,
        })
    }
}

fn read_snapshot(path: &Path) -> EtlResult<BackupSnapshot> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

fn read_info(path: &Path) -> EtlResult<SnapshotInfo> {
    // Unknown fields (the table dumps) are ignored by the header type
    let mut info: SnapshotInfo = serde_json::from_slice(&std::fs::read(path)?)?;
    info.path = path.to_path_buf();
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_checksum_ignores_row_and_key_order() {
        let a = vec![
            row(json!({"id": "1", "name": "a", "nested": {"y": 1, "x": 2}})),
            row(json!({"id": "2", "name": "b"})),
        ];
        let mut reordered = Row::new();
        reordered.insert("nested".to_string(), json!({"x": 2, "y": 1}));
        reordered.insert("name".to_string(), json!("a"));
        reordered.insert("id".to_string(), json!("1"));
        let b = vec![row(json!({"name": "b", "id": "2"})), reordered];

        assert_eq!(table_checksum(&a), table_checksum(&b));
        assert_eq!(table_checksum(&a).len(), 64);
    }

    #[test]
    fn test_checksum_detects_changes() {
        let a = vec![row(json!({"id": "1", "amount": 100.0}))];
        let b = vec![row(json!({"id": "1", "amount": 100.5}))];
        assert_ne!(table_checksum(&a), table_checksum(&b));
        assert_ne!(table_checksum(&a), table_checksum(&[]));
    }

    #[test]
    fn test_backup_name_rules() {
        assert!(validate_name("pre-migrate").is_ok());
        assert!(validate_name("2024_03.final").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("latest").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("with space").is_err());
    }
}
