//! Batch persistence
//!
//! Writes accepted records of one kind in chunks. Each chunk is a single
//! all-or-nothing insert; when a chunk fails it is retried record by record
//! so one bad record never sinks its neighbours. Label-based relations are
//! resolved per record just before writing.

use payline_common::db::models::RecordKind;
use payline_common::{Row, RowStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ingest::CanonicalRecord;
use crate::resolver::{ReferenceKind, ReferenceResolver};
use crate::utils::retry_on_lock;

/// Record the store refused
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    /// Position in the submitted batch
    pub index: usize,
    pub data: Row,
    pub error: String,
}

/// Outcome of one batch write
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub success: bool,
    pub inserted_count: usize,
    pub errors: Vec<BatchError>,
}

/// Chunked writer over the row store
pub struct BatchWriter<'a> {
    store: &'a dyn RowStore,
    resolver: &'a ReferenceResolver,
    chunk_size: usize,
    max_lock_wait_ms: u64,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn RowStore, resolver: &'a ReferenceResolver) -> Self {
        Self {
            store,
            resolver,
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

    /// Write a homogeneous batch of `kind` records
    ///
    /// Store failures are captured per record in the result; the call itself
    /// never fails.
    pub async fn write(&self, kind: RecordKind, records: &[CanonicalRecord]) -> BatchResult {
        let table = kind.table();
        let mut result = BatchResult::default();
        let mut prepared: Vec<(usize, Row)> = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if record.kind() != kind {
                result.errors.push(BatchError {
                    index,
                    data: record.to_row().unwrap_or_default(),
                    error: format!("record of kind {} in a {} batch", record.kind(), kind),
                });
                continue;
            }
            match self.prepare(record) {
                Ok(row) => prepared.push((index, row)),
                Err(e) => result.errors.push(BatchError {
                    index,
                    data: Row::new(),
                    error: e.to_string(),
                }),
            }
        }

        for (chunk_no, chunk) in prepared.chunks(self.chunk_size).enumerate() {
            let rows: Vec<Row> = chunk.iter().map(|(_, row)| row.clone()).collect();
            let operation = format!("insert chunk {} into {}", chunk_no, table);

            match retry_on_lock(&operation, self.max_lock_wait_ms, || {
                self.store.insert(table, &rows)
            })
            .await
            {
                Ok(written) => {
                    result.inserted_count += written as usize;
                    debug!(table, chunk = chunk_no, rows = written, "Chunk written");
                }
                Err(e) => {
                    warn!(
                        table,
                        chunk = chunk_no,
                        rows = rows.len(),
                        error = %e,
                        "Chunk insert failed, falling back to per-record inserts"
                    );
                    self.write_individually(table, chunk, &mut result).await;
                }
            }
        }

        result.success = result.errors.is_empty();
        info!(
            table,
            submitted = records.len(),
            inserted = result.inserted_count,
            failed = result.errors.len(),
            "Batch persisted"
        );
        result
    }

    async fn write_individually(&self, table: &str, chunk: &[(usize, Row)], result: &mut BatchResult) {
        for (index, row) in chunk {
            let single = std::slice::from_ref(row);
            let operation = format!("insert record {} into {}", index, table);
            match retry_on_lock(&operation, self.max_lock_wait_ms, || {
                self.store.insert(table, single)
            })
            .await
            {
                Ok(written) => result.inserted_count += written as usize,
                Err(e) => {
                    debug!(table, index, error = %e, "Record insert failed");
                    result.errors.push(BatchError {
                        index: *index,
                        data: row.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Row for a record with label-based relations resolved
    fn prepare(&self, record: &CanonicalRecord) -> payline_common::Result<Row> {
        let mut row = record.to_row()?;
        for (kind, label) in record.pending_labels() {
            let column = match kind {
                ReferenceKind::Project => "project_id",
                ReferenceKind::Member => "member_id",
                ReferenceKind::Channel => "channel_id",
                ReferenceKind::Category => "category_id",
            };
            let value = match self.resolver.resolve(kind, label) {
                Ok(id) => Value::String(id.to_string()),
                Err(e) => {
                    debug!(record = record.id(), error = %e, "Unresolved label, storing null");
                    Value::Null
                }
            };
            row.insert(column.to_string(), value);
        }
        Ok(row)
    }
}
