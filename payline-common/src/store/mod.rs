//! Row-store seam
//!
//! The pipeline talks to storage only through [`RowStore`]: select, insert,
//! upsert and delete by predicate over flat JSON rows. [`SqliteRowStore`] is
//! the bundled implementation.

pub mod sqlite;

pub use sqlite::SqliteRowStore;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// One stored row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Row predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row
    All,
    /// `field = value` (`IS NULL` for a null value)
    Eq(String, Value),
    /// `field >= value`
    Gte(String, Value),
    /// `field < value`
    Lt(String, Value),
    /// `field IN (values)`; an empty list matches nothing
    In(String, Vec<Value>),
    /// Every sub-filter must match
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(field.to_string(), value.into())
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Filter::In(field.to_string(), values)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }
}

/// Storage operations consumed by the pipeline
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Rows matching the filter, in insertion order
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>>;

    /// Insert all rows or none of them; returns rows written
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Insert or update on conflict of `conflict_column`
    async fn upsert(&self, table: &str, rows: &[Row], conflict_column: &str) -> Result<u64>;

    /// Delete matching rows; returns rows removed
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64>;

    /// Delete matching rows and insert `rows` as one unit
    async fn replace(&self, table: &str, filter: &Filter, rows: &[Row]) -> Result<u64>;

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        Ok(self.select(table, filter).await?.len() as u64)
    }
}

/// Serialize a model into a row
pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}

/// Deserialize a row into a model
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Deserialize many rows
pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}
