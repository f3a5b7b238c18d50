//! SQLite-backed row store
//!
//! Rows are encoded column by column using the declared table schema:
//! booleans become INTEGER 0/1, nested JSON values become TEXT, and reads
//! come back through `json_object(...)` so every row surfaces as JSON again.
//! Only registered tables and columns are accepted, so identifiers never
//! come from input data.

use super::{Filter, Row, RowStore};
use crate::db::schema_sync::{ColumnKind, TableSchema};
use crate::db::table_schemas::table_schema;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Row as _, Sqlite, SqlitePool};
use tracing::debug;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bindable SQLite value
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            nested => SqlValue::Text(nested.to_string()),
        }
    }
}

fn bind_value(query: SqliteQuery<'_>, value: SqlValue) -> SqliteQuery<'_> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::Real(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
    }
}

/// Row store over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteRowStore {
    pool: SqlitePool,
}

impl SqliteRowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn schema(table: &str) -> Result<&'static TableSchema> {
        table_schema(table).ok_or_else(|| Error::InvalidInput(format!("unknown table '{}'", table)))
    }

    fn checked_column<'s>(schema: &'s TableSchema, name: &str) -> Result<&'s str> {
        schema
            .column(name)
            .map(|c| c.name.as_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!("unknown column '{}' in table '{}'", name, schema.name))
            })
    }

    /// Build a WHERE clause (without the keyword) and its bind values
    fn predicate(schema: &TableSchema, filter: &Filter, binds: &mut Vec<SqlValue>) -> Result<String> {
        let sql = match filter {
            Filter::All => "1 = 1".to_string(),
            Filter::Eq(field, Value::Null) => {
                format!("{} IS NULL", Self::checked_column(schema, field)?)
            }
            Filter::Eq(field, value) => {
                binds.push(SqlValue::from_json(value));
                format!("{} = ?", Self::checked_column(schema, field)?)
            }
            Filter::Gte(field, value) => {
                binds.push(SqlValue::from_json(value));
                format!("{} >= ?", Self::checked_column(schema, field)?)
            }
            Filter::Lt(field, value) => {
                binds.push(SqlValue::from_json(value));
                format!("{} < ?", Self::checked_column(schema, field)?)
            }
            Filter::In(_, values) if values.is_empty() => "1 = 0".to_string(),
            Filter::In(field, values) => {
                let column = Self::checked_column(schema, field)?;
                binds.extend(values.iter().map(SqlValue::from_json));
                let marks = vec!["?"; values.len()].join(", ");
                format!("{} IN ({})", column, marks)
            }
            Filter::And(parts) if parts.is_empty() => "1 = 1".to_string(),
            Filter::And(parts) => {
                let clauses = parts
                    .iter()
                    .map(|part| Self::predicate(schema, part, binds).map(|c| format!("({})", c)))
                    .collect::<Result<Vec<_>>>()?;
                clauses.join(" AND ")
            }
        };
        Ok(sql)
    }

    /// INSERT statement for one row, optionally as an upsert
    fn insert_statement(
        schema: &TableSchema,
        row: &Row,
        conflict_column: Option<&str>,
    ) -> Result<(String, Vec<SqlValue>)> {
        if row.is_empty() {
            return Err(Error::InvalidInput(format!("empty row for table '{}'", schema.name)));
        }

        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (name, value) in row {
            columns.push(Self::checked_column(schema, name)?);
            values.push(SqlValue::from_json(value));
        }

        let marks = vec!["?"; columns.len()].join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.name,
            columns.join(", "),
            marks
        );

        if let Some(conflict) = conflict_column {
            let updates: Vec<String> = columns
                .iter()
                .filter(|c| **c != conflict)
                .map(|c| format!("{0} = excluded.{0}", c))
                .collect();
            if updates.is_empty() {
                sql.push_str(&format!(" ON CONFLICT({}) DO NOTHING", conflict));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT({}) DO UPDATE SET {}",
                    conflict,
                    updates.join(", ")
                ));
            }
        }

        Ok((sql, values))
    }

    fn projection(schema: &TableSchema) -> String {
        let pairs: Vec<String> = schema
            .columns
            .iter()
            .map(|c| match c.kind {
                ColumnKind::Json => format!("'{0}', json({0})", c.name),
                _ => format!("'{0}', {0}", c.name),
            })
            .collect();
        format!("json_object({})", pairs.join(", "))
    }

    /// Restore JSON booleans that SQLite stored as integers
    fn decode_row(schema: &TableSchema, text: &str) -> Result<Row> {
        let mut row: Row = serde_json::from_str(text)?;
        for column in schema.columns.iter().filter(|c| c.kind == ColumnKind::Boolean) {
            if let Some(value) = row.get_mut(&column.name) {
                if let Some(n) = value.as_i64() {
                    *value = Value::Bool(n != 0);
                }
            }
        }
        Ok(row)
    }

    async fn write_rows(
        &self,
        schema: &TableSchema,
        delete_filter: Option<&Filter>,
        rows: &[Row],
        conflict_column: Option<&str>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        if let Some(filter) = delete_filter {
            let mut binds = Vec::new();
            let predicate = Self::predicate(schema, filter, &mut binds)?;
            let sql = format!("DELETE FROM {} WHERE {}", schema.name, predicate);
            let mut query = sqlx::query(&sql);
            for value in binds {
                query = bind_value(query, value);
            }
            let removed = query.execute(&mut *tx).await?.rows_affected();
            debug!(table = schema.name, removed, "Deleted rows before rewrite");
        }

        let mut written = 0;
        for row in rows {
            let (sql, values) = Self::insert_statement(schema, row, conflict_column)?;
            let mut query = sqlx::query(&sql);
            for value in values {
                query = bind_value(query, value);
            }
            written += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl RowStore for SqliteRowStore {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>> {
        let schema = Self::schema(table)?;
        let mut binds = Vec::new();
        let predicate = Self::predicate(schema, filter, &mut binds)?;
        let sql = format!(
            "SELECT {} AS row_json FROM {} WHERE {} ORDER BY rowid",
            Self::projection(schema),
            schema.name,
            predicate
        );

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }

        let records = query.fetch_all(&self.pool).await?;
        records
            .iter()
            .map(|record| {
                let text: String = record.try_get("row_json")?;
                Self::decode_row(schema, &text)
            })
            .collect()
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let schema = Self::schema(table)?;
        self.write_rows(schema, None, rows, None).await
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_column: &str) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let schema = Self::schema(table)?;
        let column = schema
            .column(conflict_column)
            .filter(|c| c.primary_key || c.unique)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "'{}' is not a unique column of '{}'",
                    conflict_column, table
                ))
            })?;
        self.write_rows(schema, None, rows, Some(column.name.as_str())).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64> {
        let schema = Self::schema(table)?;
        let mut binds = Vec::new();
        let predicate = Self::predicate(schema, filter, &mut binds)?;
        let sql = format!("DELETE FROM {} WHERE {}", schema.name, predicate);

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn replace(&self, table: &str, filter: &Filter, rows: &[Row]) -> Result<u64> {
        let schema = Self::schema(table)?;
        self.write_rows(schema, Some(filter), rows, None).await
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let schema = Self::schema(table)?;
        let mut binds = Vec::new();
        let predicate = Self::predicate(schema, filter, &mut binds)?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", schema.name, predicate);

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }
        let count: i64 = query.fetch_one(&self.pool).await?.try_get(0)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;
    use serde_json::json;

    async fn setup_store() -> SqliteRowStore {
        SqliteRowStore::new(init_memory_database().await.unwrap())
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn member(id: &str, code: &str, name: &str) -> Row {
        row(json!({"id": id, "code": code, "name": name, "active": true}))
    }

    #[tokio::test]
    async fn test_insert_and_select_round_trip() {
        let store = setup_store().await;
        store
            .insert("members", &[member("m1", "D01", "김민수"), member("m2", "D02", "이서연")])
            .await
            .unwrap();

        let rows = store.select("members", &Filter::All).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "김민수");
        assert_eq!(rows[0]["active"], Value::Bool(true));

        let filtered = store.select("members", &Filter::eq("code", "D02")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0]["id"], "m2");
    }

    #[tokio::test]
    async fn test_insert_is_all_or_nothing() {
        let store = setup_store().await;
        let result = store
            .insert("members", &[member("m1", "D01", "A"), member("m2", "D01", "B")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.count("members", &Filter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_json_column_round_trip() {
        let store = setup_store().await;
        let project = row(json!({
            "id": "p1",
            "title": "Hannam apartment",
            "status": "active",
            "contract_date": "2024-03-02",
            "gross_amount": 1100000,
            "discount_net": 0,
            "designers": [{"member_id": "m1", "percent": 100, "bonus_pct": 0}]
        }));
        store.insert("projects", &[project]).await.unwrap();

        let rows = store.select("projects", &Filter::All).await.unwrap();
        assert_eq!(rows[0]["designers"][0]["member_id"], "m1");
        assert_eq!(rows[0]["settle_date"], Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let store = setup_store().await;
        let mut bad = member("m1", "D01", "A");
        bad.insert("nickname".to_string(), json!("x"));
        let err = store.insert("members", &[bad]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = store.select("invoices", &Filter::All).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_upsert_updates_on_conflict() {
        let store = setup_store().await;
        store.upsert("members", &[member("m1", "D01", "Old")], "code").await.unwrap();
        store.upsert("members", &[member("m1", "D01", "New")], "code").await.unwrap();

        let rows = store.select("members", &Filter::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "New");

        assert!(store.upsert("members", &[member("m2", "D02", "X")], "name").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_range_filters() {
        let store = setup_store().await;
        let feeds: Vec<Row> = ["2024-02-28", "2024-03-01", "2024-03-31", "2024-04-01"]
            .iter()
            .enumerate()
            .map(|(i, date)| {
                row(json!({
                    "id": format!("f{}", i),
                    "member_id": "m1",
                    "feed_date": date,
                    "feed_type": "post",
                    "amount": 10000
                }))
            })
            .collect();
        store.insert("feeds", &feeds).await.unwrap();

        let march = Filter::gte("feed_date", "2024-03-01").and(Filter::lt("feed_date", "2024-04-01"));
        assert_eq!(store.count("feeds", &march).await.unwrap(), 2);

        let removed = store.delete("feeds", &march).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("feeds", &Filter::All).await.unwrap(), 2);
        assert!(store.select("feeds", &Filter::is_in("id", vec![])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_rolls_back_on_failure() {
        let store = setup_store().await;
        store.insert("members", &[member("m1", "D01", "A")]).await.unwrap();

        // Second row violates NOT NULL on name; the delete must not stick
        let bad = row(json!({"id": "m3", "code": "D03", "name": null}));
        let result = store
            .replace("members", &Filter::All, &[member("m2", "D02", "B"), bad])
            .await;
        assert!(result.is_err());

        let rows = store.select("members", &Filter::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "m1");
    }
}
