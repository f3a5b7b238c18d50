//! Table Schema Definitions
//!
//! Single source of truth for database table schemas, listed in dependency
//! order (reference tables first, settlement items last). Backup, restore and
//! the row store all walk this registry.

use crate::db::schema_sync::{ColumnDefinition, ColumnKind, SchemaSync, TableSchema};
use crate::Result;
use sqlx::SqlitePool;
use std::sync::OnceLock;
use tracing::info;

use crate::db::schema_sync::ColumnKind::{Boolean, Json, Real, Text};

pub const MEMBERS: &str = "members";
pub const CHANNELS: &str = "channels";
pub const CATEGORIES: &str = "categories";
pub const PROJECTS: &str = "projects";
pub const CONTACTS: &str = "contacts";
pub const FEEDS: &str = "feeds";
pub const TEAM_TASKS: &str = "team_tasks";
pub const MILEAGES: &str = "mileages";
pub const FUNDS: &str = "funds";
pub const SETTLEMENTS: &str = "settlements";
pub const SETTLEMENT_ITEMS: &str = "settlement_items";

/// Reference tables produced by the seed step
pub const REFERENCE_TABLES: [&str; 3] = [MEMBERS, CHANNELS, CATEGORIES];

/// Canonical record tables written by the ingestion pipeline
pub const RECORD_TABLES: [&str; 6] = [PROJECTS, CONTACTS, FEEDS, TEAM_TASKS, MILEAGES, FUNDS];

fn id() -> ColumnDefinition {
    ColumnDefinition::new("id", Text).primary_key()
}

fn money(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, Real).not_null().default("0")
}

fn required(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, Text).not_null()
}

fn optional(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, Text)
}

fn build_registry() -> Vec<TableSchema> {
    vec![
        TableSchema::new(
            MEMBERS,
            vec![
                id(),
                required("code").unique(),
                required("name"),
                ColumnDefinition::new("active", Boolean).not_null().default("1"),
            ],
        ),
        TableSchema::new(
            CHANNELS,
            vec![
                id(),
                required("name").unique(),
                money("ad_rate"),
                money("program_rate"),
                money("market_fee_rate"),
                required("fee_base")
                    .default("'net'")
                    .check("fee_base IN ('net', 'gross')"),
            ],
        ),
        TableSchema::new(CATEGORIES, vec![id(), required("name").unique()]),
        TableSchema::new(
            PROJECTS,
            vec![
                id(),
                required("title"),
                optional("client_name"),
                optional("channel_id"),
                optional("category_id"),
                required("status"),
                required("contract_date"),
                optional("settle_date"),
                money("gross_amount").check("gross_amount >= 0"),
                money("discount_net"),
                ColumnDefinition::new("designers", Json).not_null().default("'[]'"),
                optional("memo"),
            ],
        ),
        TableSchema::new(
            CONTACTS,
            vec![
                id(),
                required("member_id"),
                optional("project_id"),
                required("event_date"),
                required("event_type"),
                money("amount"),
                ColumnDefinition::new("paid", Boolean).not_null().default("0"),
                optional("memo"),
            ],
        ),
        TableSchema::new(
            FEEDS,
            vec![
                id(),
                required("member_id"),
                required("feed_date"),
                required("feed_type"),
                money("amount"),
                optional("content"),
            ],
        ),
        TableSchema::new(
            TEAM_TASKS,
            vec![
                id(),
                required("member_id"),
                required("task_date"),
                required("title"),
                required("status"),
                money("amount"),
            ],
        ),
        TableSchema::new(
            MILEAGES,
            vec![
                id(),
                required("member_id"),
                required("trip_date"),
                ColumnDefinition::new("distance_km", Real),
                money("amount"),
                optional("purpose"),
            ],
        ),
        TableSchema::new(
            FUNDS,
            vec![
                id(),
                required("fund_date"),
                required("fund_type"),
                money("amount"),
                optional("member_id"),
                optional("memo"),
            ],
        ),
        TableSchema::new(
            SETTLEMENTS,
            vec![
                id(),
                required("period").unique(),
                required("status").check("status IN ('draft', 'locked')"),
                required("created_at"),
                optional("locked_at"),
            ],
        ),
        TableSchema::new(
            SETTLEMENT_ITEMS,
            vec![
                id(),
                required("settlement_id"),
                required("member_id"),
                required("source_type"),
                required("source_id"),
                money("gross"),
                money("net"),
                money("before_withholding"),
                money("withholding_tax"),
                money("after_withholding"),
                ColumnDefinition::new("paid", Boolean).not_null().default("0"),
            ],
        ),
    ]
}

/// All table schemas in dependency order
pub fn all_table_schemas() -> &'static [TableSchema] {
    static REGISTRY: OnceLock<Vec<TableSchema>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

/// Look up one table's schema by name
pub fn table_schema(name: &str) -> Option<&'static TableSchema> {
    all_table_schemas().iter().find(|s| s.name == name)
}

/// Table names in dependency order
pub fn all_table_names() -> Vec<&'static str> {
    all_table_schemas().iter().map(|s| s.name).collect()
}

/// Create missing tables and add missing columns for every registered table
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    info!("Synchronizing {} table schemas", all_table_schemas().len());

    for schema in all_table_schemas() {
        SchemaSync::sync_table(pool, schema).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_and_lookup() {
        let names = all_table_names();
        assert_eq!(names.first(), Some(&MEMBERS));
        assert_eq!(names.last(), Some(&SETTLEMENT_ITEMS));
        assert_eq!(names.len(), 11);

        let projects = table_schema(PROJECTS).unwrap();
        assert_eq!(projects.column("designers").unwrap().kind, ColumnKind::Json);
        assert!(projects.column("title").unwrap().not_null);
        assert!(table_schema("sessions").is_none());
    }

    #[test]
    fn test_every_table_has_text_primary_key() {
        for schema in all_table_schemas() {
            let pk = schema.primary_key().unwrap();
            assert_eq!(pk.name, "id", "table {}", schema.name);
            assert_eq!(pk.kind, ColumnKind::Text);
        }
    }
}
