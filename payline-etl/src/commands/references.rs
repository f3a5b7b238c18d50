//! Reference seeding, missing-reference creation, clear and connectivity test

use payline_common::db::models::{Category, Channel, FeeBase, Member};
use payline_common::db::table_schemas::{all_table_names, CATEGORIES, CHANNELS, MEMBERS, RECORD_TABLES};
use payline_common::store::to_row;
use payline_common::{Filter, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::AppContext;
use crate::error::{EtlError, EtlResult};
use crate::resolver::ReferenceKind;

/// Seed document: reference entities keyed by natural key
///
/// ```toml
/// [[members]]
/// code = "D01"
/// name = "김민수"
///
/// [[channels]]
/// name = "네이버"
/// market_fee_rate = 0.21
///
/// [[categories]]
/// name = "Residential"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub members: Vec<SeedMember>,
    #[serde(default)]
    pub channels: Vec<SeedChannel>,
    #[serde(default)]
    pub categories: Vec<SeedCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMember {
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedChannel {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Falls back to `default_ad_rate`
    #[serde(default)]
    pub ad_rate: Option<Decimal>,
    /// Falls back to `default_program_rate`
    #[serde(default)]
    pub program_rate: Option<Decimal>,
    #[serde(default)]
    pub market_fee_rate: Decimal,
    #[serde(default)]
    pub fee_base: FeeBase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCategory {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

impl SeedDocument {
    pub fn from_toml_str(content: &str) -> EtlResult<Self> {
        toml::from_str(content)
            .map_err(|e| EtlError::Configuration(format!("Invalid seed document: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub path: PathBuf,
    pub members: u64,
    pub channels: u64,
    pub categories: u64,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Seeded from {}", self.path.display())?;
        writeln!(f, "  members:    {}", self.members)?;
        writeln!(f, "  channels:   {}", self.channels)?;
        write!(f, "  categories: {}", self.categories)
    }
}

/// Existing ids by natural key, so re-seeding keeps ids stable
async fn existing_ids(ctx: &AppContext, table: &str, key: &str) -> EtlResult<HashMap<String, String>> {
    let rows = ctx.store().select(table, &Filter::All).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let k = row.get(key)?.as_str()?.to_string();
            let id = row.get("id")?.as_str()?.to_string();
            Some((k, id))
        })
        .collect())
}

fn pick_id(explicit: Option<String>, existing: &HashMap<String, String>, key: &str) -> String {
    explicit
        .or_else(|| existing.get(key).cloned())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Upsert a seed document into the reference tables
pub async fn apply_seed(ctx: &AppContext, document: SeedDocument, path: PathBuf) -> EtlResult<SeedReport> {
    let store = ctx.store();

    let known = existing_ids(ctx, MEMBERS, "code").await?;
    let members = document
        .members
        .into_iter()
        .map(|m| {
            to_row(&Member {
                id: pick_id(m.id, &known, &m.code),
                code: m.code,
                name: m.name,
                active: m.active,
            })
        })
        .collect::<payline_common::Result<Vec<Row>>>()?;

    let known = existing_ids(ctx, CHANNELS, "name").await?;
    let channels = document
        .channels
        .into_iter()
        .map(|c| {
            to_row(&Channel {
                id: pick_id(c.id, &known, &c.name),
                name: c.name,
                ad_rate: c.ad_rate.unwrap_or(ctx.config.default_ad_rate),
                program_rate: c.program_rate.unwrap_or(ctx.config.default_program_rate),
                market_fee_rate: c.market_fee_rate,
                fee_base: c.fee_base,
            })
        })
        .collect::<payline_common::Result<Vec<Row>>>()?;

    let known = existing_ids(ctx, CATEGORIES, "name").await?;
    let categories = document
        .categories
        .into_iter()
        .map(|c| {
            to_row(&Category {
                id: pick_id(c.id, &known, &c.name),
                name: c.name,
            })
        })
        .collect::<payline_common::Result<Vec<Row>>>()?;

    let report = SeedReport {
        path,
        members: store.upsert(MEMBERS, &members, "code").await?,
        channels: store.upsert(CHANNELS, &channels, "name").await?,
        categories: store.upsert(CATEGORIES, &categories, "name").await?,
    };
    info!(
        members = report.members,
        channels = report.channels,
        categories = report.categories,
        "Reference seed applied"
    );
    Ok(report)
}

/// `seed [--file]`: load the seed document (default: configured seed file)
pub async fn run_seed(ctx: &AppContext, file: Option<&Path>) -> EtlResult<SeedReport> {
    let path = file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.root.seed_file(&ctx.config));
    if !path.is_file() {
        return Err(EtlError::Configuration(format!(
            "Seed file not found: {}",
            path.display()
        )));
    }
    let document = SeedDocument::from_toml_str(&std::fs::read_to_string(&path)?)?;
    apply_seed(ctx, document, path).await
}

/// Create members/channels/categories for unresolved tokens
///
/// Project tokens are never created. Returns what was created.
pub async fn create_missing_references(
    ctx: &AppContext,
    missing: &BTreeSet<(ReferenceKind, String)>,
) -> EtlResult<Vec<(ReferenceKind, String)>> {
    let mut document = SeedDocument::default();
    let mut created = Vec::new();

    for (kind, token) in missing {
        let token = token.trim().to_string();
        if token.is_empty() {
            continue;
        }
        match kind {
            ReferenceKind::Member => document.members.push(SeedMember {
                id: None,
                code: token.clone(),
                name: token.clone(),
                active: true,
            }),
            ReferenceKind::Channel => document.channels.push(SeedChannel {
                id: None,
                name: token.clone(),
                ad_rate: None,
                program_rate: None,
                market_fee_rate: Decimal::ZERO,
                fee_base: FeeBase::Net,
            }),
            ReferenceKind::Category => document.categories.push(SeedCategory {
                id: None,
                name: token.clone(),
            }),
            ReferenceKind::Project => continue,
        }
        created.push((*kind, token));
    }

    if created.is_empty() {
        return Ok(created);
    }
    apply_seed(ctx, document, PathBuf::from("<missing references>")).await?;
    warn!(count = created.len(), created = ?created, "Created missing references");
    Ok(created)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClearReport {
    /// (table, rows deleted) in deletion order
    pub tables: Vec<(String, u64)>,
}

impl fmt::Display for ClearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cleared record tables:")?;
        for (table, count) in &self.tables {
            write!(f, "\n  {:<12} {}", table, count)?;
        }
        Ok(())
    }
}

/// `clear --confirm`: delete every canonical record; references and
/// settlements are kept
pub async fn run_clear(ctx: &AppContext, confirm: bool) -> EtlResult<ClearReport> {
    if !confirm {
        return Err(EtlError::Configuration(
            "clear deletes every imported record; pass --confirm to proceed".to_string(),
        ));
    }

    let mut tables = Vec::new();
    for table in RECORD_TABLES.iter().rev() {
        let deleted = ctx.store().delete(table, &Filter::All).await?;
        tables.push((table.to_string(), deleted));
    }
    info!(tables = ?tables, "Record tables cleared");
    Ok(ClearReport { tables })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub tables: Vec<(String, u64)>,
}

impl fmt::Display for ConnectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection OK")?;
        for (table, count) in &self.tables {
            write!(f, "\n  {:<17} {:>7} rows", table, count)?;
        }
        Ok(())
    }
}

/// `test`: row counts for every table
pub async fn run_test(ctx: &AppContext) -> EtlResult<ConnectionReport> {
    let mut tables = Vec::new();
    for table in all_table_names() {
        tables.push((table.to_string(), ctx.store().count(table, &Filter::All).await?));
    }
    Ok(ConnectionReport { tables })
}
