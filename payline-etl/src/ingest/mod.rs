//! Ingestion and normalization
//!
//! Reads a delimited sheet, maps its headers onto canonical fields and builds
//! one typed record per data row. Each row carries the issues found while
//! normalizing it; nothing here rejects a row.

pub mod columns;
pub mod normalize;
pub mod reader;
pub mod records;

pub use columns::{ColumnMap, DesignerPatterns};
pub use normalize::{parse_amount, parse_date, BoolTokens};
pub use reader::{parse_table, read_table, RawRecord, RawTable};
pub use records::CanonicalRecord;

use payline_common::config::TomlConfig;
use payline_common::db::models::RecordKind;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::diagnostics::{IssueKind, RowIssue};
use crate::error::EtlResult;
use crate::resolver::{ReferenceKind, ReferenceResolver};
use records::{build_record, ResolvedDesignerColumn, RowContext};

/// Normalization settings derived from configuration
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub booleans: BoolTokens,
    pub designer_patterns: DesignerPatterns,
    pub fuzzy_headers: bool,
}

impl Normalizer {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            booleans: BoolTokens::new(&config.tokens),
            designer_patterns: DesignerPatterns::compile(&config.designer_columns),
            fuzzy_headers: config.fuzzy_matching,
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

/// One normalized data row
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub line: usize,
    pub record: CanonicalRecord,
    pub issues: Vec<RowIssue>,
}

/// Normalized sheet
#[derive(Debug, Clone)]
pub struct IngestOutput {
    pub kind: RecordKind,
    pub rows: Vec<NormalizedRow>,
    /// Blank rows skipped by the reader
    pub skipped: usize,
    pub ignored_columns: Vec<String>,
}

impl IngestOutput {
    /// Unresolved member/channel/category tokens, deduplicated
    pub fn missing_references(&self) -> BTreeSet<(ReferenceKind, String)> {
        self.rows
            .iter()
            .flat_map(|row| row.issues.iter())
            .filter(|issue| issue.kind == IssueKind::MappingError)
            .filter_map(|issue| {
                let kind = match issue.field.as_str() {
                    "member_id" | "designers" => ReferenceKind::Member,
                    "channel_id" => ReferenceKind::Channel,
                    "category_id" => ReferenceKind::Category,
                    _ => return None,
                };
                issue.token.clone().map(|token| (kind, token))
            })
            .collect()
    }
}

/// Normalize an in-memory sheet
pub fn ingest_table(
    table: &RawTable,
    kind: RecordKind,
    resolver: &ReferenceResolver,
    normalizer: &Normalizer,
) -> IngestOutput {
    let columns = ColumnMap::build(
        kind,
        &table.headers,
        &normalizer.designer_patterns,
        normalizer.fuzzy_headers,
    );
    if !columns.ignored.is_empty() {
        debug!(kind = %kind, ignored = ?columns.ignored, "Ignoring unmapped columns");
    }

    // Pass 1 result: designer header tokens resolved once per sheet
    let designer_columns: Vec<ResolvedDesignerColumn> = columns
        .designer_columns
        .iter()
        .map(|column| ResolvedDesignerColumn {
            column: column.clone(),
            member: resolver
                .resolve(ReferenceKind::Member, &column.member)
                .map(str::to_string),
        })
        .collect();

    let rows = table
        .rows
        .iter()
        .map(|record| {
            let mut ctx = RowContext::new(
                record,
                &columns,
                &designer_columns,
                resolver,
                &normalizer.booleans,
            );
            let canonical = build_record(kind, &mut ctx);
            NormalizedRow {
                line: record.line,
                record: canonical,
                issues: ctx.issues,
            }
        })
        .collect::<Vec<_>>();

    IngestOutput {
        kind,
        rows,
        skipped: table.skipped,
        ignored_columns: columns.ignored,
    }
}

/// Read and normalize a sheet from disk
pub fn ingest_file(
    path: &Path,
    kind: RecordKind,
    resolver: &ReferenceResolver,
    normalizer: &Normalizer,
) -> EtlResult<IngestOutput> {
    let table = read_table(path)?;
    let output = ingest_table(&table, kind, resolver, normalizer);
    info!(
        file = %path.display(),
        kind = %kind,
        rows = output.rows.len(),
        skipped = output.skipped,
        "Normalized input file"
    );
    Ok(output)
}

/// Record kind for a sheet, guessed from its file stem
pub fn kind_for_path(path: &Path) -> Option<RecordKind> {
    let stem = path.file_stem()?.to_str()?.trim().to_lowercase();
    if let Ok(kind) = stem.parse() {
        return Some(kind);
    }
    const STEMS: &[(&str, RecordKind)] = &[
        ("프로젝트", RecordKind::Project),
        ("project", RecordKind::Project),
        ("상담", RecordKind::Contact),
        ("contact", RecordKind::Contact),
        ("피드", RecordKind::Feed),
        ("feed", RecordKind::Feed),
        ("팀업무", RecordKind::TeamTask),
        ("team", RecordKind::TeamTask),
        ("task", RecordKind::TeamTask),
        ("마일리지", RecordKind::Mileage),
        ("주행", RecordKind::Mileage),
        ("mileage", RecordKind::Mileage),
        ("자금", RecordKind::Fund),
        ("입출금", RecordKind::Fund),
        ("fund", RecordKind::Fund),
    ];
    STEMS
        .iter()
        .find(|(token, _)| stem.contains(token))
        .map(|(_, kind)| *kind)
}
