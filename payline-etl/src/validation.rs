//! Validation engine
//!
//! Applies a per-kind rule set to normalized rows. Acceptance is decided row
//! by row: any blocking issue rejects that row only. Advisory amount ranges
//! only produce warnings.

use payline_common::config::{AmountRange, TomlConfig};
use payline_common::db::models::{DesignerAllocation, RecordKind};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

use crate::diagnostics::{IssueKind, RowIssue};
use crate::ingest::{CanonicalRecord, IngestOutput, NormalizedRow};

const MAX_BONUS_PCT: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// Rules for one record kind
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub required_fields: Vec<String>,
    /// Advisory bounds by field
    pub amount_ranges: BTreeMap<String, AmountRange>,
    /// Allowed stored values by field
    pub enum_whitelists: BTreeMap<String, Vec<String>>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn range(min: i64, max: i64) -> AmountRange {
    AmountRange {
        min: Some(Decimal::from(min)),
        max: Some(Decimal::from(max)),
    }
}

impl RuleSet {
    /// Built-in rules
    pub fn for_kind(kind: RecordKind) -> Self {
        let (required, amount_field, bounds, whitelists): (&[&str], &str, AmountRange, Vec<(&str, &[&str])>) =
            match kind {
                RecordKind::Project => (
                    &["title", "contract_date"][..],
                    "gross_amount",
                    range(0, 1_000_000_000),
                    vec![("status", &["pending", "active", "completed", "cancelled"][..])],
                ),
                RecordKind::Contact => (
                    &["member_id", "event_date"][..],
                    "amount",
                    range(0, 10_000_000),
                    vec![("event_type", &["consult", "visit", "contract", "other"][..])],
                ),
                RecordKind::Feed => (
                    &["member_id", "feed_date"][..],
                    "amount",
                    range(0, 5_000_000),
                    vec![("feed_type", &["post", "review", "video", "other"][..])],
                ),
                RecordKind::TeamTask => (
                    &["member_id", "task_date", "title"][..],
                    "amount",
                    range(0, 10_000_000),
                    vec![("status", &["todo", "in_progress", "done"][..])],
                ),
                RecordKind::Mileage => (
                    &["member_id", "trip_date"][..],
                    "amount",
                    range(0, 2_000_000),
                    vec![],
                ),
                RecordKind::Fund => (
                    &["fund_date"][..],
                    "amount",
                    range(0, 1_000_000_000),
                    vec![("fund_type", &["income", "expense"][..])],
                ),
            };

        Self {
            required_fields: strings(required),
            amount_ranges: BTreeMap::from([(amount_field.to_string(), bounds)]),
            enum_whitelists: whitelists
                .into_iter()
                .map(|(field, values)| (field.to_string(), strings(values)))
                .collect(),
        }
    }

    /// Built-in rules with the configured advisory range for the kind's table
    pub fn from_config(kind: RecordKind, config: &TomlConfig) -> Self {
        let mut rules = Self::for_kind(kind);
        if let Some(configured) = config.amount_range(kind.table()) {
            for bounds in rules.amount_ranges.values_mut() {
                *bounds = configured;
            }
        }
        rules
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    /// Data rows seen, including skipped blank rows
    pub total: usize,
    /// Rows accepted
    pub success: usize,
    /// Rows rejected
    pub error: usize,
    /// Accepted rows carrying warnings
    pub warning: usize,
    pub skipped: usize,
}

/// Validation outcome for one sheet
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub kind: RecordKind,
    /// True when no row was rejected
    pub success: bool,
    /// Accepted records, in source order
    pub data: Vec<CanonicalRecord>,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
    pub summary: ValidationSummary,
}

/// Validate every normalized row of a sheet
pub fn validate(output: IngestOutput, rules: &RuleSet) -> ValidationReport {
    let kind = output.kind;
    let mut summary = ValidationSummary {
        total: output.rows.len() + output.skipped,
        skipped: output.skipped,
        ..Default::default()
    };
    let mut data = Vec::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for row in output.rows {
        let NormalizedRow { line, record, mut issues } = row;
        issues.extend(check_record(line, &record, rules, &issues));

        let (row_errors, row_warnings): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(RowIssue::is_error);

        if row_errors.is_empty() {
            summary.success += 1;
            if !row_warnings.is_empty() {
                summary.warning += 1;
            }
            data.push(record);
        } else {
            summary.error += 1;
            errors.extend(row_errors);
        }
        warnings.extend(row_warnings);
    }

    info!(
        kind = %kind,
        total = summary.total,
        accepted = summary.success,
        rejected = summary.error,
        warnings = summary.warning,
        skipped = summary.skipped,
        "Validation complete"
    );

    ValidationReport {
        kind,
        success: summary.error == 0,
        data,
        errors,
        warnings,
        summary,
    }
}

/// Rule checks for one record; `existing` are issues found during normalization
fn check_record(
    line: usize,
    record: &CanonicalRecord,
    rules: &RuleSet,
    existing: &[RowIssue],
) -> Vec<RowIssue> {
    let mut issues = Vec::new();
    let already_flagged: HashSet<&str> = existing
        .iter()
        .filter(|i| i.is_error())
        .map(|i| i.field.as_str())
        .collect();

    let row = match record.to_row() {
        Ok(row) => row,
        Err(e) => {
            issues.push(RowIssue::new(line, "*", IssueKind::FormatError, e.to_string()));
            return issues;
        }
    };

    for field in &rules.required_fields {
        if already_flagged.contains(field.as_str()) {
            continue;
        }
        let present = match row.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            issues.push(RowIssue::new(
                line,
                field,
                IssueKind::RequiredField,
                format!("{} is required", field),
            ));
        }
    }

    for (field, allowed) in &rules.enum_whitelists {
        if let Some(Value::String(value)) = row.get(field) {
            if !allowed.iter().any(|a| a == value) {
                issues.push(
                    RowIssue::new(
                        line,
                        field,
                        IssueKind::EnumValue,
                        format!("'{}' is not one of {}", value, allowed.join(", ")),
                    )
                    .with_token(value.clone()),
                );
            }
        }
    }

    let (amount_field, amount) = record.primary_amount();
    if let Some(bounds) = rules.amount_ranges.get(amount_field) {
        let below = bounds.min.map(|min| amount < min).unwrap_or(false);
        let above = bounds.max.map(|max| amount > max).unwrap_or(false);
        if below || above {
            issues.push(RowIssue::new(
                line,
                amount_field,
                IssueKind::RangeWarning,
                format!("{} is outside the expected range", amount),
            ));
        }
    }

    if let CanonicalRecord::Project(project) = record {
        if !already_flagged.contains("designers") {
            issues.extend(check_allocations(line, &project.designers));
        }
    }

    issues
}

/// Allocation rules: percents sum to exactly 100, one entry per member,
/// bonus within [0, 20]
pub fn check_allocations(line: usize, designers: &[DesignerAllocation]) -> Vec<RowIssue> {
    let mut issues = Vec::new();

    let sum: Decimal = designers.iter().map(|d| d.percent).sum();
    if sum != Decimal::ONE_HUNDRED {
        issues.push(RowIssue::new(
            line,
            "designers",
            IssueKind::Allocation,
            format!("designer percents sum to {}, expected 100", sum.normalize()),
        ));
    }

    let mut seen = HashSet::new();
    for designer in designers {
        if !seen.insert(designer.member_id.as_str()) {
            issues.push(
                RowIssue::new(
                    line,
                    "designers",
                    IssueKind::Allocation,
                    format!("member {} is allocated more than once", designer.member_id),
                )
                .with_token(designer.member_id.clone()),
            );
        }
        if designer.bonus_pct < Decimal::ZERO || designer.bonus_pct > MAX_BONUS_PCT {
            issues.push(RowIssue::new(
                line,
                "designers",
                IssueKind::Allocation,
                format!(
                    "bonus {}% for member {} is outside [0, 20]",
                    designer.bonus_pct.normalize(),
                    designer.member_id
                ),
            ));
        }
    }

    issues
}
