//! Canonical record construction
//!
//! Turns one raw row into a typed record of the requested kind. Field-level
//! problems (unresolved references, unparseable dates) are collected on the
//! row instead of failing it here; the validation engine decides acceptance.

use payline_common::config::ColumnFamily;
use payline_common::db::models::{
    Contact, DesignerAllocation, Feed, Fund, Mileage, Project, RecordKind, TeamTask,
};
use payline_common::store::to_row;
use payline_common::Row;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::columns::{ColumnMap, DesignerColumn};
use super::normalize::{
    parse_amount, parse_date, BoolTokens, EnumTable, CONTACT_EVENT, FEED_TYPE, FUND_TYPE,
    PROJECT_STATUS, TASK_STATUS,
};
use super::reader::RawRecord;
use crate::diagnostics::{IssueKind, RowIssue};
use crate::resolver::{NotFound, ReferenceKind, ReferenceResolver};

/// Typed record of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRecord {
    Project(Project),
    Contact(Contact),
    Feed(Feed),
    TeamTask(TeamTask),
    Mileage(Mileage),
    Fund(Fund),
}

impl CanonicalRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            CanonicalRecord::Project(_) => RecordKind::Project,
            CanonicalRecord::Contact(_) => RecordKind::Contact,
            CanonicalRecord::Feed(_) => RecordKind::Feed,
            CanonicalRecord::TeamTask(_) => RecordKind::TeamTask,
            CanonicalRecord::Mileage(_) => RecordKind::Mileage,
            CanonicalRecord::Fund(_) => RecordKind::Fund,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CanonicalRecord::Project(r) => &r.id,
            CanonicalRecord::Contact(r) => &r.id,
            CanonicalRecord::Feed(r) => &r.id,
            CanonicalRecord::TeamTask(r) => &r.id,
            CanonicalRecord::Mileage(r) => &r.id,
            CanonicalRecord::Fund(r) => &r.id,
        }
    }

    /// Flat row as stored
    pub fn to_row(&self) -> payline_common::Result<Row> {
        match self {
            CanonicalRecord::Project(r) => to_row(r),
            CanonicalRecord::Contact(r) => to_row(r),
            CanonicalRecord::Feed(r) => to_row(r),
            CanonicalRecord::TeamTask(r) => to_row(r),
            CanonicalRecord::Mileage(r) => to_row(r),
            CanonicalRecord::Fund(r) => to_row(r),
        }
    }

    /// Field checked against the advisory amount range
    pub fn primary_amount(&self) -> (&'static str, Decimal) {
        match self {
            CanonicalRecord::Project(r) => ("gross_amount", r.gross_amount),
            CanonicalRecord::Contact(r) => ("amount", r.amount),
            CanonicalRecord::Feed(r) => ("amount", r.amount),
            CanonicalRecord::TeamTask(r) => ("amount", r.amount),
            CanonicalRecord::Mileage(r) => ("amount", r.amount),
            CanonicalRecord::Fund(r) => ("amount", r.amount),
        }
    }

    /// Label-based references still waiting for resolution
    pub fn pending_labels(&self) -> Vec<(ReferenceKind, &str)> {
        match self {
            CanonicalRecord::Contact(c) if c.project_id.is_none() => c
                .project_label
                .as_deref()
                .map(|label| vec![(ReferenceKind::Project, label)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

/// Designer column with its header token already resolved
#[derive(Debug, Clone)]
pub struct ResolvedDesignerColumn {
    pub column: DesignerColumn,
    pub member: Result<String, NotFound>,
}

/// Per-row builder state
pub(crate) struct RowContext<'a> {
    record: &'a RawRecord,
    columns: &'a ColumnMap,
    designer_columns: &'a [ResolvedDesignerColumn],
    resolver: &'a ReferenceResolver,
    booleans: &'a BoolTokens,
    pub(crate) issues: Vec<RowIssue>,
}

impl<'a> RowContext<'a> {
    pub(crate) fn new(
        record: &'a RawRecord,
        columns: &'a ColumnMap,
        designer_columns: &'a [ResolvedDesignerColumn],
        resolver: &'a ReferenceResolver,
        booleans: &'a BoolTokens,
    ) -> Self {
        Self {
            record,
            columns,
            designer_columns,
            resolver,
            booleans,
            issues: Vec::new(),
        }
    }

    fn cell(&self, field: &str) -> Option<&'a str> {
        self.columns
            .index(field)
            .and_then(|index| self.record.cell(index))
    }

    fn text(&self, field: &str) -> Option<String> {
        self.cell(field).map(str::to_string)
    }

    fn amount(&self, field: &str) -> Decimal {
        self.cell(field).map(parse_amount).unwrap_or(Decimal::ZERO)
    }

    fn optional_amount(&self, field: &str) -> Option<Decimal> {
        self.cell(field).map(parse_amount)
    }

    fn flag(&self, field: &str) -> bool {
        self.cell(field)
            .map(|cell| self.booleans.parse(cell))
            .unwrap_or(false)
    }

    fn enumerated<T: Copy + 'static>(&self, field: &str, table: &EnumTable<T>) -> T {
        self.cell(field)
            .map(|cell| table.resolve(cell))
            .unwrap_or_else(|| table.fallback())
    }

    fn date(&mut self, field: &str) -> Option<String> {
        let cell = self.cell(field)?;
        match parse_date(cell) {
            Ok(date) => Some(date),
            Err(e) => {
                self.issues.push(
                    RowIssue::new(self.record.line, field, IssueKind::FormatError, e.to_string())
                        .with_token(cell),
                );
                None
            }
        }
    }

    /// Resolve a reference cell; `target` names the model field for diagnostics
    fn reference(&mut self, field: &str, target: &str, kind: ReferenceKind) -> Option<String> {
        let cell = self.cell(field)?;
        match self.resolver.resolve(kind, cell) {
            Ok(id) => Some(id.to_string()),
            Err(e) => {
                self.issues.push(
                    RowIssue::new(self.record.line, target, IssueKind::MappingError, e.to_string())
                        .with_token(e.token),
                );
                None
            }
        }
    }

    fn record_id(&self) -> String {
        self.text("id")
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Merge share/bonus columns into allocations; members with no positive
    /// share are dropped. A single `designer` column is a 100% allocation.
    fn designers(&mut self) -> Vec<DesignerAllocation> {
        if !self.columns.has_share_columns() {
            return self
                .reference("designer", "designers", ReferenceKind::Member)
                .map(|member_id| {
                    vec![DesignerAllocation {
                        member_id,
                        percent: Decimal::ONE_HUNDRED,
                        bonus_pct: Decimal::ZERO,
                    }]
                })
                .unwrap_or_default();
        }

        // (member, percent, bonus) in first-seen order; a second share for the
        // same member opens a second entry so validation sees the duplicate
        let mut merged: Vec<(String, Option<Decimal>, Option<Decimal>)> = Vec::new();

        for resolved in self.designer_columns {
            let Some(cell) = self.record.cell(resolved.column.index) else {
                continue;
            };
            let value = parse_amount(cell);

            let member_id = match &resolved.member {
                Ok(id) => id.clone(),
                Err(e) => {
                    if !value.is_zero() {
                        self.issues.push(
                            RowIssue::new(
                                self.record.line,
                                "designers",
                                IssueKind::MappingError,
                                e.to_string(),
                            )
                            .with_token(e.token.clone()),
                        );
                    }
                    continue;
                }
            };

            match resolved.column.family {
                ColumnFamily::Share => {
                    match merged
                        .iter_mut()
                        .find(|(m, percent, _)| *m == member_id && percent.is_none())
                    {
                        Some(entry) => entry.1 = Some(value),
                        None => merged.push((member_id, Some(value), None)),
                    }
                }
                ColumnFamily::Bonus => {
                    match merged.iter_mut().find(|(m, _, bonus)| *m == member_id && bonus.is_none()) {
                        Some(entry) => entry.2 = Some(value),
                        None => merged.push((member_id, None, Some(value))),
                    }
                }
            }
        }

        merged
            .into_iter()
            .filter_map(|(member_id, percent, bonus)| {
                let percent = percent.filter(|p| *p > Decimal::ZERO)?;
                Some(DesignerAllocation {
                    member_id,
                    percent,
                    bonus_pct: bonus.unwrap_or(Decimal::ZERO),
                })
            })
            .collect()
    }
}

/// Build one record of `kind` from the row
pub(crate) fn build_record(kind: RecordKind, ctx: &mut RowContext<'_>) -> CanonicalRecord {
    match kind {
        RecordKind::Project => CanonicalRecord::Project(build_project(ctx)),
        RecordKind::Contact => CanonicalRecord::Contact(build_contact(ctx)),
        RecordKind::Feed => CanonicalRecord::Feed(build_feed(ctx)),
        RecordKind::TeamTask => CanonicalRecord::TeamTask(build_team_task(ctx)),
        RecordKind::Mileage => CanonicalRecord::Mileage(build_mileage(ctx)),
        RecordKind::Fund => CanonicalRecord::Fund(build_fund(ctx)),
    }
}

fn build_project(ctx: &mut RowContext<'_>) -> Project {
    Project {
        id: ctx.record_id(),
        title: ctx.text("title"),
        client_name: ctx.text("client_name"),
        channel_id: ctx.reference("channel", "channel_id", ReferenceKind::Channel),
        category_id: ctx.reference("category", "category_id", ReferenceKind::Category),
        status: ctx.enumerated("status", &PROJECT_STATUS),
        contract_date: ctx.date("contract_date"),
        settle_date: ctx.date("settle_date"),
        gross_amount: ctx.amount("gross_amount"),
        discount_net: ctx.amount("discount_net"),
        designers: ctx.designers(),
        memo: ctx.text("memo"),
    }
}

fn build_contact(ctx: &mut RowContext<'_>) -> Contact {
    Contact {
        id: ctx.record_id(),
        member_id: ctx.reference("member", "member_id", ReferenceKind::Member),
        project_id: None,
        project_label: ctx.text("project"),
        event_date: ctx.date("event_date"),
        event_type: ctx.enumerated("event_type", &CONTACT_EVENT),
        amount: ctx.amount("amount"),
        paid: ctx.flag("paid"),
        memo: ctx.text("memo"),
    }
}

fn build_feed(ctx: &mut RowContext<'_>) -> Feed {
    Feed {
        id: ctx.record_id(),
        member_id: ctx.reference("member", "member_id", ReferenceKind::Member),
        feed_date: ctx.date("feed_date"),
        feed_type: ctx.enumerated("feed_type", &FEED_TYPE),
        amount: ctx.amount("amount"),
        content: ctx.text("content"),
    }
}

fn build_team_task(ctx: &mut RowContext<'_>) -> TeamTask {
    TeamTask {
        id: ctx.record_id(),
        member_id: ctx.reference("member", "member_id", ReferenceKind::Member),
        task_date: ctx.date("task_date"),
        title: ctx.text("title"),
        status: ctx.enumerated("status", &TASK_STATUS),
        amount: ctx.amount("amount"),
    }
}

fn build_mileage(ctx: &mut RowContext<'_>) -> Mileage {
    Mileage {
        id: ctx.record_id(),
        member_id: ctx.reference("member", "member_id", ReferenceKind::Member),
        trip_date: ctx.date("trip_date"),
        distance_km: ctx.optional_amount("distance_km"),
        amount: ctx.amount("amount"),
        purpose: ctx.text("purpose"),
    }
}

fn build_fund(ctx: &mut RowContext<'_>) -> Fund {
    Fund {
        id: ctx.record_id(),
        fund_date: ctx.date("fund_date"),
        fund_type: ctx.enumerated("fund_type", &FUND_TYPE),
        amount: ctx.amount("amount"),
        member_id: ctx.reference("member", "member_id", ReferenceKind::Member),
        memo: ctx.text("memo"),
    }
}
