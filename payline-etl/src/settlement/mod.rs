//! Settlement assembly
//!
//! Builds the payout items for one calendar period from the qualifying
//! source records, and manages the Draft -> Locked lifecycle of the period's
//! settlement. Item ids are derived from (settlement, source, member) so a
//! forced recomputation over unchanged sources reproduces the same item set.

pub mod calculator;

pub use calculator::{
    designer_payout, project_fees, round_won, withhold, FeeProfile, ProjectFees, Withholding,
};

use payline_common::config::TomlConfig;
use payline_common::db::models::{
    Channel, Contact, Feed, Mileage, Project, ProjectStatus, Settlement, SettlementItem,
    SettlementStatus, SourceType, TaskStatus, TeamTask,
};
use payline_common::db::table_schemas::{
    CHANNELS, CONTACTS, FEEDS, MILEAGES, PROJECTS, SETTLEMENTS, SETTLEMENT_ITEMS, TEAM_TASKS,
};
use payline_common::store::{from_row, from_rows, to_row};
use payline_common::time::{self, Period};
use payline_common::{Filter, Row, RowStore};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EtlError, EtlResult};

/// What `generate` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// First computation for the period
    Created,
    /// Items replaced (forced, or a Draft without items)
    Recomputed,
    /// Draft already had items and `force` was not given; nothing changed
    AlreadyGenerated,
}

/// Result of a settlement run
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub outcome: GenerateOutcome,
    pub settlement: Settlement,
    pub items: Vec<SettlementItem>,
    /// Source rows that could not be read, as `table:id` or `table:#n`
    pub skipped_sources: Vec<String>,
}

impl SettlementReport {
    pub fn total_before(&self) -> Decimal {
        self.items.iter().map(|i| i.before_withholding).sum()
    }

    pub fn total_tax(&self) -> Decimal {
        self.items.iter().map(|i| i.withholding_tax).sum()
    }

    pub fn total_after(&self) -> Decimal {
        self.items.iter().map(|i| i.after_withholding).sum()
    }

    /// Net payout per member, sorted by member id
    pub fn per_member(&self) -> Vec<(String, Decimal)> {
        let mut totals: HashMap<&str, Decimal> = HashMap::new();
        for item in &self.items {
            *totals.entry(item.member_id.as_str()).or_default() += item.after_withholding;
        }
        let mut totals: Vec<(String, Decimal)> =
            totals.into_iter().map(|(m, t)| (m.to_string(), t)).collect();
        totals.sort();
        totals
    }
}

/// Settlement generation and locking over a row store
pub struct SettlementService<'a> {
    store: &'a dyn RowStore,
    default_ad_rate: Decimal,
    default_program_rate: Decimal,
}

impl<'a> SettlementService<'a> {
    pub fn new(store: &'a dyn RowStore, config: &TomlConfig) -> Self {
        Self {
            store,
            default_ad_rate: config.default_ad_rate,
            default_program_rate: config.default_program_rate,
        }
    }

    /// Settlement row for a period, if one exists
    pub async fn find(&self, period: Period) -> EtlResult<Option<Settlement>> {
        let rows = self
            .store
            .select(SETTLEMENTS, &Filter::eq("period", period.to_string()))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Stored items of a settlement
    pub async fn items(&self, settlement_id: &str) -> EtlResult<Vec<SettlementItem>> {
        let rows = self
            .store
            .select(SETTLEMENT_ITEMS, &Filter::eq("settlement_id", settlement_id))
            .await?;
        Ok(from_rows(rows)?)
    }

    /// Generate (or regenerate with `force`) the settlement for a period
    pub async fn generate(&self, period: Period, force: bool) -> EtlResult<SettlementReport> {
        let existing = self.find(period).await?;

        let (settlement, outcome) = match existing {
            Some(settlement) if settlement.status == SettlementStatus::Locked => {
                warn!(period = %period, "Refusing to regenerate a locked settlement");
                return Err(EtlError::SettlementLocked(period.to_string()));
            }
            Some(settlement) => {
                let current = self.items(&settlement.id).await?;
                if !current.is_empty() && !force {
                    info!(period = %period, items = current.len(), "Settlement already generated");
                    return Ok(SettlementReport {
                        outcome: GenerateOutcome::AlreadyGenerated,
                        settlement,
                        items: current,
                        skipped_sources: Vec::new(),
                    });
                }
                (settlement, GenerateOutcome::Recomputed)
            }
            None => {
                let settlement = Settlement {
                    id: Uuid::new_v4().to_string(),
                    period: period.to_string(),
                    status: SettlementStatus::Draft,
                    created_at: time::now().to_rfc3339(),
                    locked_at: None,
                };
                self.store.insert(SETTLEMENTS, &[to_row(&settlement)?]).await?;
                (settlement, GenerateOutcome::Created)
            }
        };

        let (items, skipped_sources) = self.compute_items(&settlement.id, period).await?;
        let rows = items.iter().map(to_row).collect::<payline_common::Result<Vec<Row>>>()?;
        self.store
            .replace(
                SETTLEMENT_ITEMS,
                &Filter::eq("settlement_id", settlement.id.as_str()),
                &rows,
            )
            .await?;

        let report = SettlementReport {
            outcome,
            settlement,
            items,
            skipped_sources,
        };
        info!(
            period = %period,
            outcome = ?report.outcome,
            items = report.items.len(),
            total_after = %report.total_after(),
            "Settlement generated"
        );
        Ok(report)
    }

    /// Lock the period's settlement; locked settlements are terminal
    pub async fn lock(&self, period: Period) -> EtlResult<Settlement> {
        let mut settlement = self.find(period).await?.ok_or_else(|| {
            EtlError::Configuration(format!("No settlement exists for period {}", period))
        })?;

        if settlement.status == SettlementStatus::Locked {
            return Err(EtlError::SettlementLocked(period.to_string()));
        }

        settlement.status = SettlementStatus::Locked;
        settlement.locked_at = Some(time::now().to_rfc3339());
        self.store
            .upsert(SETTLEMENTS, &[to_row(&settlement)?], "id")
            .await?;
        info!(period = %period, "Settlement locked");
        Ok(settlement)
    }

    /// Items for every qualifying source in the period, without writing
    pub async fn compute_items(
        &self,
        settlement_id: &str,
        period: Period,
    ) -> EtlResult<(Vec<SettlementItem>, Vec<String>)> {
        let mut skipped = Vec::new();
        let mut items = Vec::new();

        let channels: HashMap<String, Channel> = self
            .load::<Channel>(CHANNELS, &Filter::All, &mut skipped)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let projects = self.load::<Project>(PROJECTS, &Filter::All, &mut skipped).await?;
        for project in projects {
            if project.status == ProjectStatus::Cancelled {
                continue;
            }
            if !project.settlement_date().map(|d| period.contains_iso(d)).unwrap_or(false) {
                continue;
            }
            let profile = match project.channel_id.as_deref().and_then(|id| channels.get(id)) {
                Some(channel) => FeeProfile::from_channel(channel),
                None => {
                    if let Some(id) = &project.channel_id {
                        warn!(project = %project.id, channel = %id, "Unknown channel, using default rates");
                    }
                    FeeProfile::without_channel(self.default_ad_rate, self.default_program_rate)
                }
            };
            let fees = project_fees(project.gross_amount, project.discount_net, &profile);
            for allocation in &project.designers {
                let payout = designer_payout(&fees, allocation);
                items.push(item(
                    settlement_id,
                    &allocation.member_id,
                    SourceType::Project,
                    &project.id,
                    fees.gross,
                    fees.net,
                    payout.withholding,
                    false,
                ));
            }
        }

        let in_period = |column: &str| {
            Filter::gte(column, period.first_day().format("%Y-%m-%d").to_string())
                .and(Filter::lt(column, period.next_first_day().format("%Y-%m-%d").to_string()))
        };

        for contact in self.load::<Contact>(CONTACTS, &in_period("event_date"), &mut skipped).await? {
            push_flat(&mut items, settlement_id, SourceType::Contact, &contact.id, contact.member_id.as_deref(), contact.amount, contact.paid);
        }
        for feed in self.load::<Feed>(FEEDS, &in_period("feed_date"), &mut skipped).await? {
            push_flat(&mut items, settlement_id, SourceType::Feed, &feed.id, feed.member_id.as_deref(), feed.amount, false);
        }
        for task in self.load::<TeamTask>(TEAM_TASKS, &in_period("task_date"), &mut skipped).await? {
            if task.status != TaskStatus::Done {
                continue;
            }
            push_flat(&mut items, settlement_id, SourceType::TeamTask, &task.id, task.member_id.as_deref(), task.amount, false);
        }
        for trip in self.load::<Mileage>(MILEAGES, &in_period("trip_date"), &mut skipped).await? {
            push_flat(&mut items, settlement_id, SourceType::Mileage, &trip.id, trip.member_id.as_deref(), trip.amount, false);
        }

        // Zero payouts carry no information
        items.retain(|i: &SettlementItem| !i.before_withholding.is_zero());
        Ok((items, skipped))
    }

    async fn load<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &Filter,
        skipped: &mut Vec<String>,
    ) -> EtlResult<Vec<T>> {
        let rows = self.store.select(table, filter).await?;
        let mut records = Vec::with_capacity(rows.len());
        for (n, row) in rows.into_iter().enumerate() {
            let label = row
                .get("id")
                .and_then(|v| v.as_str())
                .map(|id| format!("{}:{}", table, id))
                .unwrap_or_else(|| format!("{}:#{}", table, n));
            match from_row::<T>(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(source = %label, error = %e, "Skipping unreadable source row");
                    skipped.push(label);
                }
            }
        }
        Ok(records)
    }
}

#[allow(clippy::too_many_arguments)]
fn item(
    settlement_id: &str,
    member_id: &str,
    source_type: SourceType,
    source_id: &str,
    gross: Decimal,
    net: Decimal,
    withholding: Withholding,
    paid: bool,
) -> SettlementItem {
    let source_key = serde_json::to_value(source_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| source_type.table().to_string());
    SettlementItem {
        id: format!("{}:{}:{}:{}", settlement_id, source_key, source_id, member_id),
        settlement_id: settlement_id.to_string(),
        member_id: member_id.to_string(),
        source_type,
        source_id: source_id.to_string(),
        // Stored as REAL; whole won survives the f64 round trip
        gross: round_won(gross),
        net: round_won(net),
        before_withholding: withholding.before_withholding,
        withholding_tax: withholding.withholding_tax,
        after_withholding: withholding.after_withholding,
        paid,
    }
}

fn push_flat(
    items: &mut Vec<SettlementItem>,
    settlement_id: &str,
    source_type: SourceType,
    source_id: &str,
    member_id: Option<&str>,
    amount: Decimal,
    paid: bool,
) {
    let Some(member_id) = member_id else {
        return;
    };
    items.push(item(
        settlement_id,
        member_id,
        source_type,
        source_id,
        amount,
        amount,
        withhold(amount),
        paid,
    ));
}
