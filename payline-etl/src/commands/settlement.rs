//! `generate-settlement` and `lock-settlement`

use payline_common::db::models::{Settlement, SettlementStatus};
use payline_common::time::Period;
use std::collections::HashMap;
use std::fmt;

use super::AppContext;
use crate::error::{EtlError, EtlResult};
use crate::resolver::ReferenceKind;
use crate::settlement::{GenerateOutcome, SettlementReport, SettlementService};

fn parse_period(text: &str) -> EtlResult<Period> {
    Period::parse(text).map_err(|e| EtlError::Configuration(e.to_string()))
}

/// Settlement report with member display names
#[derive(Debug, Clone)]
pub struct SettlementSummary {
    pub report: SettlementReport,
    pub member_names: HashMap<String, String>,
}

impl fmt::Display for SettlementSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.report;
        let status = match report.settlement.status {
            SettlementStatus::Draft => "draft",
            SettlementStatus::Locked => "locked",
        };
        let outcome = match report.outcome {
            GenerateOutcome::Created => "generated",
            GenerateOutcome::Recomputed => "recomputed",
            GenerateOutcome::AlreadyGenerated => "already generated (use --force to recompute)",
        };
        writeln!(f, "Settlement {} [{}]: {}", report.settlement.period, status, outcome)?;
        writeln!(f, "  items: {}", report.items.len())?;
        writeln!(f, "  before withholding: {}", report.total_before())?;
        writeln!(f, "  withholding tax:    {}", report.total_tax())?;
        write!(f, "  after withholding:  {}", report.total_after())?;
        for (member_id, total) in report.per_member() {
            let name = self
                .member_names
                .get(&member_id)
                .map(String::as_str)
                .unwrap_or(member_id.as_str());
            write!(f, "\n    {:<16} {:>14}", name, total)?;
        }
        for source in &report.skipped_sources {
            write!(f, "\n  skipped unreadable source {}", source)?;
        }
        Ok(())
    }
}

/// `generate-settlement --period [--force]`
pub async fn run_generate_settlement(
    ctx: &AppContext,
    period: &str,
    force: bool,
) -> EtlResult<SettlementSummary> {
    let period = parse_period(period)?;
    let service = SettlementService::new(ctx.store(), &ctx.config);
    let report = service.generate(period, force).await?;

    let resolver = ctx.resolver().await?;
    let member_names = report
        .items
        .iter()
        .filter_map(|item| {
            resolver
                .name_of(ReferenceKind::Member, &item.member_id)
                .map(|name| (item.member_id.clone(), name.to_string()))
        })
        .collect();

    Ok(SettlementSummary {
        report,
        member_names,
    })
}

/// `lock-settlement --period`
pub async fn run_lock_settlement(ctx: &AppContext, period: &str) -> EtlResult<Settlement> {
    let period = parse_period(period)?;
    SettlementService::new(ctx.store(), &ctx.config)
        .lock(period)
        .await
}
