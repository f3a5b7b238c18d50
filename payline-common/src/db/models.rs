//! Database models
//!
//! Reference entities are seeded externally; canonical records are produced by
//! the ingestion pipeline; settlements and their items by the calculator.
//! Every model serializes to the flat row shape stored by [`crate::store`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Reference entities
// ============================================================================

/// Designer / staff identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Amount the channel (market) fee is charged on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeBase {
    /// Net deposit after VAT and discount
    #[default]
    Net,
    /// VAT-inclusive gross amount
    Gross,
}

/// Sales-channel fee profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub ad_rate: Decimal,
    pub program_rate: Decimal,
    pub market_fee_rate: Decimal,
    #[serde(default)]
    pub fee_base: FeeBase,
}

/// Project classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Canonical records
// ============================================================================

/// Canonical record kinds, one table each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Project,
    Contact,
    Feed,
    TeamTask,
    Mileage,
    Fund,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Project,
        RecordKind::Contact,
        RecordKind::Feed,
        RecordKind::TeamTask,
        RecordKind::Mileage,
        RecordKind::Fund,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Project => "projects",
            RecordKind::Contact => "contacts",
            RecordKind::Feed => "feeds",
            RecordKind::TeamTask => "team_tasks",
            RecordKind::Mileage => "mileages",
            RecordKind::Fund => "funds",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "project" | "projects" => Ok(RecordKind::Project),
            "contact" | "contacts" => Ok(RecordKind::Contact),
            "feed" | "feeds" => Ok(RecordKind::Feed),
            "team_task" | "team_tasks" | "teamtask" | "teamtasks" => Ok(RecordKind::TeamTask),
            "mileage" | "mileages" => Ok(RecordKind::Mileage),
            "fund" | "funds" => Ok(RecordKind::Fund),
            other => Err(format!("unknown table kind '{}'", other)),
        }
    }
}

/// One member's share of a project's payout pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignerAllocation {
    pub member_id: String,
    pub percent: Decimal,
    #[serde(default)]
    pub bonus_pct: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    #[default]
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: Option<String>,
    pub client_name: Option<String>,
    pub channel_id: Option<String>,
    pub category_id: Option<String>,
    pub status: ProjectStatus,
    pub contract_date: Option<String>,
    pub settle_date: Option<String>,
    /// VAT-inclusive gross amount (T)
    pub gross_amount: Decimal,
    /// Discount applied to the net amount
    pub discount_net: Decimal,
    #[serde(default)]
    pub designers: Vec<DesignerAllocation>,
    pub memo: Option<String>,
}

impl Project {
    /// Date that places the project in a settlement period
    pub fn settlement_date(&self) -> Option<&str> {
        self.settle_date.as_deref().or(self.contract_date.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactEventType {
    Consult,
    Visit,
    Contract,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub member_id: Option<String>,
    pub project_id: Option<String>,
    /// Project title as written in the source; resolved to `project_id` at write time
    #[serde(skip)]
    pub project_label: Option<String>,
    pub event_date: Option<String>,
    pub event_type: ContactEventType,
    pub amount: Decimal,
    pub paid: bool,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    Post,
    Review,
    Video,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub member_id: Option<String>,
    pub feed_date: Option<String>,
    pub feed_type: FeedType,
    pub amount: Decimal,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTask {
    pub id: String,
    pub member_id: Option<String>,
    pub task_date: Option<String>,
    pub title: Option<String>,
    pub status: TaskStatus,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mileage {
    pub id: String,
    pub member_id: Option<String>,
    pub trip_date: Option<String>,
    pub distance_km: Option<Decimal>,
    pub amount: Decimal,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundType {
    Income,
    #[default]
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fund {
    pub id: String,
    pub fund_date: Option<String>,
    pub fund_type: FundType,
    pub amount: Decimal,
    pub member_id: Option<String>,
    pub memo: Option<String>,
}

// ============================================================================
// Settlements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Draft,
    Locked,
}

/// One settlement per calendar period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: String,
    pub period: String,
    pub status: SettlementStatus,
    pub created_at: String,
    #[serde(default)]
    pub locked_at: Option<String>,
}

/// Source table a settlement item was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Project,
    Contact,
    Feed,
    TeamTask,
    Mileage,
}

impl SourceType {
    pub fn table(&self) -> &'static str {
        match self {
            SourceType::Project => "projects",
            SourceType::Contact => "contacts",
            SourceType::Feed => "feeds",
            SourceType::TeamTask => "team_tasks",
            SourceType::Mileage => "mileages",
        }
    }
}

/// One payout line per (source, designer) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementItem {
    pub id: String,
    pub settlement_id: String,
    pub member_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub gross: Decimal,
    pub net: Decimal,
    pub before_withholding: Decimal,
    pub withholding_tax: Decimal,
    pub after_withholding: Decimal,
    #[serde(default)]
    pub paid: bool,
}
