//! `backup`, `rollback`, `validate-backup`, `list-backups`

use std::fmt;

use super::AppContext;
use crate::backup::{BackupValidation, CheckStatus, RestoreReport, SnapshotInfo};
use crate::error::EtlResult;

impl fmt::Display for SnapshotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} {}  {:>2} tables {:>8} rows  {}",
            self.name,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.metadata.table_count,
            self.metadata.total_rows,
            self.path.display()
        )
    }
}

impl fmt::Display for BackupValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Snapshot {}", self.snapshot)?;
        for table in &self.tables {
            let status = match table.status {
                CheckStatus::Pass => "PASS",
                CheckStatus::Fail => "FAIL",
            };
            let live = if table.matches_live { "matches live" } else { "differs from live" };
            writeln!(f, "  {} {:<17} {:>7} rows  {}", status, table.table, table.rows, live)?;
        }
        write!(f, "Result: {}", if self.passed() { "PASS" } else { "FAIL" })
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Restored {}", self.snapshot)?;
        for (table, deleted, restored) in &self.tables {
            write!(f, "\n  {:<17} {:>7} removed {:>7} restored", table, deleted, restored)?;
        }
        Ok(())
    }
}

/// Snapshot listing, newest first
#[derive(Debug, Clone)]
pub struct BackupList(pub Vec<SnapshotInfo>);

impl fmt::Display for BackupList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "No backups found");
        }
        let lines: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// `backup --name`
pub async fn run_backup(ctx: &AppContext, name: &str) -> EtlResult<SnapshotInfo> {
    ctx.backup_manager().backup(name).await
}

/// `rollback --name`
pub async fn run_rollback(ctx: &AppContext, name: &str) -> EtlResult<RestoreReport> {
    ctx.backup_manager().restore(name).await
}

/// `validate-backup --name`
pub async fn run_validate_backup(ctx: &AppContext, name: &str) -> EtlResult<BackupValidation> {
    ctx.backup_manager().validate(name).await
}

/// `list-backups`
pub fn run_list_backups(ctx: &AppContext) -> EtlResult<BackupList> {
    Ok(BackupList(ctx.backup_manager().list()?))
}
