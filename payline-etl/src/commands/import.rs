//! `import` and `migrate`

use payline_common::db::models::RecordKind;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::references::{create_missing_references, run_clear, run_seed, ClearReport, SeedReport};
use super::AppContext;
use crate::backup::SnapshotInfo;
use crate::diagnostics::RowIssue;
use crate::error::{EtlError, EtlResult};
use crate::ingest::{ingest_table, kind_for_path, read_table, RawTable};
use crate::persistence::{BatchResult, BatchWriter};
use crate::resolver::ReferenceKind;
use crate::validation::{validate, RuleSet, ValidationSummary};

/// Snapshot name taken before every migration
pub const PRE_MIGRATE_BACKUP: &str = "pre-migrate";

/// Outcome of importing one sheet
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub source: String,
    pub kind: RecordKind,
    pub dry_run: bool,
    pub ignored_columns: Vec<String>,
    /// References created for unresolved tokens
    pub created_references: Vec<(ReferenceKind, String)>,
    pub summary: ValidationSummary,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
    /// `None` on a dry run
    pub batch: Option<BatchResult>,
}

impl ImportReport {
    pub fn inserted(&self) -> usize {
        self.batch.as_ref().map(|b| b.inserted_count).unwrap_or(0)
    }

    /// Rows rejected by validation or by the store
    pub fn failed(&self) -> usize {
        self.summary.error + self.batch.as_ref().map(|b| b.errors.len()).unwrap_or(0)
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "{} -> {}{}", self.source, self.kind, mode)?;
        write!(
            f,
            "  rows: {} total, {} accepted, {} rejected, {} with warnings, {} blank",
            self.summary.total,
            self.summary.success,
            self.summary.error,
            self.summary.warning,
            self.summary.skipped
        )?;
        if let Some(batch) = &self.batch {
            write!(f, "\n  inserted: {}", batch.inserted_count)?;
        }
        if !self.ignored_columns.is_empty() {
            write!(f, "\n  ignored columns: {}", self.ignored_columns.join(", "))?;
        }
        for (kind, token) in &self.created_references {
            write!(f, "\n  created {}: {}", kind, token)?;
        }
        for issue in &self.errors {
            write!(f, "\n  ERROR   {}", issue)?;
        }
        for issue in &self.warnings {
            write!(f, "\n  WARNING {}", issue)?;
        }
        if let Some(batch) = &self.batch {
            for failure in &batch.errors {
                write!(f, "\n  FAILED  record #{}: {}", failure.index, failure.error)?;
            }
        }
        Ok(())
    }
}

/// Normalize, validate and (unless `dry_run`) persist one parsed sheet
pub async fn import_table(
    ctx: &AppContext,
    table: &RawTable,
    kind: RecordKind,
    source: &str,
    dry_run: bool,
) -> EtlResult<ImportReport> {
    let normalizer = ctx.normalizer();
    let mut resolver = ctx.resolver().await?;
    let mut output = ingest_table(table, kind, &resolver, &normalizer);

    let mut created_references = Vec::new();
    if ctx.config.create_missing_references {
        let missing = output.missing_references();
        if !missing.is_empty() {
            if dry_run {
                info!(count = missing.len(), "Dry run: missing references would be created");
            } else {
                created_references = create_missing_references(ctx, &missing).await?;
                resolver = ctx.resolver().await?;
                output = ingest_table(table, kind, &resolver, &normalizer);
            }
        }
    }

    let ignored_columns = output.ignored_columns.clone();
    let validation = validate(output, &RuleSet::from_config(kind, &ctx.config));

    let batch = if dry_run {
        None
    } else {
        let writer = BatchWriter::new(ctx.store(), &resolver)
            .with_chunk_size(ctx.config.chunk_size)
            .with_max_lock_wait_ms(ctx.config.max_lock_wait_ms);
        Some(writer.write(kind, &validation.data).await)
    };

    Ok(ImportReport {
        source: source.to_string(),
        kind,
        dry_run,
        ignored_columns,
        created_references,
        summary: validation.summary,
        errors: validation.errors,
        warnings: validation.warnings,
        batch,
    })
}

/// `import --file --table [--dry-run]`
pub async fn run_import(
    ctx: &AppContext,
    file: &Path,
    kind: RecordKind,
    dry_run: bool,
) -> EtlResult<ImportReport> {
    let table = read_table(file)?;
    let report = import_table(ctx, &table, kind, &file.display().to_string(), dry_run).await?;
    info!(
        file = %file.display(),
        kind = %kind,
        inserted = report.inserted(),
        failed = report.failed(),
        "Import complete"
    );
    Ok(report)
}

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    pub input_dir: PathBuf,
    pub seed: bool,
    pub clear: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MigrateReport {
    pub backup: Option<SnapshotInfo>,
    pub seed: Option<SeedReport>,
    pub cleared: Option<ClearReport>,
    pub imports: Vec<ImportReport>,
    /// Files whose record kind could not be determined
    pub unrecognized: Vec<PathBuf>,
}

impl fmt::Display for MigrateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(backup) = &self.backup {
            writeln!(f, "Safety backup: {}", backup.path.display())?;
        }
        if let Some(cleared) = &self.cleared {
            writeln!(f, "{}", cleared)?;
        }
        if let Some(seed) = &self.seed {
            writeln!(f, "{}", seed)?;
        }
        for import in &self.imports {
            writeln!(f, "{}", import)?;
        }
        for path in &self.unrecognized {
            writeln!(f, "Skipped (unknown table): {}", path.display())?;
        }
        let inserted: usize = self.imports.iter().map(ImportReport::inserted).sum();
        let failed: usize = self.imports.iter().map(ImportReport::failed).sum();
        write!(
            f,
            "Migration: {} files, {} records inserted, {} rejected",
            self.imports.len(),
            inserted,
            failed
        )
    }
}

/// Input sheets under a directory, in dependency order of their kinds
fn discover_inputs(dir: &Path) -> EtlResult<(Vec<(RecordKind, PathBuf)>, Vec<PathBuf>)> {
    let mut inputs = Vec::new();
    let mut unrecognized = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_sheet = matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .as_deref(),
            Some("csv") | Some("tsv") | Some("tab")
        );
        if !path.is_file() || !is_sheet {
            continue;
        }
        match kind_for_path(&path) {
            Some(kind) => inputs.push((kind, path)),
            None => unrecognized.push(path),
        }
    }

    inputs.sort();
    unrecognized.sort();
    Ok((inputs, unrecognized))
}

/// `migrate --input-dir [--seed] [--clear] [--dry-run]`
///
/// Runs clear, then seed, then one import per sheet.
///
/// Takes a `pre-migrate` snapshot first (not on a dry run) and restores it
/// if the run fails with an error. Row-level rejections are not errors.
pub async fn run_migrate(ctx: &AppContext, options: &MigrateOptions) -> EtlResult<MigrateReport> {
    if !options.input_dir.is_dir() {
        return Err(EtlError::Configuration(format!(
            "Input directory not found: {}",
            options.input_dir.display()
        )));
    }
    let (inputs, unrecognized) = discover_inputs(&options.input_dir)?;
    if inputs.is_empty() {
        warn!(dir = %options.input_dir.display(), "No importable sheets found");
    }

    let mut report = MigrateReport {
        unrecognized,
        ..Default::default()
    };

    if options.dry_run {
        if options.seed || options.clear {
            warn!("Dry run: --seed and --clear are not applied");
        }
    } else {
        report.backup = Some(ctx.backup_manager().backup(PRE_MIGRATE_BACKUP).await?);
    }

    match migrate_steps(ctx, options, &inputs, &mut report).await {
        Ok(()) => {
            info!(files = report.imports.len(), "Migration complete");
            Ok(report)
        }
        Err(e) => {
            error!(error = %e, "Migration failed");
            if let Some(backup) = &report.backup {
                warn!(snapshot = %backup.name, "Restoring pre-migration snapshot");
                // The migration error is the one reported, even if the rollback fails too
                if let Err(restore_err) = ctx.backup_manager().restore(&backup.name).await {
                    error!(
                        snapshot = %backup.name,
                        error = %restore_err,
                        "Could not restore pre-migration snapshot; restore it with `rollback`"
                    );
                }
            }
            Err(e)
        }
    }
}

async fn migrate_steps(
    ctx: &AppContext,
    options: &MigrateOptions,
    inputs: &[(RecordKind, PathBuf)],
    report: &mut MigrateReport,
) -> EtlResult<()> {
    if !options.dry_run {
        if options.clear {
            report.cleared = Some(run_clear(ctx, true).await?);
        }
        if options.seed {
            report.seed = Some(run_seed(ctx, None).await?);
        }
    }

    for (kind, path) in inputs {
        let table = read_table(path)?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        report
            .imports
            .push(import_table(ctx, &table, *kind, &source, options.dry_run).await?);
    }
    Ok(())
}
