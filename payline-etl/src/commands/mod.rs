//! Command layer
//!
//! One function per CLI subcommand. Each takes the shared [`AppContext`],
//! does its pre-flight checks (returning [`EtlError::Configuration`] on
//! failure) and returns a report the binary prints. Row-level problems are
//! part of the report, never an error.

pub mod backup;
pub mod import;
pub mod references;
pub mod settlement;

pub use backup::{run_backup, run_list_backups, run_rollback, run_validate_backup, BackupList};
pub use import::{
    import_table, run_import, run_migrate, ImportReport, MigrateOptions, MigrateReport, PRE_MIGRATE_BACKUP,
};
pub use references::{
    apply_seed, create_missing_references, run_clear, run_seed, run_test, ClearReport, ConnectionReport,
    SeedDocument, SeedReport,
};
pub use settlement::{run_generate_settlement, run_lock_settlement, SettlementSummary};

use payline_common::config::{RootFolderInitializer, TomlConfig};
use payline_common::db::init::init_database;
use payline_common::{RowStore, SqliteRowStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::backup::BackupManager;
use crate::error::{EtlError, EtlResult};
use crate::ingest::Normalizer;
use crate::resolver::ReferenceResolver;

/// Everything a command needs: configuration, folders and the store
pub struct AppContext {
    pub config: TomlConfig,
    pub root: RootFolderInitializer,
    pub store: Arc<dyn RowStore>,
}

impl AppContext {
    /// Resolve folders and open (or create) the SQLite ledger
    pub async fn open(
        config: TomlConfig,
        root_folder: PathBuf,
        database: Option<PathBuf>,
    ) -> EtlResult<Self> {
        let root = RootFolderInitializer::new(root_folder);
        root.ensure_directory_exists()?;

        let db_path = database.unwrap_or_else(|| root.database_path(&config));
        info!("Database: {}", db_path.display());
        let pool = init_database(&db_path).await.map_err(|e| {
            EtlError::Configuration(format!("Cannot open database {}: {}", db_path.display(), e))
        })?;

        Ok(Self {
            config,
            root,
            store: Arc::new(SqliteRowStore::new(pool)),
        })
    }

    /// Context over an existing store
    pub fn with_store(config: TomlConfig, root: RootFolderInitializer, store: Arc<dyn RowStore>) -> Self {
        Self { config, root, store }
    }

    pub fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    /// Fresh resolver over the current reference tables
    pub async fn resolver(&self) -> EtlResult<Arc<ReferenceResolver>> {
        let resolver = ReferenceResolver::load(self.store(), self.config.fuzzy_matching).await?;
        Ok(Arc::new(resolver))
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::from_config(&self.config)
    }

    pub fn backup_manager(&self) -> BackupManager<'_> {
        BackupManager::new(self.store(), self.root.backup_dir(&self.config))
            .with_chunk_size(self.config.chunk_size)
            .with_max_lock_wait_ms(self.config.max_lock_wait_ms)
    }
}
