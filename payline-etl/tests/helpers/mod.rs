//! Shared fixtures for payline-etl integration tests

#![allow(dead_code)]

use payline_common::config::{RootFolderInitializer, TomlConfig};
use payline_common::db::init::init_memory_database;
use payline_common::{Filter, SqliteRowStore};
use payline_etl::commands::{apply_seed, AppContext, SeedDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Two designers, a marketplace channel with the full fee cascade, a
/// fee-free direct channel and one category
pub const SEED: &str = r#"
[[members]]
id = "m-kim"
code = "D01"
name = "김민수"

[[members]]
id = "m-lee"
code = "D02"
name = "이서연"

[[channels]]
id = "ch-naver"
name = "네이버"
ad_rate = 0.10
program_rate = 0.03
market_fee_rate = 0.21
fee_base = "net"

[[channels]]
id = "ch-direct"
name = "직접영업"
ad_rate = 0.0
program_rate = 0.0
market_fee_rate = 0.0

[[categories]]
id = "cat-home"
name = "주거"
"#;

/// In-memory ledger with a temporary root folder for backups and seeds
pub struct TestLedger {
    pub ctx: AppContext,
    pub dir: TempDir,
}

impl TestLedger {
    pub async fn count(&self, table: &str) -> u64 {
        self.ctx.store().count(table, &Filter::All).await.unwrap()
    }

    /// Write a sheet into the temporary root and return its path
    pub fn sheet(&self, name: &str, content: &str) -> PathBuf {
        write_file(self.dir.path(), name, content)
    }
}

pub async fn ledger_with(config: TomlConfig) -> TestLedger {
    let dir = TempDir::new().unwrap();
    let pool = init_memory_database().await.unwrap();
    let root = RootFolderInitializer::new(dir.path().to_path_buf());
    let ctx = AppContext::with_store(config, root, Arc::new(SqliteRowStore::new(pool)));
    TestLedger { ctx, dir }
}

pub async fn ledger() -> TestLedger {
    ledger_with(TomlConfig::default()).await
}

/// Ledger with [`SEED`] applied
pub async fn seeded_ledger_with(config: TomlConfig) -> TestLedger {
    let ledger = ledger_with(config).await;
    let document = SeedDocument::from_toml_str(SEED).unwrap();
    apply_seed(&ledger.ctx, document, PathBuf::from("seed.toml"))
        .await
        .unwrap();
    ledger
}

pub async fn seeded_ledger() -> TestLedger {
    seeded_ledger_with(TomlConfig::default()).await
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
