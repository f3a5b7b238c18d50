//! Tests for bootstrap configuration loading and root folder resolution
//!
//! Tests that touch PAYLINE_CONFIG or PAYLINE_ROOT are marked #[serial] so
//! they never race on the process environment.

use payline_common::config::{
    resolve_root_folder, ColumnFamily, RootFolderInitializer, TomlConfig, CONFIG_ENV_VAR, ROOT_ENV_VAR,
};
use payline_common::Error;
use rust_decimal_macros::dec;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
root_folder = "/srv/payline"
backup_dir = "snapshots"
chunk_size = 250
create_missing_references = true
fuzzy_matching = false
default_ad_rate = 0.08
max_lock_wait_ms = 1000

[logging]
level = "debug"
file = "/var/log/payline.log"

[[designer_columns]]
family = "share"
pattern = "^(?P<member>.+)_pct$"

[tokens]
true_values = ["Y"]
false_values = ["N"]

[amount_ranges.projects]
min = 0
max = 50000000
"#;

#[test]
fn test_full_document_parses() {
    let config = TomlConfig::from_toml_str(FULL_CONFIG).unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/payline")));
    assert_eq!(config.chunk_size, 250);
    assert!(config.create_missing_references);
    assert!(!config.fuzzy_matching);
    assert_eq!(config.default_ad_rate, dec!(0.08));
    assert_eq!(config.default_program_rate, dec!(0.03));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.designer_columns.len(), 1);
    assert_eq!(config.designer_columns[0].family, ColumnFamily::Share);
    assert_eq!(config.tokens.true_values, vec!["Y".to_string()]);

    let range = config.amount_range("projects").unwrap();
    assert_eq!(range.max, Some(dec!(50000000)));
    assert!(config.amount_range("contacts").is_none());
}

#[test]
#[serial]
fn test_load_explicit_path_wins_over_env() {
    let dir = TempDir::new().unwrap();
    let explicit = dir.path().join("explicit.toml");
    let from_env = dir.path().join("env.toml");
    std::fs::write(&explicit, "chunk_size = 10\n").unwrap();
    std::fs::write(&from_env, "chunk_size = 20\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &from_env);
    let config = TomlConfig::load(Some(&explicit)).unwrap();
    assert_eq!(config.chunk_size, 10);

    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.chunk_size, 20);
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_load_missing_explicit_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = TomlConfig::load(Some(Path::new("/nonexistent/payline.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_zero_chunk_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("payline.toml");
    std::fs::write(&path, "chunk_size = 0\n").unwrap();

    assert!(matches!(TomlConfig::load(Some(&path)), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let config = TomlConfig::from_toml_str("root_folder = \"/from/toml\"\n").unwrap();

    env::set_var(ROOT_ENV_VAR, "/from/env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &config),
        PathBuf::from("/from/cli")
    );
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/env"));

    env::remove_var(ROOT_ENV_VAR);
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));

    let fallback = resolve_root_folder(None, &TomlConfig::default());
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_initializer_creates_root_and_derives_paths() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("nested").join("payline");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());

    let config = TomlConfig::from_toml_str(FULL_CONFIG).unwrap();
    assert_eq!(initializer.backup_dir(&config), root.join("snapshots"));
    assert_eq!(initializer.database_path(&config), root.join("payline.db"));
    assert_eq!(initializer.seed_file(&config), root.join("seed.toml"));
}
