//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a TOML file. Everything has a built-in
//! default, so a missing file is a warning, not a failure. An explicitly
//! requested file (`--config` or `PAYLINE_CONFIG`) must exist.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PAYLINE_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_ENV_VAR: &str = "PAYLINE_ROOT";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database, backups and seed file
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// SQLite database file (relative paths are joined to the root folder)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Snapshot directory (relative paths are joined to the root folder)
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Reference seed document used by `seed`
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Records per persistence chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Create unknown members/channels/categories instead of rejecting rows
    #[serde(default)]
    pub create_missing_references: bool,

    /// Enable substring-containment fallback for reference and header matching
    #[serde(default = "default_true")]
    pub fuzzy_matching: bool,

    /// Ad fee rate for projects without a channel, and for seeded channels
    #[serde(default = "default_ad_rate")]
    pub default_ad_rate: Decimal,

    /// Program fee rate for projects without a channel, and for seeded channels
    #[serde(default = "default_program_rate")]
    pub default_program_rate: Decimal,

    /// Maximum time spent retrying a locked database write
    #[serde(default = "default_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Designer share/bonus header patterns, matched in order
    #[serde(default = "default_designer_columns")]
    pub designer_columns: Vec<DesignerColumnPattern>,

    #[serde(default)]
    pub tokens: TokenConfig,

    /// Advisory amount bounds keyed by table name (`projects`, `contacts`, ...)
    #[serde(default)]
    pub amount_ranges: BTreeMap<String, AmountRange>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            backup_dir: None,
            seed_file: None,
            chunk_size: default_chunk_size(),
            create_missing_references: false,
            fuzzy_matching: true,
            default_ad_rate: default_ad_rate(),
            default_program_rate: default_program_rate(),
            max_lock_wait_ms: default_lock_wait_ms(),
            logging: LoggingConfig::default(),
            designer_columns: default_designer_columns(),
            tokens: TokenConfig::default(),
            amount_ranges: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Which allocation field a designer column feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFamily {
    Share,
    Bonus,
}

/// Header pattern for a dynamic designer column
///
/// The regex must capture the member token in a group named `member`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignerColumnPattern {
    pub family: ColumnFamily,
    pub pattern: String,
}

/// Boolean token tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_true_values")]
    pub true_values: Vec<String>,
    #[serde(default = "default_false_values")]
    pub false_values: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            true_values: default_true_values(),
            false_values: default_false_values(),
        }
    }
}

/// Advisory bounds for an amount field; values outside produce warnings only
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountRange {
    #[serde(default)]
    pub min: Option<Decimal>,
    #[serde(default)]
    pub max: Option<Decimal>,
}

fn default_chunk_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_ad_rate() -> Decimal {
    Decimal::new(10, 2)
}

fn default_program_rate() -> Decimal {
    Decimal::new(3, 2)
}

fn default_lock_wait_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_designer_columns() -> Vec<DesignerColumnPattern> {
    // Bonus first: "김민수 보너스%" must not be read as a share column.
    vec![
        DesignerColumnPattern {
            family: ColumnFamily::Bonus,
            pattern: r"(?i)^\s*(?P<member>.+?)\s*(?:보너스|인센티브|bonus)\s*%?\s*$".to_string(),
        },
        DesignerColumnPattern {
            family: ColumnFamily::Share,
            pattern: r"(?i)^\s*(?P<member>.+?)\s*(?:지분|비율|배분|share|%)\s*$".to_string(),
        },
    ]
}

fn default_true_values() -> Vec<String> {
    ["true", "t", "y", "yes", "1", "o", "v", "예", "네", "완료", "지급", "지급완료", "paid"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_false_values() -> Vec<String> {
    ["false", "f", "n", "no", "0", "x", "아니오", "미지급", "unpaid"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration following the priority order:
    /// 1. Explicit path (command-line argument)
    /// 2. `PAYLINE_CONFIG` environment variable
    /// 3. User config file (`~/.config/payline/config.toml`)
    /// 4. Built-in defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_file(Path::new(&path));
        }

        if let Some(path) = user_config_path() {
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        warn!("No configuration file found, using built-in defaults");
        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read config {} failed: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        if config.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Advisory range for a table, if configured
    pub fn amount_range(&self, table: &str) -> Option<AmountRange> {
        self.amount_ranges.get(table).copied()
    }
}

/// User-level config file location
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("payline").join("config.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("payline"))
        .unwrap_or_else(|| PathBuf::from("./payline_data"))
}

/// Derives file locations under a resolved root folder
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create root folder directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    /// Database path, honoring a configured override
    pub fn database_path(&self, config: &TomlConfig) -> PathBuf {
        self.under_root(config.database_path.as_deref(), "payline.db")
    }

    /// Snapshot directory, honoring a configured override
    pub fn backup_dir(&self, config: &TomlConfig) -> PathBuf {
        self.under_root(config.backup_dir.as_deref(), "backups")
    }

    /// Seed document path, honoring a configured override
    pub fn seed_file(&self, config: &TomlConfig) -> PathBuf {
        self.under_root(config.seed_file.as_deref(), "seed.toml")
    }

    fn under_root(&self, configured: Option<&Path>, default_name: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.root.join(path),
            None => self.root.join(default_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.chunk_size, 100);
        assert!(!config.create_missing_references);
        assert!(config.fuzzy_matching);
        assert_eq!(config.default_ad_rate, Decimal::new(10, 2));
        assert_eq!(config.designer_columns.len(), 2);
        assert_eq!(config.designer_columns[0].family, ColumnFamily::Bonus);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            chunk_size = 25
            create_missing_references = true

            [logging]
            level = "debug"

            [amount_ranges.projects]
            min = 0
            max = 50000000
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 25);
        assert!(config.create_missing_references);
        assert_eq!(config.logging.level, "debug");
        assert!(config.tokens.true_values.contains(&"y".to_string()));
        let range = config.amount_range("projects").unwrap();
        assert_eq!(range.max, Some(Decimal::new(50_000_000, 0)));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("chunk_size = \"lots\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_relative_paths_join_root() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/payline"));
        let mut config = TomlConfig::default();
        assert_eq!(init.database_path(&config), PathBuf::from("/srv/payline/payline.db"));

        config.backup_dir = Some(PathBuf::from("snapshots"));
        assert_eq!(init.backup_dir(&config), PathBuf::from("/srv/payline/snapshots"));

        config.seed_file = Some(PathBuf::from("/etc/payline/seed.toml"));
        assert_eq!(init.seed_file(&config), PathBuf::from("/etc/payline/seed.toml"));
    }

    #[test]
    fn test_cli_root_wins() {
        let mut config = TomlConfig::default();
        config.root_folder = Some(PathBuf::from("/from/toml"));
        let root = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }
}
