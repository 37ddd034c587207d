//! Configuration for the bond screener.
//!
//! The screener reads a single JSON file, by default
//! `~/.bond-screener/config.json`. Every section is optional.
//!
//! # Configuration Priority
//!
//! 1. Command line flags (applied by the binary)
//! 2. Environment variables
//! 3. Explicit config file values
//! 4. Default values
//!
//! # Environment Variable Mapping
//!
//! - `BOND_ISS_URL` → iss.base_url
//! - `MOEX_USER` → iss.user
//! - `MOEX_PASSWORD` → iss.password
//! - `BOND_MODES` → screener.modes (comma-separated)
//! - `BOND_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".bond-screener"),
        |dirs| dirs.home_dir().join(".bond-screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration object.
///
/// Built once at startup and passed by reference to every stage; nothing
/// mutates it after `apply_env_overrides`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Exchange API access
    #[serde(default)]
    pub iss: IssConfig,

    /// What to fetch and how to filter it
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Result presentation
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (explicit path or default) with environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BOND_ISS_URL") {
            self.iss.base_url = url;
        }
        if let Some(user) = lookup("MOEX_USER") {
            self.iss.user = Some(user);
        }
        if let Some(password) = lookup("MOEX_PASSWORD") {
            self.iss.password = Some(password);
        }
        if let Some(modes) = lookup("BOND_MODES") {
            let parsed: Vec<String> = modes
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if !parsed.is_empty() {
                self.screener.modes = parsed;
            }
        }
        if let Some(level) = lookup("BOND_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }
}

// ============================================================================
// ISS Configuration
// ============================================================================

/// Exchange API access settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct IssConfig {
    /// ISS root, e.g. "https://iss.moex.com/iss"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Passport endpoint used to obtain the auth cookie
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Passport user (authentication is skipped when unset)
    #[serde(default)]
    pub user: Option<String>,

    /// Passport password
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rows per page; `None` requests `limit=unlimited`
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Extra attempts after a network failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on in-flight enrichment requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Projection for the securities block (empty = all columns)
    #[serde(default)]
    pub securities_columns: Vec<String>,

    /// Projection for the marketdata block (empty = all columns)
    #[serde(default)]
    pub marketdata_columns: Vec<String>,
}

impl Default for IssConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: default_auth_url(),
            user: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            page_size: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
            securities_columns: Vec::new(),
            marketdata_columns: Vec::new(),
        }
    }
}

impl std::fmt::Debug for IssConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssConfig")
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("securities_columns", &self.securities_columns)
            .field("marketdata_columns", &self.marketdata_columns)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://iss.moex.com/iss".into()
}

fn default_auth_url() -> String {
    "https://passport.moex.com/authenticate".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_concurrent_requests() -> usize {
    8
}

// ============================================================================
// Screener Configuration
// ============================================================================

/// Trading modes to query and criteria to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Trading mode codes: numeric board group ("58") or board id ("TQOB")
    #[serde(default = "default_modes")]
    pub modes: Vec<String>,

    /// Log and skip a failing mode instead of aborting the run
    #[serde(default)]
    pub skip_failed_modes: bool,

    /// Filter criteria, combined with logical AND
    #[serde(default)]
    pub criteria: Vec<CriterionConfig>,

    /// Optional per-instrument enrichment
    #[serde(default)]
    pub enrich: EnrichConfig,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            modes: default_modes(),
            skip_failed_modes: false,
            criteria: Vec::new(),
            enrich: EnrichConfig::default(),
        }
    }
}

fn default_modes() -> Vec<String> {
    vec!["58".into()]
}

/// A criterion as written in the config file.
///
/// The operator and threshold are kept loose here; the screener compiles
/// them and rejects combinations that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionConfig {
    /// Attribute name or alias (case-insensitive)
    pub field: String,

    /// One of `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `not_in`
    pub op: String,

    /// Number, `YYYY-MM-DD` date, string, or list of strings
    pub value: serde_json::Value,
}

/// Per-instrument enrichment switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Fetch recent daily trade counts
    #[serde(default)]
    pub trade_history: bool,

    /// Fetch remaining coupons and compute profit
    #[serde(default)]
    pub coupons: bool,

    /// Trade history look-back window in days
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            trade_history: false,
            coupons: false,
            history_days: default_history_days(),
        }
    }
}

fn default_history_days() -> u32 {
    14
}

// ============================================================================
// Display Configuration
// ============================================================================

/// Result presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Output format (table, markdown, json)
    #[serde(default = "default_format")]
    pub format: String,

    /// Columns to print (empty = built-in default set)
    #[serde(default)]
    pub columns: Vec<String>,

    /// Attribute to sort the result by
    #[serde(default)]
    pub sort_by: Option<String>,

    /// Sort direction
    #[serde(default = "default_true")]
    pub descending: bool,

    /// Maximum rows to print
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            columns: Vec::new(),
            sort_by: None,
            descending: true,
            limit: None,
        }
    }
}

fn default_format() -> String {
    "table".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
