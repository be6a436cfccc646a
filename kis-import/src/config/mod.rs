//! Importer configuration
//!
//! Settings come from a TOML file (by default
//! `<config dir>/kis-import/config.toml`), then environment variables
//! (`KIS2_BASE_URL`, `KIS2_USERNAME`, `KIS2_PASSWORD`, `KIS3_DATABASE_URL`),
//! then command-line flags.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};

use crate::import::records::RowContext;
use crate::import::{EntityKind, ImportSettings};
use crate::source::{RetryConfig, SessionConfig};
use crate::store::StoreOptions;

/// Currencies seeded when the configuration names none
pub const DEFAULT_CURRENCIES: [&str; 5] = ["RUB", "USD", "EUR", "GBP", "JPY"];

/// Order statuses seeded when the configuration names none
pub const DEFAULT_ORDER_STATUSES: [&str; 8] = [
    "Не определён",
    "На согласовании",
    "В работе",
    "Просрочено",
    "Выполнено в срок",
    "Выполнено НЕ в срок",
    "Не согласовано",
    "На паузе",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub import: ImportConfig,
}

/// Legacy KIS2 site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub login_path: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry: RetrySettings,
    /// Endpoint overrides keyed by entity type
    pub endpoints: BTreeMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            base_url: String::new(),
            username: String::new(),
            password: None,
            login_path: "/accounts/login/".to_string(),
            timeout_secs: 60,
            connect_timeout_secs: 10,
            retry: RetrySettings::default(),
            endpoints: BTreeMap::new(),
        }
    }
}

/// Retry settings as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Extra attempts after the first (0 = never retry)
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: 0,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_retries + 1,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

/// KIS3 destination database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig {
            database_url: "sqlite://kis3.db".to_string(),
            max_connections: 4,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Country given to cities that arrive without one
    pub default_country: String,
    /// Per-entity-type deadline; unset means no deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_timeout_secs: Option<u64>,
    pub currencies: Vec<String>,
    pub order_statuses: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            default_country: "Россия".to_string(),
            entity_timeout_secs: None,
            currencies: DEFAULT_CURRENCIES.iter().map(|s| s.to_string()).collect(),
            order_statuses: DEFAULT_ORDER_STATUSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kis-import").join("config.toml"))
    }

    /// Load the config file
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    log::debug!("No config file found, using defaults");
                    return Ok(Config::default());
                }
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = read("KIS2_BASE_URL") {
            self.source.base_url = url;
        }
        if let Some(username) = read("KIS2_USERNAME") {
            self.source.username = username;
        }
        if let Some(password) = read("KIS2_PASSWORD") {
            self.source.password = Some(password);
        }
        if let Some(url) = read("KIS3_DATABASE_URL") {
            self.destination.database_url = url;
        }
    }

    /// Prompt for the KIS2 password when none is configured and stdin is a terminal
    pub fn ensure_password(&mut self) -> Result<()> {
        if self.source.password.as_deref().is_some_and(|p| !p.is_empty()) {
            return Ok(());
        }
        if !std::io::stdin().is_terminal() {
            bail!("No KIS2 password configured (set KIS2_PASSWORD or source.password)");
        }

        let prompt = format!("KIS2 password for {}: ", self.source.username);
        let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
        self.source.password = Some(password);
        Ok(())
    }

    /// Check settings that would only fail later, mid-run
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            bail!("No KIS2 base URL configured (set KIS2_BASE_URL or source.base_url)");
        }
        if self.source.username.trim().is_empty() {
            bail!("No KIS2 username configured (set KIS2_USERNAME or source.username)");
        }
        if self.import.default_country.trim().is_empty() {
            bail!("import.default_country must not be empty");
        }
        for currency in &self.import.currencies {
            if currency.trim().chars().count() != 3 {
                bail!("Currency code '{}' is not three letters", currency);
            }
        }
        self.endpoints()?;
        Ok(())
    }

    /// HTTP session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            base_url: self.source.base_url.clone(),
            login_path: self.source.login_path.clone(),
            username: self.source.username.clone(),
            password: self.source.password.clone().unwrap_or_default(),
            timeout: Duration::from_secs(self.source.timeout_secs),
            connect_timeout: Duration::from_secs(self.source.connect_timeout_secs),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.source.retry)
    }

    /// Endpoint overrides by entity type
    pub fn endpoints(&self) -> Result<HashMap<EntityKind, String>> {
        self.source
            .endpoints
            .iter()
            .map(|(name, path)| {
                let kind = name
                    .parse::<EntityKind>()
                    .map_err(|e| anyhow::anyhow!("source.endpoints: {}", e))?;
                Ok((kind, path.clone()))
            })
            .collect()
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.destination.max_connections.max(1),
            acquire_timeout: Duration::from_secs(self.destination.acquire_timeout_secs),
        }
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            row_context: RowContext {
                default_country: self.import.default_country.clone(),
            },
            entity_timeout: self.import.entity_timeout_secs.map(Duration::from_secs),
        }
    }
}
