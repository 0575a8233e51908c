//! Configuration: a TOML settings file plus environment-provided secrets.
//!
//! Tunables (registry paging, model name, search bounds, bind address) come
//! from an optional TOML file. Credentials never do: the document store and
//! the model provider are configured from the environment, optionally seeded
//! from a `.env` file by the CLI.
//!
//! ```toml
//! [registry]
//! per_page = 1000
//! max_pages = 10
//!
//! [model]
//! name = "gpt-4o-mini"
//!
//! [search]
//! max_limit = 50
//!
//! [server]
//! bind = "0.0.0.0:8000"
//! ```
//!
//! | Variable | Required | Purpose |
//! |----------|----------|---------|
//! | `DB_HOST`, `DB_NAME`, `DB_USER` | yes (MySQL) | Store location and login |
//! | `DB_PASSWORD` | no | Store password, may be empty |
//! | `DB_PORT` | no | Store port, default `3306` |
//! | `DB_SQLITE_PATH` | no | Use a local SQLite file instead of MySQL |
//! | `OPENAI_API_KEY` | yes (chat) | Model provider key |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Settings file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/fedreg.toml";

/// Default MySQL port.
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Largest page the registry will serve.
pub const REGISTRY_MAX_PER_PAGE: u32 = 1000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_registry_url() -> String {
    "https://www.federalregister.gov/api/v1/documents.json".to_string()
}
fn default_per_page() -> u32 {
    REGISTRY_MAX_PER_PAGE
}
fn default_max_pages() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_model_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            base_url: default_model_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_model_name() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_model_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_system_prompt() -> String {
    "You are a helpful assistant that can search federal documents.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_max_content_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Load and validate the settings file.
///
/// With `path = None` the default location is tried and built-in defaults
/// are used when nothing is there. An explicitly named file must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(p) => parse_config_file(p)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                parse_config_file(default_path)?
            } else {
                Config::default()
            }
        }
    };
    validate(&config)?;
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.registry.per_page == 0 || config.registry.per_page > REGISTRY_MAX_PER_PAGE {
        bail!(
            "registry.per_page must be in 1..={}",
            REGISTRY_MAX_PER_PAGE
        );
    }
    if config.registry.max_pages == 0 {
        bail!("registry.max_pages must be > 0");
    }
    if config.search.max_limit == 0 {
        bail!("search.max_limit must be > 0");
    }
    if config.search.default_limit == 0 || config.search.default_limit > config.search.max_limit
    {
        bail!("search.default_limit must be in 1..=search.max_limit");
    }
    if config.registry.timeout_secs == 0
        || config.model.timeout_secs == 0
        || config.agent.tool_timeout_secs == 0
    {
        bail!("timeouts must be > 0 seconds");
    }
    Ok(())
}

// ============ Environment-provided settings ============

/// Where documents are stored.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    MySql(MySqlSettings),
    /// Local single-file store, for development and tests.
    Sqlite(PathBuf),
}

#[derive(Clone)]
pub struct MySqlSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for MySqlSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for MySqlSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl StoreBackend {
    /// Resolve the store from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the store from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("DB_SQLITE_PATH") {
            return Ok(Self::Sqlite(PathBuf::from(path)));
        }

        let host = get("DB_HOST").ok_or(ConfigError::MissingVar("DB_HOST"))?;
        let database = get("DB_NAME").ok_or(ConfigError::MissingVar("DB_NAME"))?;
        let user = get("DB_USER").ok_or(ConfigError::MissingVar("DB_USER"))?;
        let password = lookup("DB_PASSWORD").unwrap_or_default();
        let port = match get("DB_PORT") {
            None => DEFAULT_DB_PORT,
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidVar {
                    name: "DB_PORT",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
        };

        Ok(Self::MySql(MySqlSettings {
            host,
            port,
            database,
            user,
            password,
        }))
    }

    /// Loggable description without credentials.
    pub fn describe(&self) -> String {
        match self {
            Self::MySql(s) => s.to_string(),
            Self::Sqlite(path) => format!("sqlite:{}", path.display()),
        }
    }
}

/// The model provider API key from `OPENAI_API_KEY`.
pub fn api_key_from_env() -> Result<String, ConfigError> {
    api_key_from_lookup(|key| std::env::var(key).ok())
}

pub fn api_key_from_lookup<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("OPENAI_API_KEY")
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_mysql_from_env_with_default_port() {
        let backend = StoreBackend::from_lookup(lookup_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "fedreg"),
            ("DB_USER", "reader"),
        ]))
        .unwrap();

        match backend {
            StoreBackend::MySql(s) => {
                assert_eq!(s.port, DEFAULT_DB_PORT);
                assert_eq!(s.password, "");
                assert_eq!(s.to_string(), "mysql://reader@db.internal:3306/fedreg");
            }
            other => panic!("expected MySql backend, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_host_is_fatal() {
        let err = StoreBackend::from_lookup(lookup_from(&[
            ("DB_NAME", "fedreg"),
            ("DB_USER", "reader"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DB_HOST")));
    }

    #[test]
    fn test_blank_user_counts_as_missing() {
        let err = StoreBackend::from_lookup(lookup_from(&[
            ("DB_HOST", "localhost"),
            ("DB_NAME", "fedreg"),
            ("DB_USER", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DB_USER")));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = StoreBackend::from_lookup(lookup_from(&[
            ("DB_HOST", "localhost"),
            ("DB_NAME", "fedreg"),
            ("DB_USER", "reader"),
            ("DB_PORT", "33o6"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "DB_PORT", .. }));
    }

    #[test]
    fn test_sqlite_path_skips_mysql_requirements() {
        let backend =
            StoreBackend::from_lookup(lookup_from(&[("DB_SQLITE_PATH", "/tmp/docs.sqlite")]))
                .unwrap();
        assert!(matches!(backend, StoreBackend::Sqlite(_)));
        assert_eq!(backend.describe(), "sqlite:/tmp/docs.sqlite");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = MySqlSettings {
            host: "h".into(),
            port: 1,
            database: "d".into(),
            user: "u".into(),
            password: "hunter2".into(),
        };
        let dbg = format!("{:?}", settings);
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn test_api_key_required() {
        assert!(matches!(
            api_key_from_lookup(lookup_from(&[])),
            Err(ConfigError::MissingVar("OPENAI_API_KEY"))
        ));
        assert_eq!(
            api_key_from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap(),
            "sk-test"
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[registry]
max_pages = 3

[search]
max_limit = 25
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.registry.max_pages, 3);
        assert_eq!(config.registry.per_page, 1000);
        assert_eq!(config.search.max_limit, 25);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config: Config =
            toml::from_str(include_str!("../config/fedreg.example.toml")).unwrap();
        validate(&config).unwrap();
        let defaults = Config::default();
        assert_eq!(config.registry.base_url, defaults.registry.base_url);
        assert_eq!(config.model.name, defaults.model.name);
        assert_eq!(config.model.system_prompt, defaults.model.system_prompt);
        assert_eq!(config.search.max_content_chars, defaults.search.max_content_chars);
        assert_eq!(config.server.bind, defaults.server.bind);
    }

    #[test]
    fn test_validate_rejects_oversized_page() {
        let mut config = Config::default();
        config.registry.per_page = 5000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_default_above_max() {
        let mut config = Config::default();
        config.search.default_limit = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = load_config(Some(Path::new("/nonexistent/fedreg.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file error"));
    }
}
