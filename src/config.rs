//! Layered configuration
//!
//! Precedence, lowest to highest: built-in defaults, a `resolve-xml.toml`
//! file (explicit `--config` path or discovered in standard locations),
//! `RESOLVE_XML_*` environment variables plus the conventional
//! `XML_CATALOG_FILES`, and finally the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::GlobalOpts;
use crate::error::{ConfigError, ConfigResult};

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
}

/// Catalog resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Catalog files searched after any given on the command line
    pub catalogs: Vec<String>,
    /// Whether public or system identifiers win ("public" or "system")
    pub prefer: String,
    /// Honor XML_CATALOG_FILES and other ambient catalog sources
    pub use_system_catalogs: bool,
}

/// Resource cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache remote resources on disk
    pub enabled: bool,
    /// Cache directory path
    pub directory: PathBuf,
    /// Time-to-live for cached resources in hours
    pub ttl_hours: u64,
    /// Maximum number of entries in the in-memory cache
    pub max_memory_entries: u64,
    /// In-memory cache TTL in seconds
    pub memory_ttl_seconds: u64,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed downloads
    pub retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            catalogs: vec![],
            prefer: "public".to_string(),
            use_system_catalogs: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("resolve-xml"),
            ttl_hours: 24,
            max_memory_entries: 1000,
            memory_ttl_seconds: 3600,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(opts: &GlobalOpts) -> ConfigResult<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &opts.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: config_path.clone(),
                });
            }
            config = Self::load_from_file(config_path).await?;
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = found_config;
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, opts);
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find a configuration file in standard locations
    pub async fn find_config_file() -> ConfigResult<Option<Config>> {
        let config_names = ["resolve-xml.toml", ".resolve-xml.toml"];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("resolve-xml");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> ConfigResult<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> ConfigResult<Config> {
        // XML_CATALOG_FILES is the conventional catalog list shared with
        // other XML tooling; entries are whitespace-separated.
        if let Some(catalogs) = env.get("XML_CATALOG_FILES") {
            config.resolver.catalogs.extend(
                catalogs
                    .split_whitespace()
                    .map(str::to_string)
                    .filter(|s| !s.is_empty()),
            );
        }

        if let Some(prefer) = env.get("RESOLVE_XML_PREFER") {
            match prefer.to_lowercase().as_str() {
                "public" | "system" => config.resolver.prefer = prefer.to_lowercase(),
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid RESOLVE_XML_PREFER value: {}",
                        prefer
                    )));
                }
            }
        }

        if let Some(cache_dir) = env.get("RESOLVE_XML_CACHE_DIR") {
            config.cache.directory = PathBuf::from(cache_dir);
        }

        if let Some(cache_ttl) = env.get("RESOLVE_XML_CACHE_TTL") {
            config.cache.ttl_hours = cache_ttl.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid RESOLVE_XML_CACHE_TTL value: {}",
                    cache_ttl
                ))
            })?;
        }

        if let Some(timeout) = env.get("RESOLVE_XML_TIMEOUT") {
            config.network.timeout_seconds = timeout.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid RESOLVE_XML_TIMEOUT value: {}", timeout))
            })?;
        }

        if let Some(retry_attempts) = env.get("RESOLVE_XML_RETRY_ATTEMPTS") {
            config.network.retry_attempts = retry_attempts.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid RESOLVE_XML_RETRY_ATTEMPTS value: {}",
                    retry_attempts
                ))
            })?;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, opts: &GlobalOpts) -> Config {
        // Command-line catalogs are searched before any configured ones
        if !opts.catalogs.is_empty() {
            let mut catalogs = opts.catalogs.clone();
            catalogs.extend(config.resolver.catalogs);
            config.resolver.catalogs = catalogs;
        }

        if opts.no_system_catalogs {
            config.resolver.use_system_catalogs = false;
        }

        if opts.cache_enabled() {
            config.cache.enabled = true;
        }
        if let Some(cache_dir) = &opts.cache_dir {
            config.cache.directory = cache_dir.clone();
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> ConfigResult<()> {
        if config.resolver.prefer != "public" && config.resolver.prefer != "system" {
            return Err(ConfigError::Validation(format!(
                "prefer must be \"public\" or \"system\", not \"{}\"",
                config.resolver.prefer
            )));
        }

        if config.cache.ttl_hours == 0 {
            return Err(ConfigError::Validation(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        Ok(())
    }

    /// The catalog list to search, in order. Ambient catalog sources are
    /// dropped entirely when use_system_catalogs is off, leaving only the
    /// command-line catalogs.
    pub fn effective_catalogs(config: &Config, opts: &GlobalOpts) -> Vec<String> {
        if !config.resolver.use_system_catalogs {
            return opts.catalogs.clone();
        }

        let mut catalogs = config.resolver.catalogs.clone();
        let system_catalog = "/etc/xml/catalog";
        if Path::new(system_catalog).exists() && !catalogs.iter().any(|c| c == system_catalog) {
            catalogs.push(system_catalog.to_string());
        }
        catalogs
    }

    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.network.timeout_seconds)
    }

    pub fn get_cache_ttl_duration(config: &Config) -> Duration {
        Duration::from_secs(config.cache.ttl_hours * 3600)
    }

    pub fn get_retry_delay_duration(config: &Config) -> Duration {
        Duration::from_millis(config.network.retry_delay_ms)
    }
}
