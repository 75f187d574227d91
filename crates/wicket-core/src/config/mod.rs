//! Application configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: hardcoded in the struct `Default` implementations
//! 2. **Config file**: TOML file named by the `WICKET_CONFIG` env var
//! 3. **Environment variables**: `WICKET_*` overrides with `__` as separator,
//!    e.g. `WICKET_NODES__MAIN_URLS=http://a:8545,http://b:8545` or
//!    `WICKET_CHAIN__BLOCK_DELAY=4`
//!
//! Configuration is validated at load time; a proxy with no main node or an
//! unparseable URL refuses to start instead of failing at the first request.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on. Defaults to `3030`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3030
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), bind_port: default_bind_port() }
    }
}

/// Upstream node URLs, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesConfig {
    /// Main RPC nodes. At least one is required. Defaults to a local node.
    #[serde(default = "default_main_urls")]
    pub main_urls: Vec<String>,

    /// Fallback RPC nodes, queried only after main-node failures.
    #[serde(default)]
    pub fallback_urls: Vec<String>,
}

fn default_main_urls() -> Vec<String> {
    vec!["http://127.0.0.1:8545".to_string()]
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self { main_urls: default_main_urls(), fallback_urls: Vec::new() }
    }
}

/// Lag engine thresholds.
///
/// The block buffers guard against the underlying nodes not receiving the
/// newest blocks at the same time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Confirmations withheld before a block is trusted. Defaults to `2`.
    #[serde(default = "default_block_delay")]
    pub block_delay: u64,

    /// Largest tolerated head jump before a full refill. Defaults to `12`.
    #[serde(default = "default_block_max_gap")]
    pub block_max_gap: u64,
}

fn default_block_delay() -> u64 {
    2
}

fn default_block_max_gap() -> u64 {
    12
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { block_delay: default_block_delay(), block_max_gap: default_block_max_gap() }
    }
}

/// Application logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g. "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub nodes: NodesConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads and validates the layered configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when a source fails to parse or validation rejects
    /// the merged result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Ok(path) = std::env::var("WICKET_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }

        let settings: AppConfig = builder
            .add_source(
                Environment::with_prefix("WICKET")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("nodes.main_urls")
                    .with_list_parse_key("nodes.fallback_urls")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validates node URLs and thresholds.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error for empty pools or malformed URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.main_urls.is_empty() {
            return Err(ConfigError::Message(
                "requires the url of at least one main RPC node".to_string(),
            ));
        }

        for url in self.nodes.main_urls.iter().chain(&self.nodes.fallback_urls) {
            Url::parse(url)
                .map_err(|e| ConfigError::Message(format!("invalid node URL {url}: {e}")))?;
        }

        if self.chain.block_max_gap == 0 {
            return Err(ConfigError::Message("block_max_gap must be at least 1".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_port, 3030);
        assert_eq!(config.chain.block_delay, 2);
        assert_eq!(config.chain.block_max_gap, 12);
        assert_eq!(config.nodes.main_urls, vec!["http://127.0.0.1:8545"]);
    }

    #[test]
    fn test_empty_main_pool_is_rejected() {
        let config = AppConfig {
            nodes: NodesConfig { main_urls: vec![], fallback_urls: vec![] },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_url_is_rejected() {
        let config = AppConfig {
            nodes: NodesConfig {
                main_urls: vec!["not a url".to_string()],
                fallback_urls: vec![],
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_gap_is_rejected() {
        let config = AppConfig {
            chain: ChainConfig { block_delay: 2, block_max_gap: 0 },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
