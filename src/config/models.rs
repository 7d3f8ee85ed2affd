//! Configuration data structures for Scatter.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. Every section
//! carries serde defaults so that a minimal config only needs the upstream `targets`.
//! The builder here is part of the public API for embedding and tests.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ProxyConfigValidator, ValidationResult};

fn default_listen_addr() -> String {
    "127.0.0.1:2000".to_string()
}

fn default_user_agent() -> String {
    "user-agent".to_string()
}

/// Top level proxy configuration. Immutable once the service is constructed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Address the proxy listens on (`host:port`)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upstream base URLs (scheme + host + optional base path + optional base query)
    pub targets: Vec<String>,
    #[serde(default)]
    pub selection: SelectionPolicy,
    /// Value injected as `User-Agent` when the inbound request carries none
    #[serde(default = "default_user_agent")]
    pub default_user_agent: String,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Create a new proxy configuration builder
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            targets: Vec::new(),
            selection: SelectionPolicy::default(),
            default_user_agent: default_user_agent(),
            transport: TransportConfig::default(),
            transformer: TransformerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for ProxyConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ProxyConfigBuilder {
    listen_addr: Option<String>,
    targets: Vec<String>,
    selection: Option<SelectionPolicy>,
    default_user_agent: Option<String>,
    transport: Option<TransportConfig>,
    transformer: Option<TransformerConfig>,
    logging: Option<LoggingConfig>,
}

impl ProxyConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Append an upstream target base URL
    pub fn target(mut self, url: impl Into<String>) -> Self {
        self.targets.push(url.into());
        self
    }

    /// Set the target selection policy
    pub fn selection(mut self, policy: SelectionPolicy) -> Self {
        self.selection = Some(policy);
        self
    }

    /// Set the placeholder `User-Agent`
    pub fn default_user_agent(mut self, value: impl Into<String>) -> Self {
        self.default_user_agent = Some(value.into());
        self
    }

    /// Set transport (connection pool and timeout) configuration
    pub fn transport(mut self, config: TransportConfig) -> Self {
        self.transport = Some(config);
        self
    }

    /// Set response transformer configuration
    pub fn transformer(mut self, config: TransformerConfig) -> Self {
        self.transformer = Some(config);
        self
    }

    /// Set logging configuration
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Build and validate the final ProxyConfig
    pub fn build(self) -> ValidationResult<ProxyConfig> {
        let config = ProxyConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            targets: self.targets,
            selection: self.selection.unwrap_or_default(),
            default_user_agent: self.default_user_agent.unwrap_or_else(default_user_agent),
            transport: self.transport.unwrap_or_default(),
            transformer: self.transformer.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        };
        ProxyConfigValidator::validate(&config)?;
        Ok(config)
    }
}

/// How an upstream is picked for each request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Uniform random choice, independent per request
    #[default]
    Random,
    #[serde(rename = "round_robin")]
    RoundRobin,
}

/// Outbound connection pool and timeout budget.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    /// TCP keep-alive probe interval; 0 disables keep-alive probes
    pub keepalive_secs: u64,
    /// Maximum idle pooled connections kept per upstream host; 0 disables pooling
    pub max_idle_connections: usize,
    pub idle_timeout_secs: u64,
    pub tls_handshake_timeout_secs: u64,
    /// Accepted and logged only. hyper sends request bodies without waiting for
    /// `100 Continue`, so this value does not delay or bound anything.
    pub expect_continue_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            keepalive_secs: 30,
            max_idle_connections: 100,
            idle_timeout_secs: 90,
            tls_handshake_timeout_secs: 10,
            expect_continue_timeout_secs: 1,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_timeout_secs)
    }

    pub fn expect_continue_timeout(&self) -> Duration {
        Duration::from_secs(self.expect_continue_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TransformerConfig {
    /// Upper bound for buffering a whole upstream body
    pub body_read_timeout_secs: u64,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            body_read_timeout_secs: 60,
        }
    }
}

impl TransformerConfig {
    pub fn body_read_timeout(&self) -> Duration {
        Duration::from_secs(self.body_read_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of the pretty console format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
