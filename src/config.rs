use crate::adapters::outbound::{
    is_valid_name, QueueProcessingConfig, TransportSettings, PASSWORD_PROPERTY, TOKEN_PROPERTY,
    USER_PROPERTY,
};
use crate::application::DEFAULT_IMPORT_RETENTION;
use crate::domain::services::RetryBackoff;
use crate::domain::value_objects::{Endpoint, EndpointStrategy, DEFAULT_POLL_ITEMS};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Deserialize, Clone)]
pub struct Config {
    // Agent settings
    pub agent_name: String,
    pub debug: bool,

    // Transport settings
    pub endpoints: Vec<String>,
    pub endpoint_strategy: String,
    pub poll_items: usize,
    pub transport_timeout_ms: u64,

    // Authentication properties
    pub auth_user: Option<String>,
    pub auth_password: Option<String>,
    pub auth_token: Option<String>,

    // Queue processing settings
    pub queue_poll_interval_ms: u64,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,

    // API settings
    pub api_listen_addr: String,
    pub import_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: "default".to_string(),
            debug: false,
            endpoints: Vec::new(),
            endpoint_strategy: EndpointStrategy::All.as_str().to_string(),
            poll_items: DEFAULT_POLL_ITEMS,
            transport_timeout_ms: 10_000,
            auth_user: None,
            auth_password: None,
            auth_token: None,
            queue_poll_interval_ms: 500,
            retry_initial_ms: 1_000,
            retry_max_ms: 60_000,
            api_listen_addr: "0.0.0.0:8090".to_string(),
            import_retention: DEFAULT_IMPORT_RETENTION,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("agent_name", &self.agent_name)
            .field("debug", &self.debug)
            .field("endpoints", &self.endpoints)
            .field("endpoint_strategy", &self.endpoint_strategy)
            .field("poll_items", &self.poll_items)
            .field("transport_timeout_ms", &self.transport_timeout_ms)
            .field("auth_user", &self.auth_user)
            .field("auth_password", &redacted(&self.auth_password))
            .field("auth_token", &redacted(&self.auth_token))
            .field("queue_poll_interval_ms", &self.queue_poll_interval_ms)
            .field("retry_initial_ms", &self.retry_initial_ms)
            .field("retry_max_ms", &self.retry_max_ms)
            .field("api_listen_addr", &self.api_listen_addr)
            .field("import_retention", &self.import_retention)
            .finish()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid agent name {0:?}")]
    InvalidAgentName(String),
    #[error("poll_items must be at least 1")]
    ZeroPollItems,
    #[error("transport timeout must be positive")]
    ZeroTimeout,
    #[error("queue poll interval must be positive")]
    ZeroPollInterval,
    #[error("retry initial delay {initial_ms}ms exceeds maximum {max_ms}ms")]
    RetryBounds { initial_ms: u64, max_ms: u64 },
    #[error("unknown endpoint strategy {0:?}")]
    InvalidStrategy(String),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl Config {
    /// Build a configuration from a variable lookup, falling back to the
    /// defaults for missing or unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            agent_name: non_empty("REPLICATION_AGENT_NAME").unwrap_or(defaults.agent_name),
            debug: lookup("DEBUG").is_some(),
            endpoints: lookup("REPLICATION_ENDPOINTS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            endpoint_strategy: non_empty("REPLICATION_ENDPOINT_STRATEGY")
                .unwrap_or(defaults.endpoint_strategy),
            poll_items: number("REPLICATION_POLL_ITEMS", defaults.poll_items as u64) as usize,
            transport_timeout_ms: number("REPLICATION_TRANSPORT_TIMEOUT_MS", defaults.transport_timeout_ms),
            auth_user: non_empty("REPLICATION_AUTH_USER"),
            auth_password: non_empty("REPLICATION_AUTH_PASSWORD"),
            auth_token: non_empty("REPLICATION_AUTH_TOKEN"),
            queue_poll_interval_ms: number(
                "REPLICATION_QUEUE_POLL_INTERVAL_MS",
                defaults.queue_poll_interval_ms,
            ),
            retry_initial_ms: number("REPLICATION_RETRY_INITIAL_MS", defaults.retry_initial_ms),
            retry_max_ms: number("REPLICATION_RETRY_MAX_MS", defaults.retry_max_ms),
            api_listen_addr: non_empty("REPLICATION_API_LISTEN_ADDR").unwrap_or(defaults.api_listen_addr),
            import_retention: number("REPLICATION_IMPORT_RETENTION", defaults.import_retention as u64) as usize,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.agent_name) {
            return Err(ConfigError::InvalidAgentName(self.agent_name.clone()));
        }
        if self.poll_items == 0 {
            return Err(ConfigError::ZeroPollItems);
        }
        if self.transport_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.queue_poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.retry_initial_ms > self.retry_max_ms {
            return Err(ConfigError::RetryBounds {
                initial_ms: self.retry_initial_ms,
                max_ms: self.retry_max_ms,
            });
        }
        self.strategy()?;
        for uri in &self.endpoints {
            Endpoint::parse(uri).map_err(ConfigError::InvalidEndpoint)?;
        }
        Ok(())
    }

    pub fn strategy(&self) -> Result<EndpointStrategy, ConfigError> {
        self.endpoint_strategy
            .parse()
            .map_err(|_| ConfigError::InvalidStrategy(self.endpoint_strategy.clone()))
    }

    /// Flatten credentials into the properties read by the authentication
    /// provider factory.
    pub fn authentication_properties(&self) -> HashMap<String, String> {
        [
            (USER_PROPERTY, &self.auth_user),
            (PASSWORD_PROPERTY, &self.auth_password),
            (TOKEN_PROPERTY, &self.auth_token),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }

    pub fn transport_settings(&self) -> Result<TransportSettings, ConfigError> {
        let mut settings = TransportSettings::new(self.endpoints.clone(), self.strategy()?)
            .poll_items(self.poll_items)
            .timeout(Duration::from_millis(self.transport_timeout_ms));
        settings.authentication_properties = self.authentication_properties();
        Ok(settings)
    }

    pub fn queue_processing(&self) -> QueueProcessingConfig {
        QueueProcessingConfig::default()
            .poll_interval(Duration::from_millis(self.queue_poll_interval_ms))
            .backoff(RetryBackoff::new(
                Duration::from_millis(self.retry_initial_ms),
                Duration::from_millis(self.retry_max_ms),
            ))
    }
}

/// Load and validate the configuration from the environment.
pub fn load_config() -> anyhow::Result<Config> {
    let cfg = Config::from_lookup(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}
