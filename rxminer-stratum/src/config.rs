use crate::{
    error::{Result, StratumError},
    variant::VariantKind,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Login and endpoint for one pool session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub login: String,
    pub password: String,
    pub host: String,
    pub port: String,
}

impl SessionCredentials {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    /// `host:port` as handed to the resolver
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pool configuration for Stratum connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name for identification
    #[serde(default = "default_name")]
    pub name: String,

    /// Pool URL (hostname:port or stratum+tcp://hostname:port)
    pub url: String,

    /// Wallet address or account login
    pub login: String,

    /// Worker password (often just 'x' for most pools)
    #[serde(default = "default_password")]
    pub password: String,

    /// Protocol dialect spoken by the pool
    #[serde(default)]
    pub variant: VariantKind,
}

/// Session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumConfig {
    /// Timeout for resolving and connecting
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Timeout for a request awaiting its response
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Maximum reconnection attempts
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Reconnection backoff base (milliseconds)
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Maximum reconnection backoff (milliseconds)
    #[serde(default = "default_max_reconnect_backoff_ms")]
    pub max_reconnect_backoff_ms: u64,

    /// Size of a single socket read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Longest line accepted from the pool
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,

    /// Agent string sent in login/subscribe
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            max_reconnect_backoff_ms: default_max_reconnect_backoff_ms(),
            read_buffer_size: default_read_buffer_size(),
            max_frame_length: default_max_frame_length(),
            user_agent: default_user_agent(),
        }
    }
}

impl StratumConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl PoolConfig {
    /// Parse URL to extract host and port
    pub fn parse_url(&self) -> Result<(String, String)> {
        let url = ["stratum+tcp://", "stratum://", "tcp://"]
            .iter()
            .find_map(|scheme| self.url.strip_prefix(scheme))
            .unwrap_or(self.url.as_str());

        let (host, port) = url.rsplit_once(':').ok_or_else(|| {
            StratumError::InvalidConfiguration(format!("Invalid pool URL format: {}", self.url))
        })?;

        if host.is_empty() {
            return Err(StratumError::InvalidConfiguration(format!(
                "Missing host in URL: {}",
                self.url
            )));
        }

        port.parse::<u16>().map_err(|_| {
            StratumError::InvalidConfiguration(format!("Invalid port in URL: {}", self.url))
        })?;

        Ok((host.to_string(), port.to_string()))
    }

    pub fn credentials(&self) -> Result<SessionCredentials> {
        let (host, port) = self.parse_url()?;
        Ok(SessionCredentials::new(
            self.login.clone(),
            self.password.clone(),
            host,
            port,
        ))
    }
}

// Default value functions for serde
fn default_name() -> String { "pool".to_string() }
fn default_password() -> String { "x".to_string() }
fn default_connection_timeout_secs() -> u64 { 30 }
fn default_response_timeout_secs() -> u64 { 10 }
fn default_max_reconnect_attempts() -> u32 { 10 }
fn default_reconnect_backoff_ms() -> u64 { 1000 }
fn default_max_reconnect_backoff_ms() -> u64 { 60000 }
fn default_read_buffer_size() -> usize { 65536 }
fn default_max_frame_length() -> usize { crate::framing::DEFAULT_MAX_FRAME_LENGTH }
fn default_user_agent() -> String { crate::default_user_agent() }
