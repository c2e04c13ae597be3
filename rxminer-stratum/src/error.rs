use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Which step of establishing a connection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectCause {
    /// Host name could not be resolved
    Resolve,
    /// Connection was refused or reset
    Connect,
    /// Resolution or connect did not finish in time
    Timeout,
}

impl fmt::Display for ConnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectCause::Resolve => write!(f, "name resolution failed"),
            ConnectCause::Connect => write!(f, "connect failed"),
            ConnectCause::Timeout => write!(f, "timed out"),
        }
    }
}

/// Stratum client error types
#[derive(Error, Debug)]
pub enum StratumError {
    #[error("Failed to connect to {host}:{port}: {cause}: {source}")]
    Connect {
        host: String,
        port: String,
        cause: ConnectCause,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unexpected response for request id {0}")]
    UnexpectedResponse(Value),

    #[error("Invalid hex encoding: {0}")]
    InvalidEncoding(String),

    #[error("Buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc { code: i64, message: String },

    #[error("Request {0} timed out")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StratumError {
    /// Whether opening a fresh session may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StratumError::Connect { .. }
                | StratumError::Transport(_)
                | StratumError::Timeout(_)
                | StratumError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, StratumError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_connect_error_names_endpoint_and_cause() {
        let err = StratumError::Connect {
            host: "pool.test".to_string(),
            port: "3333".to_string(),
            cause: ConnectCause::Resolve,
            source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
        };

        let msg = err.to_string();
        assert!(msg.contains("pool.test:3333"));
        assert!(msg.contains("name resolution failed"));
        assert!(msg.contains("no such host"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(StratumError::ConnectionClosed.is_transient());
        assert!(StratumError::Timeout(3).is_transient());
        assert!(!StratumError::InvalidConfiguration("bad port".into()).is_transient());
        assert!(!StratumError::MalformedFrame("{".into()).is_transient());
    }
}
