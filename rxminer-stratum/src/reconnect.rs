//! Reconnect policy kept outside the connection itself.
//!
//! A session that fails stays failed; callers that want to keep mining
//! open a fresh one through [`open_with_backoff`].

use crate::{
    config::{SessionCredentials, StratumConfig},
    connection::StratumConnection,
    error::Result,
    variant::VariantKind,
};
use backoff::{future::retry, ExponentialBackoff};
use std::time::Duration;
use tracing::{error, warn};

/// Backoff schedule derived from the session config
pub fn backoff_policy(config: &StratumConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(config.reconnect_backoff_ms),
        max_interval: Duration::from_millis(config.max_reconnect_backoff_ms),
        max_elapsed_time: Some(Duration::from_millis(
            config.max_reconnect_attempts as u64 * config.max_reconnect_backoff_ms,
        )),
        ..Default::default()
    }
}

/// Open a session, retrying transient failures with exponential backoff.
///
/// Each attempt gets a fresh variant, so no session flags leak between
/// attempts.
pub async fn open_with_backoff(
    credentials: &SessionCredentials,
    kind: VariantKind,
    config: &StratumConfig,
) -> Result<StratumConnection> {
    retry(backoff_policy(config), || async move {
        let variant = kind.build(&config.user_agent);
        StratumConnection::open(credentials.clone(), variant, config)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    warn!("Connection attempt failed: {}", e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
    })
    .await
    .map_err(|e| {
        error!("Giving up on {}: {}", credentials.endpoint(), e);
        e
    })
}
