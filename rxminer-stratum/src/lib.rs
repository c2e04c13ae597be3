//! RxMiner Stratum Protocol Client
//!
//! Keeps one session with a mining pool and exposes the latest job to
//! solvers running elsewhere.
//!
//! # Features
//!
//! - XMR (`login`/`job`), ETH (`eth_submitLogin`) and standard
//!   (`mining.subscribe`/`mining.authorize`/`mining.notify`) dialects
//! - Newline framing that survives arbitrary read boundaries
//! - Request ids correlated with their responses
//! - Lock-free current-job slot safe to read from any thread
//! - Reconnection with exponential backoff as an opt-in policy
//!
//! # Example
//!
//! ```no_run
//! use rxminer_stratum::{SessionCredentials, StratumConfig, StratumConnection, VariantKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StratumConfig::default();
//!     let credentials = SessionCredentials::new("wallet", "x", "pool.example.com", "3333");
//!
//!     let connection = StratumConnection::open(
//!         credentials,
//!         VariantKind::Xmr.build(&config.user_agent),
//!         &config,
//!     )
//!     .await?;
//!
//!     let mut jobs = connection.subscribe_jobs();
//!     while jobs.changed().await.is_ok() {
//!         if let Some(job) = connection.current_job() {
//!             println!("New job: {}", job);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod correlator;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod framing;
pub mod job;
pub mod protocol;
pub mod reconnect;
pub mod variant;

// Re-export main types
pub use config::{PoolConfig, SessionCredentials, StratumConfig};
pub use connection::{ConnectionState, StratumConnection};
pub use correlator::{Correlator, PendingRequest};
pub use digest::digest_hex;
pub use encoding::HexString;
pub use error::{ConnectCause, Result, StratumError};
pub use framing::FrameReader;
pub use job::{Job, JobSlot};
pub use protocol::{Incoming, RpcResponse};
pub use reconnect::open_with_backoff;
pub use variant::{EthStratumV1, PoolVariant, StandardStratumV2, VariantKind, XmrStratumV1};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default user agent string
pub fn default_user_agent() -> String {
    format!("rxminer/{}", VERSION)
}
