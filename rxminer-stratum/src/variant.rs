//! Pool dialects.
//!
//! A variant builds the login messages for its coin family and turns
//! received frames into responses or jobs. It keeps only the session flags
//! it learns from the pool (authorized, pool-assigned id) and is driven by
//! the connection's receive loop alone.

use crate::{
    config::SessionCredentials,
    encoding::HexString,
    error::{Result, StratumError},
    job::Job,
    protocol::{decode_frame, methods, Incoming, RpcResponse},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, str::FromStr};
use tracing::warn;

/// Capabilities every pool dialect provides
pub trait PoolVariant: Send {
    fn kind(&self) -> VariantKind;

    /// `None` for dialects without a subscribe step
    fn build_subscribe(&self, credentials: &SessionCredentials) -> Option<Value>;

    fn build_authorize(&self, credentials: &SessionCredentials) -> Value;

    fn parse_frame(&mut self, frame: &str) -> Result<Incoming>;

    fn is_authorized(&self) -> bool;

    /// Identifier the pool assigned to this session
    fn session_id(&self) -> Option<&str>;
}

/// Which dialect a pool speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantKind {
    /// Monero-style `login` / `job`
    #[default]
    Xmr,
    /// `eth_submitLogin` / `eth_getWork`
    Eth,
    /// `mining.subscribe` / `mining.authorize` / `mining.notify`
    Standard,
}

impl VariantKind {
    pub fn build(self, agent: &str) -> Box<dyn PoolVariant> {
        match self {
            VariantKind::Xmr => Box::new(XmrStratumV1::new(agent)),
            VariantKind::Eth => Box::new(EthStratumV1::new()),
            VariantKind::Standard => Box::new(StandardStratumV2::new(agent)),
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Xmr => write!(f, "xmr"),
            VariantKind::Eth => write!(f, "eth"),
            VariantKind::Standard => write!(f, "standard"),
        }
    }
}

impl FromStr for VariantKind {
    type Err = StratumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xmr" | "monero" => Ok(VariantKind::Xmr),
            "eth" | "ethereum" => Ok(VariantKind::Eth),
            "standard" | "v2" => Ok(VariantKind::Standard),
            other => Err(StratumError::InvalidConfiguration(format!(
                "Unknown pool variant: {}",
                other
            ))),
        }
    }
}

/// Flags a session learns from its pool
#[derive(Debug, Default)]
struct SessionFlags {
    authorized: bool,
    session_id: Option<String>,
}

impl SessionFlags {
    /// Shared V1 handling: `params` means a job notification, anything
    /// else is a direct result which may carry status, session id and the
    /// initial job.
    fn parse_v1(&mut self, message: &Value) -> Result<Incoming> {
        if let Some(params) = message.get("params") {
            return Ok(Incoming::Job(Job::from_notification(params)?));
        }

        let mut response = RpcResponse::from_message(message);
        if let Some(result) = response.result.as_object() {
            if result.get("status").and_then(Value::as_str) == Some("OK") {
                self.authorized = true;
            }

            if let Some(id) = result.get("id") {
                self.session_id = Some(match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });

                // The login result is still delivered without its job
                match result.get("job").map(Job::from_params) {
                    Some(Ok(job)) => response.job = Some(job),
                    Some(Err(e)) => warn!("Dropping job from login result: {}", e),
                    None => {}
                }
            }
        }

        Ok(Incoming::Response(response))
    }
}

/// Monero-style pools
#[derive(Debug)]
pub struct XmrStratumV1 {
    agent: String,
    flags: SessionFlags,
}

impl XmrStratumV1 {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            flags: SessionFlags::default(),
        }
    }
}

impl PoolVariant for XmrStratumV1 {
    fn kind(&self) -> VariantKind {
        VariantKind::Xmr
    }

    fn build_subscribe(&self, _credentials: &SessionCredentials) -> Option<Value> {
        None
    }

    fn build_authorize(&self, credentials: &SessionCredentials) -> Value {
        json!({
            "method": methods::LOGIN,
            "params": {
                "login": credentials.login,
                "pass": credentials.password,
                "agent": self.agent,
                "mode": "self-select",
            }
        })
    }

    fn parse_frame(&mut self, frame: &str) -> Result<Incoming> {
        let message = decode_frame(frame)?;
        self.flags.parse_v1(&message)
    }

    fn is_authorized(&self) -> bool {
        self.flags.authorized
    }

    fn session_id(&self) -> Option<&str> {
        self.flags.session_id.as_deref()
    }
}

/// Ethereum-style pools
#[derive(Debug, Default)]
pub struct EthStratumV1 {
    flags: SessionFlags,
}

impl EthStratumV1 {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[header, seed, target, height?]` as pushed for `eth_getWork`
    fn work_package(work: &[Value]) -> Result<Job> {
        let field = |idx: usize, name: &str| {
            work.get(idx)
                .and_then(Value::as_str)
                .ok_or_else(|| StratumError::MalformedFrame(format!("invalid work {}", name)))
        };

        let header = field(0, "header")?;
        let seed = field(1, "seed")?;
        let target = field(2, "target")?;
        let height = match work.get(3).and_then(Value::as_str) {
            Some(h) => u64::from_str_radix(strip_0x(h), 16)
                .map_err(|e| StratumError::MalformedFrame(format!("invalid work height: {}", e)))?,
            None => 0,
        };

        Ok(Job {
            job_id: strip_0x(header).to_string(),
            height,
            blob: HexString::from_hex(strip_0x(header))?,
            target: target.to_string(),
            seed_hash: HexString::from_hex(strip_0x(seed))?,
        })
    }
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

impl PoolVariant for EthStratumV1 {
    fn kind(&self) -> VariantKind {
        VariantKind::Eth
    }

    fn build_subscribe(&self, _credentials: &SessionCredentials) -> Option<Value> {
        None
    }

    fn build_authorize(&self, credentials: &SessionCredentials) -> Value {
        json!({
            "method": methods::ETH_SUBMIT_LOGIN,
            "params": [credentials.login, credentials.password],
        })
    }

    fn parse_frame(&mut self, frame: &str) -> Result<Incoming> {
        let message = decode_frame(frame)?;

        if message.get("params").is_none() {
            match message.get("result") {
                Some(Value::Array(work)) if work.len() >= 3 => {
                    return Ok(Incoming::Job(Self::work_package(work)?));
                }
                Some(Value::Bool(true)) => self.flags.authorized = true,
                _ => {}
            }
        }

        self.flags.parse_v1(&message)
    }

    fn is_authorized(&self) -> bool {
        self.flags.authorized
    }

    fn session_id(&self) -> Option<&str> {
        self.flags.session_id.as_deref()
    }
}

/// Pools using the uniform `mining.*` methods
#[derive(Debug)]
pub struct StandardStratumV2 {
    agent: String,
    flags: SessionFlags,
}

impl StandardStratumV2 {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            flags: SessionFlags::default(),
        }
    }

    fn notification(method: &str, params: Option<&Value>) -> Result<Incoming> {
        if method != methods::NOTIFY {
            return Ok(Incoming::Notice {
                method: method.to_string(),
            });
        }

        let params = params.ok_or_else(|| {
            StratumError::MalformedFrame("mining.notify without params".to_string())
        })?;

        Ok(Incoming::Job(Job::from_notification(params)?))
    }
}

impl PoolVariant for StandardStratumV2 {
    fn kind(&self) -> VariantKind {
        VariantKind::Standard
    }

    fn build_subscribe(&self, credentials: &SessionCredentials) -> Option<Value> {
        Some(json!({
            "method": methods::SUBSCRIBE,
            "params": [self.agent, null, credentials.host, credentials.port],
        }))
    }

    fn build_authorize(&self, credentials: &SessionCredentials) -> Value {
        json!({
            "method": methods::AUTHORIZE,
            "params": [credentials.login, credentials.password],
        })
    }

    fn parse_frame(&mut self, frame: &str) -> Result<Incoming> {
        let message = decode_frame(frame)?;

        if let Some(method) = message.get("method").and_then(Value::as_str) {
            return Self::notification(method, message.get("params"));
        }

        let response = RpcResponse::from_message(&message);
        match &response.result {
            Value::Bool(true) => self.flags.authorized = true,
            Value::Object(result) if result.get("status").and_then(Value::as_str) == Some("OK") => {
                self.flags.authorized = true
            }
            // [[["mining.notify", "<subscription id>"], ...], extranonce1, extranonce2_size]
            Value::Array(result) => {
                let subscription = result
                    .first()
                    .and_then(Value::as_array)
                    .and_then(|subs| subs.first())
                    .and_then(Value::as_array)
                    .and_then(|sub| sub.get(1))
                    .and_then(Value::as_str);

                if let Some(id) = subscription {
                    self.flags.session_id = Some(id.to_string());
                }
            }
            _ => {}
        }

        Ok(Incoming::Response(response))
    }

    fn is_authorized(&self) -> bool {
        self.flags.authorized
    }

    fn session_id(&self) -> Option<&str> {
        self.flags.session_id.as_deref()
    }
}
