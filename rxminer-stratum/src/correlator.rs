//! Request ids and response matching.
//!
//! Ids start at 1 and are never reused within a session. Every prepared
//! request stays pending until a response with its id arrives, it is
//! cancelled, or the session ends.

use crate::{
    error::{Result, StratumError},
    protocol::{RpcResponse, JSONRPC_VERSION},
};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// A request that has been sent and not yet answered
#[derive(Debug)]
pub struct PendingRequest {
    pub id: u64,
    pub issued_payload: Value,
    responder: Option<oneshot::Sender<RpcResponse>>,
}

impl PendingRequest {
    pub fn method(&self) -> Option<&str> {
        self.issued_payload.get("method").and_then(Value::as_str)
    }

    /// Hand the response to whoever is awaiting it, if anyone
    pub fn respond(self, response: RpcResponse) {
        if let Some(tx) = self.responder {
            let _ = tx.send(response);
        }
    }
}

/// Issues ids and tracks pending requests
#[derive(Debug)]
pub struct Correlator {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Stamp `payload` with `jsonrpc` and a fresh `id`, register it as
    /// pending and return the id with the newline-terminated frame text.
    pub fn prepare(&mut self, mut payload: Value) -> Result<(u64, String)> {
        let Some(fields) = payload.as_object_mut() else {
            return Err(StratumError::InvalidRequest(
                "payload must be a JSON object".to_string(),
            ));
        };

        let id = self.next_id();
        fields
            .entry("jsonrpc")
            .or_insert_with(|| Value::String(JSONRPC_VERSION.to_string()));
        fields.insert("id".to_string(), Value::from(id));

        let mut line = serde_json::to_string(&payload)?;
        line.push('\n');

        self.pending.insert(
            id,
            PendingRequest {
                id,
                issued_payload: payload,
                responder: None,
            },
        );

        Ok((id, line))
    }

    /// Deliver the response for `id` through `tx` once it arrives
    pub fn await_response(&mut self, id: u64, tx: oneshot::Sender<RpcResponse>) -> bool {
        match self.pending.get_mut(&id) {
            Some(pending) => {
                pending.responder = Some(tx);
                true
            }
            None => false,
        }
    }

    /// Remove and return the pending request answered by `id`
    pub fn resolve(&mut self, id: &Value) -> Result<PendingRequest> {
        id.as_u64()
            .and_then(|n| self.pending.remove(&n))
            .ok_or_else(|| StratumError::UnexpectedResponse(id.clone()))
    }

    /// Forget a request, e.g. after a timeout
    pub fn cancel(&mut self, id: u64) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Take every unanswered request, oldest first
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let mut pending: Vec<_> = self.pending.drain().map(|(_, p)| p).collect();
        pending.sort_by_key(|p| p.id);
        pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_ids_strictly_increase() {
        let mut correlator = Correlator::new();
        let ids = [correlator.next_id(), correlator.next_id(), correlator.next_id()];
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn test_prepare_stamps_id_and_version() {
        let mut correlator = Correlator::new();
        let (id, line) = correlator
            .prepare(json!({"method": "login", "params": {"login": "x"}}))
            .unwrap();

        assert_eq!(id, 1);
        assert!(line.ends_with('\n'));

        let sent: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(sent["id"], 1);
        assert_eq!(sent["jsonrpc"], "2.0");
        assert_eq!(sent["method"], "login");
        assert_eq!(correlator.pending_len(), 1);
    }

    #[test]
    fn test_prepare_rejects_non_object() {
        let mut correlator = Correlator::new();
        assert!(matches!(
            correlator.prepare(json!(["login"])),
            Err(StratumError::InvalidRequest(_))
        ));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn test_resolve_matches_once() {
        let mut correlator = Correlator::new();
        let (id, _) = correlator.prepare(json!({"method": "login"})).unwrap();

        let pending = correlator.resolve(&json!(id)).unwrap();
        assert_eq!(pending.id, id);
        assert_eq!(pending.method(), Some("login"));

        assert!(matches!(
            correlator.resolve(&json!(id)),
            Err(StratumError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_ids() {
        let mut correlator = Correlator::new();
        assert!(correlator.resolve(&json!(99)).is_err());
        assert!(correlator.resolve(&json!("abc")).is_err());
    }

    #[tokio::test]
    async fn test_responder_receives_response() {
        let mut correlator = Correlator::new();
        let (id, _) = correlator.prepare(json!({"method": "getjob"})).unwrap();

        let (tx, rx) = oneshot::channel();
        assert!(correlator.await_response(id, tx));

        let response = RpcResponse {
            id: Some(json!(id)),
            result: json!({"status": "OK"}),
            error: None,
            job: None,
        };
        correlator.resolve(&json!(id)).unwrap().respond(response.clone());

        assert_eq!(rx.await.unwrap(), response);
    }

    #[test]
    fn test_cancel_leaves_other_requests() {
        let mut correlator = Correlator::new();
        let (first, _) = correlator.prepare(json!({"method": "a"})).unwrap();
        let (second, _) = correlator.prepare(json!({"method": "b"})).unwrap();

        assert!(correlator.cancel(first).is_some());
        assert!(correlator.resolve(&json!(second)).is_ok());
    }

    #[test]
    fn test_drain_is_ordered() {
        let mut correlator = Correlator::new();
        for method in ["a", "b", "c"] {
            correlator.prepare(json!({ "method": method })).unwrap();
        }

        let ids: Vec<_> = correlator.drain().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(correlator.pending_len(), 0);
    }
}
