use crate::{
    error::{Result, StratumError},
    job::Job,
};
use serde_json::Value;

/// JSON-RPC version stamped on every outgoing message
pub const JSONRPC_VERSION: &str = "2.0";

/// Stratum methods
pub mod methods {
    pub const LOGIN: &str = "login";
    pub const JOB: &str = "job";
    pub const ETH_SUBMIT_LOGIN: &str = "eth_submitLogin";
    pub const SUBSCRIBE: &str = "mining.subscribe";
    pub const AUTHORIZE: &str = "mining.authorize";
    pub const NOTIFY: &str = "mining.notify";
}

/// Direct answer to a request we sent
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: Option<Value>,
    pub result: Value,
    pub error: Option<Value>,

    /// Job embedded in the result (XMR login response)
    pub job: Option<Job>,
}

/// Outcome of parsing one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Response correlated with an outgoing request by id
    Response(RpcResponse),

    /// Asynchronous new job
    Job(Job),

    /// Notification carrying nothing the session acts on
    Notice { method: String },
}

impl RpcResponse {
    /// Split a decoded message into id, result and error
    pub fn from_message(message: &Value) -> Self {
        Self {
            id: message.get("id").filter(|id| !id.is_null()).cloned(),
            result: message.get("result").cloned().unwrap_or(Value::Null),
            error: message.get("error").filter(|e| !e.is_null()).cloned(),
            job: None,
        }
    }

    /// Turn a pool error object into `StratumError::JsonRpc`.
    ///
    /// Pools report errors as `{code, message}`, `[code, message, data]`
    /// or a bare string.
    pub fn into_result(self) -> Result<Self> {
        let Some(error) = &self.error else {
            return Ok(self);
        };

        let (code, message) = match error {
            Value::Object(obj) => (
                obj.get("code").and_then(Value::as_i64).unwrap_or(-1),
                obj.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            Value::Array(arr) => (
                arr.first().and_then(Value::as_i64).unwrap_or(-1),
                arr.get(1)
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            Value::String(s) => (-1, s.clone()),
            other => (-1, other.to_string()),
        };

        Err(StratumError::JsonRpc { code, message })
    }
}

/// Decode a frame as a JSON object
pub fn decode_frame(frame: &str) -> Result<Value> {
    let message: Value = serde_json::from_str(frame)
        .map_err(|e| StratumError::MalformedFrame(format!("{}: {}", e, frame)))?;

    if !message.is_object() {
        return Err(StratumError::MalformedFrame(format!(
            "expected a JSON object: {}",
            frame
        )));
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_split() {
        let response = RpcResponse::from_message(&json!({
            "id": 5, "jsonrpc": "2.0", "result": {"status": "OK"}, "error": null
        }));

        assert_eq!(response.id, Some(json!(5)));
        assert_eq!(response.result["status"], "OK");
        assert!(response.error.is_none());
        assert!(response.into_result().is_ok());
    }

    #[test]
    fn test_error_shapes() {
        let object = RpcResponse::from_message(&json!({
            "id": 2, "error": {"code": -1, "message": "Invalid payment address"}
        }));
        match object.into_result() {
            Err(StratumError::JsonRpc { code, message }) => {
                assert_eq!(code, -1);
                assert_eq!(message, "Invalid payment address");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let array = RpcResponse::from_message(&json!({
            "id": 2, "result": null, "error": [24, "Unauthorized worker", null]
        }));
        assert!(matches!(
            array.into_result(),
            Err(StratumError::JsonRpc { code: 24, .. })
        ));
    }

    #[test]
    fn test_decode_frame_rejects_non_objects() {
        assert!(decode_frame("{\"id\":1}").is_ok());
        assert!(matches!(decode_frame("[1,2]"), Err(StratumError::MalformedFrame(_))));
        assert!(matches!(decode_frame("not json"), Err(StratumError::MalformedFrame(_))));
    }
}
