//! JSON-RPC 2.0 wire types for the message bus.

use contxt_core::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version sent with every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Remote methods exposed by the message bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMethod {
    /// Authorize the socket with an API token.
    Authorize,
    /// Publish a message to a channel.
    Publish,
    /// Subscribe to a channel.
    Subscribe,
    /// Acknowledge a pushed message.
    Acknowledge,
}

impl BusMethod {
    /// Fully-qualified method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorize => "MessageBus.Authorize",
            Self::Publish => "MessageBus.Publish",
            Self::Subscribe => "MessageBus.Subscribe",
            Self::Acknowledge => "MessageBus.Acknowledge",
        }
    }
}

impl Serialize for BusMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outgoing request envelope.
#[derive(Clone, Debug, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Remote method.
    pub method: BusMethod,
    /// Method parameters.
    pub params: Value,
    /// Correlation id echoed back by the response.
    pub id: CorrelationId,
}

impl JsonRpcRequest {
    /// Build a request envelope.
    pub fn new(method: BusMethod, params: Value, id: CorrelationId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id,
        }
    }
}

/// Any inbound frame: a response to a request or a subscription push.
///
/// Unknown fields are ignored. `null` fields deserialize as absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundMessage {
    /// Correlation id for responses, subscription id for pushes.
    #[serde(default)]
    pub id: Option<Value>,
    /// Success payload.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(default)]
    pub error: Option<Value>,
}

impl InboundMessage {
    /// Handler-table key for this frame.
    ///
    /// String ids are used as-is and numeric ids by their decimal text;
    /// any other shape has no key.
    pub fn key(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Decoded `result` of a subscription push.
#[derive(Clone, Debug, PartialEq)]
pub enum Push {
    /// A delivered message awaiting acknowledgement.
    Message {
        /// Acknowledgement id.
        id: String,
        /// Application payload.
        body: Value,
    },
    /// The server reported a subscription-level error.
    Error(Value),
}

impl Push {
    /// Interpret a push `result` object.
    ///
    /// Returns `None` when the payload is neither an error nor carries a
    /// message id.
    pub fn from_result(result: &Value) -> Option<Self> {
        if let Some(error) = result.get("error").filter(|e| !e.is_null()) {
            return Some(Self::Error(error.clone()));
        }
        let id = match result.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let body = result.get("body").cloned().unwrap_or(Value::Null);
        Some(Self::Message { id, body })
    }
}

/// JavaScript-style truthiness for argument validation: `null`, `false`,
/// `0` and `""` count as missing.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_names_on_the_wire() {
        assert_eq!(BusMethod::Authorize.as_str(), "MessageBus.Authorize");
        assert_eq!(BusMethod::Publish.as_str(), "MessageBus.Publish");
        assert_eq!(BusMethod::Subscribe.as_str(), "MessageBus.Subscribe");
        assert_eq!(BusMethod::Acknowledge.as_str(), "MessageBus.Acknowledge");
    }

    #[test]
    fn request_envelope_shape() {
        let req = JsonRpcRequest::new(
            BusMethod::Publish,
            json!({"service_id": "svc-1", "channel": "feed:1", "message": {"x": 1}}),
            CorrelationId::from("abc"),
        );
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "jsonrpc": "2.0",
                "method": "MessageBus.Publish",
                "params": {"service_id": "svc-1", "channel": "feed:1", "message": {"x": 1}},
                "id": "abc",
            })
        );
    }

    #[test]
    fn wire_format_success_response() {
        let raw = r#"{"jsonrpc": "2.0", "id": "r1", "result": {"subscription": "sub-9"}}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.key().as_deref(), Some("r1"));
        assert_eq!(msg.result.unwrap()["subscription"], "sub-9");
        assert!(msg.error.is_none());
    }

    #[test]
    fn wire_format_error_response() {
        let raw = r#"{"jsonrpc": "2.0", "id": "r2", "error": {"code": 401, "message": "Unauthorized"}}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.result.is_none());
        assert_eq!(msg.error.unwrap()["code"], 401);
    }

    #[test]
    fn null_result_reads_as_absent() {
        let msg: InboundMessage = serde_json::from_str(r#"{"id": "r3", "result": null}"#).unwrap();
        assert!(msg.result.is_none());
    }

    #[test]
    fn numeric_id_keys_by_decimal_text() {
        let msg: InboundMessage = serde_json::from_str(r#"{"id": 17, "result": 1}"#).unwrap();
        assert_eq!(msg.key().as_deref(), Some("17"));
    }

    #[test]
    fn object_id_has_no_key() {
        let msg: InboundMessage = serde_json::from_str(r#"{"id": {"a": 1}}"#).unwrap();
        assert!(msg.key().is_none());
        let msg: InboundMessage = serde_json::from_str("{}").unwrap();
        assert!(msg.key().is_none());
    }

    #[test]
    fn push_message_decodes_id_and_body() {
        let push = Push::from_result(&json!({"id": "m-1", "body": {"temp": 71}})).unwrap();
        assert_eq!(
            push,
            Push::Message {
                id: "m-1".into(),
                body: json!({"temp": 71})
            }
        );
    }

    #[test]
    fn push_without_body_delivers_null() {
        let push = Push::from_result(&json!({"id": "m-2"})).unwrap();
        assert_eq!(
            push,
            Push::Message {
                id: "m-2".into(),
                body: Value::Null
            }
        );
    }

    #[test]
    fn push_error_wins_over_body() {
        let push = Push::from_result(&json!({"id": "m-3", "error": "boom"})).unwrap();
        assert_eq!(push, Push::Error(json!("boom")));
    }

    #[test]
    fn push_without_id_is_rejected() {
        assert!(Push::from_result(&json!({"body": 1})).is_none());
        assert!(Push::from_result(&json!("plain")).is_none());
    }

    #[test]
    fn falsiness() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(is_falsy(&v), "{v} should be falsy");
        }
        for v in [json!(true), json!(1), json!("x"), json!([]), json!({})] {
            assert!(!is_falsy(&v), "{v} should be truthy");
        }
    }
}
