//! JSON-RPC 2.0 envelopes.

use crate::error::{ErrorObject, RpcError};
use crate::JSONRPC_VERSION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Identifier of an inbound or outbound request.
///
/// Identifiers generated locally are always strings; peers may also use
/// integers, which are echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Parses an `id` member. `None` for anything that is not a string or integer.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RequestId::String(s.clone())),
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            _ => None,
        }
    }

    /// Returns the string form if this is a string identifier.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::String(s) => Some(s),
            RequestId::Number(_) => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

/// Request parameters: an ordered sequence or a keyed mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Bound positionally.
    Positional(Vec<Value>),
    /// Bound by name.
    Keyed(Map<String, Value>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    /// Validates the `params` member of an inbound request.
    ///
    /// A missing member is an empty positional list.
    pub fn from_member(value: Option<&Value>) -> Result<Self, RpcError> {
        match value {
            None => Ok(Params::default()),
            Some(Value::Array(items)) => Ok(Params::Positional(items.clone())),
            Some(Value::Object(map)) => Ok(Params::Keyed(map.clone())),
            Some(_) => Err(RpcError::invalid_request().with_data(json!({"reason": "params"}))),
        }
    }

    pub fn positional(&self) -> Option<&[Value]> {
        match self {
            Params::Positional(items) => Some(items),
            Params::Keyed(_) => None,
        }
    }

    pub fn keyed(&self) -> Option<&Map<String, Value>> {
        match self {
            Params::Keyed(map) => Some(map),
            Params::Positional(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(items) => items.len(),
            Params::Keyed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Params::Positional(items) => Value::Array(items.clone()),
            Params::Keyed(map) => Value::Object(map.clone()),
        }
    }

    /// Binds the parameters to a typed argument list.
    ///
    /// Positional parameters bind to tuples or sequences, keyed parameters
    /// to structs or maps. Arity and type mismatches fail with `InvalidParams`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            RpcError::invalid_params().with_data(json!({
                "exception": "TypeError",
                "message": e.to_string(),
            }))
        })
    }

    /// Fails with `InvalidParams` unless no arguments were supplied.
    pub fn ensure_empty(&self) -> Result<(), RpcError> {
        if self.is_empty() {
            return Ok(());
        }
        Err(RpcError::invalid_params().with_data(json!({
            "exception": "TypeError",
            "message": format!("takes no arguments ({} given)", self.len()),
        })))
    }
}

impl From<Vec<Value>> for Params {
    fn from(items: Vec<Value>) -> Self {
        Params::Positional(items)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Keyed(map)
    }
}

/// Arrays become positional, objects keyed, `null` empty; any other value
/// is sent as a single positional argument.
impl From<Value> for Params {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Params::Positional(items),
            Value::Object(map) => Params::Keyed(map),
            Value::Null => Params::default(),
            other => Params::Positional(vec![other]),
        }
    }
}

/// How an inbound envelope is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Carries `result` or `error`; correlated against pending requests.
    Response,
    /// Method-bearing with an `id`; a reply is expected.
    Request,
    /// Method-bearing without an `id`; no reply.
    Notification,
}

/// A decoded but not yet validated envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns a member of the envelope.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Classifies the envelope.
    pub fn kind(&self) -> EnvelopeKind {
        if self.fields.contains_key("result") || self.fields.contains_key("error") {
            EnvelopeKind::Response
        } else if matches!(self.fields.get("id"), None | Some(Value::Null)) {
            EnvelopeKind::Notification
        } else {
            EnvelopeKind::Request
        }
    }

    /// Returns the `id` member if it is a usable identifier.
    pub fn request_id(&self) -> Option<RequestId> {
        self.fields.get("id").and_then(RequestId::from_value)
    }

    fn has_version(&self) -> bool {
        self.fields.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.fields
    }
}

/// Request or notification envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Protocol version, always "2.0".
    #[serde(rename = "jsonrpc")]
    pub version: String,

    /// Correlation id; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Method name.
    pub method: String,

    /// Method parameters.
    pub params: Params,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: Params::default(),
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: Params::default(),
        }
    }

    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validates a method-bearing envelope.
    ///
    /// Violations fail with `InvalidRequest`; `data.reason` names the
    /// offending member.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, RpcError> {
        let invalid = |reason: &str| RpcError::invalid_request().with_data(json!({"reason": reason}));

        if !envelope.has_version() {
            return Err(invalid("jsonrpc"));
        }

        let method = envelope
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("method"))?
            .to_string();

        let id = match envelope.get("id") {
            None | Some(Value::Null) => None,
            Some(value) => Some(RequestId::from_value(value).ok_or_else(|| invalid("id"))?),
        };

        let params = Params::from_member(envelope.get("params"))?;

        Ok(Self {
            version: JSONRPC_VERSION.to_string(),
            id,
            method,
            params,
        })
    }
}

/// Response envelope. Carries exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Protocol version, always "2.0".
    #[serde(rename = "jsonrpc")]
    pub version: String,

    /// Id of the request this answers; `null` when it could not be determined.
    pub id: Option<RequestId>,

    /// Result payload (for successful responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error details (for error responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn ok(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, error: &RpcError) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.to_object()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Reconstructs the outcome carried by a response envelope.
    ///
    /// Returns the peer's result, the peer's reconstructed error, or
    /// `InvalidResponse` when the envelope itself is malformed.
    pub fn reconstruct(envelope: &Envelope) -> Result<Value, RpcError> {
        if !envelope.has_version() {
            return Err(RpcError::invalid_response("missing or wrong jsonrpc version"));
        }
        if envelope.get("id").is_none() {
            return Err(RpcError::invalid_response("response has no id"));
        }

        match (envelope.get("result"), envelope.get("error")) {
            (Some(result), None) => Ok(result.clone()),
            (None, Some(error)) => Err(RpcError::from_wire(error)?),
            (Some(_), Some(_)) => Err(RpcError::invalid_response(
                "response carries both result and error",
            )),
            (None, None) => Err(RpcError::invalid_response(
                "response carries neither result nor error",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn envelope(value: Value) -> Envelope {
        match value {
            Value::Object(map) => Envelope::new(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_request_serialization() {
        let req = Request::new("1", "foo");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "id": "1", "method": "foo", "params": []})
        );
    }

    #[test]
    fn test_notification_serialization() {
        let req = Request::notification("bar").with_params(vec![json!(1), json!(2), json!("foo")]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "method": "bar", "params": [1, 2, "foo"]})
        );
    }

    #[test]
    fn test_response_ok_serialization() {
        let resp = Response::ok("1", json!([2, 1]));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":"1","result":[2,1]}"#);
    }

    #[test]
    fn test_response_null_result_is_kept() {
        let resp = Response::ok("1", Value::Null);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": "1", "result": null}));
    }

    #[test]
    fn test_response_error_serialization() {
        let resp = Response::error(None, &RpcError::parse_error());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": "Parse error"}
            })
        );
    }

    #[test]
    fn test_envelope_kind() {
        assert_eq!(
            envelope(json!({"jsonrpc": "2.0", "id": "1", "result": 1})).kind(),
            EnvelopeKind::Response
        );
        assert_eq!(
            envelope(json!({"jsonrpc": "2.0", "id": null, "error": {}})).kind(),
            EnvelopeKind::Response
        );
        assert_eq!(
            envelope(json!({"jsonrpc": "2.0", "id": "1", "method": "m"})).kind(),
            EnvelopeKind::Request
        );
        assert_eq!(
            envelope(json!({"jsonrpc": "2.0", "method": "m"})).kind(),
            EnvelopeKind::Notification
        );
        assert_eq!(
            envelope(json!({"jsonrpc": "2.0", "id": null, "method": "m"})).kind(),
            EnvelopeKind::Notification
        );
        assert_eq!(envelope(json!({"id": 12})).kind(), EnvelopeKind::Request);
    }

    #[test]
    fn test_request_from_envelope() {
        let req = Request::from_envelope(&envelope(json!({
            "jsonrpc": "2.0", "id": "2", "method": "bar", "params": [1, 2]
        })))
        .unwrap();
        assert_eq!(req.id, Some(RequestId::from("2")));
        assert_eq!(req.method, "bar");
        assert_eq!(req.params, Params::Positional(vec![json!(1), json!(2)]));

        let req = Request::from_envelope(&envelope(json!({
            "jsonrpc": "2.0", "id": 3, "method": "quux", "params": {"foo": 2}
        })))
        .unwrap();
        assert_eq!(req.id, Some(RequestId::Number(3)));
        assert_eq!(req.params.keyed().unwrap()["foo"], json!(2));

        let req =
            Request::from_envelope(&envelope(json!({"jsonrpc": "2.0", "method": "foo"}))).unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_request_from_envelope_invalid() {
        for (value, reason) in [
            (json!({"id": 12}), "jsonrpc"),
            (json!({"jsonrpc": "1.0", "method": "m"}), "jsonrpc"),
            (json!({"jsonrpc": "2.0", "id": "1"}), "method"),
            (json!({"jsonrpc": "2.0", "method": 5}), "method"),
            (json!({"jsonrpc": "2.0", "id": true, "method": "m"}), "id"),
            (json!({"jsonrpc": "2.0", "method": "m", "params": 2}), "params"),
            (json!({"jsonrpc": "2.0", "method": "m", "params": "foo"}), "params"),
        ] {
            let err = Request::from_envelope(&envelope(value.clone())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{value}");
            assert_eq!(err.data().unwrap()["reason"], reason, "{value}");
        }
    }

    #[test]
    fn test_params_bind_positional() {
        let params = Params::from(json!([1, 2]));
        let (p, q): (i64, i64) = params.bind().unwrap();
        assert_eq!((p, q), (1, 2));

        // Wrong arity
        let err = params.bind::<(i64,)>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert_eq!(err.data().unwrap()["exception"], "TypeError");
    }

    #[test]
    fn test_params_bind_keyed() {
        #[derive(Debug, Deserialize)]
        struct Args {
            p: i64,
        }
        let params = Params::from(json!({"p": 3}));
        let args: Args = params.bind().unwrap();
        assert_eq!(args.p, 3);

        let err = Params::from(json!({"p": "three"})).bind::<Args>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }

    #[test]
    fn test_params_ensure_empty() {
        assert!(Params::default().ensure_empty().is_ok());
        let err = Params::from(json!([1, 2])).ensure_empty().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }

    #[test]
    fn test_params_from_value() {
        assert_eq!(Params::from(Value::Null), Params::default());
        assert_eq!(Params::from(json!(5)), Params::Positional(vec![json!(5)]));
    }

    #[test]
    fn test_reconstruct_result() {
        let env = envelope(json!({"jsonrpc": "2.0", "id": "1", "result": [2, 3, "bar"]}));
        assert_eq!(Response::reconstruct(&env).unwrap(), json!([2, 3, "bar"]));
    }

    #[test]
    fn test_reconstruct_error() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": "1",
            "error": {"code": -32601, "message": "Method not found"}
        }));
        let err = Response::reconstruct(&env).unwrap_err();
        assert!(matches!(err, RpcError::MethodNotFound(_)));
    }

    #[test]
    fn test_reconstruct_invalid() {
        for value in [
            json!({"result": [], "id": "1"}),
            json!({"jsonrpc": "2.0", "result": []}),
            json!({"jsonrpc": "other", "result": [], "id": "1"}),
            json!({"jsonrpc": "2.0", "result": [], "error": {}, "id": "1"}),
            json!({"jsonrpc": "2.0", "id": "1", "error": {"code": "x", "message": "m"}}),
        ] {
            let err = Response::reconstruct(&envelope(value.clone())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidResponse, "{value}");
        }
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId::from("7").to_string(), "\"7\"");
        assert_eq!(RequestId::from(7).to_string(), "7");
    }
}
