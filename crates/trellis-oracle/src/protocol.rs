//! JSON-RPC frames and payloads for the oracle wire contract.
//!
//! One method call per request. The channel is private: the frame shapes
//! here are an implementation detail shared only with `js/oracle.js`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use trellis_api::types::Type;

#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &'static str, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Resolved types for one method: each parameter's structural type plus the
/// declared return type with one async wrapper layer unwrapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodTypes {
    pub params: Vec<Type>,

    pub return_type: Type,
}

/// What went wrong with one `queryTypesOfMethod` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryErrorKind {
    FileNotFound,
    DefaultExportNotFound,
    MethodNotFound,
    RecursiveType,
    Other,
}

impl QueryErrorKind {
    /// The service tags errors with a machine-readable kind in the JSON-RPC
    /// `error.data` field.
    pub fn from_error_data(data: Option<&Value>) -> Self {
        data.and_then(|d| d.get("kind"))
            .and_then(|k| serde_json::from_value(k.clone()).ok())
            .unwrap_or(QueryErrorKind::Other)
    }
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The oracle process failed to start, crashed, or never became ready.
    /// Fatal: type resolution cannot proceed without it.
    #[error("type oracle unavailable: {0}")]
    Unavailable(String),

    /// A single query failed. Localized to one method; names the file and
    /// method so the diagnostic can be attributed to a source location.
    #[error("type query failed for `{method}` in {file}: {message}")]
    Query {
        kind: QueryErrorKind,
        file: String,
        method: String,
        message: String,
    },

    #[error("malformed oracle response: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_api::types::Keyword;

    #[test]
    fn method_types_wire_format() {
        let json = r#"{
            "params": [{"kind":"keyword","keyword":"string"}],
            "returnType": {"kind":"keyword","keyword":"number"}
        }"#;
        let types: MethodTypes = serde_json::from_str(json).unwrap();
        assert_eq!(types.params, vec![Type::keyword(Keyword::String)]);
        assert_eq!(types.return_type, Type::keyword(Keyword::Number));
    }

    #[test]
    fn error_kind_from_data() {
        let data = serde_json::json!({"kind": "methodNotFound"});
        assert_eq!(
            QueryErrorKind::from_error_data(Some(&data)),
            QueryErrorKind::MethodNotFound
        );
        assert_eq!(
            QueryErrorKind::from_error_data(None),
            QueryErrorKind::Other
        );
    }

    #[test]
    fn request_serializes_as_jsonrpc() {
        let req = RpcRequest::new("checkStarted", vec![], 7);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["method"], "checkStarted");
        assert_eq!(v["id"], 7);
    }
}
