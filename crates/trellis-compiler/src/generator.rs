//! Server module generation.
//!
//! Combines method descriptors with their projected schemas into the
//! [`ServerModule`] the request runtime registers against the HTTP
//! substrate. Schema shapes here are consumed by external validating
//! servers and must not change:
//!
//! - request body: `{"type":"object","properties":{"p0":...,"pN-1":...}}`
//!   (absent for zero-parameter methods);
//! - response: `{"2xx": <return schema>}`.

use serde::Serialize;
use serde_json::{Map, Value};

use trellis_api::{MethodDescriptor, ParamBinding};

/// One registered route of a generated module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub name: String,
    pub http_method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_schema: Option<Value>,
    pub response_schema: Value,
    pub bindings: Vec<ParamBinding>,
}

/// A deployable request-handling module for one API class.
///
/// Immutable once generated; the runtime builds its route table from this.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerModule {
    pub class_name: String,
    pub routes: Vec<RouteSpec>,
}

/// Emit the module for one class from its compiled descriptors.
pub fn generate_module(class_name: &str, methods: Vec<MethodDescriptor>) -> ServerModule {
    let routes = methods
        .into_iter()
        .map(|desc| {
            let body_schema = if desc.param_schemas.is_empty() {
                None
            } else {
                let mut properties = Map::default();
                for (idx, schema) in desc.param_schemas.iter().enumerate() {
                    properties.insert(format!("p{}", idx), Value::Object(schema.clone()));
                }
                let mut body = Map::default();
                body.insert("type".into(), Value::String("object".into()));
                body.insert("properties".into(), Value::Object(properties));
                Some(Value::Object(body))
            };

            let mut response = Map::default();
            response.insert("2xx".into(), Value::Object(desc.return_schema.clone()));

            RouteSpec {
                name: desc.name,
                http_method: desc.http_method,
                path: desc.path,
                body_schema,
                response_schema: Value::Object(response),
                bindings: desc.bindings,
            }
        })
        .collect();

    ServerModule {
        class_name: class_name.to_string(),
        routes,
    }
}
