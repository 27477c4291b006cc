//! API definitions for Trellis.
//!
//! This crate holds the pieces shared between the compiler and the request
//! runtime: the structural type IR reported by the type oracle, its JSON
//! Schema projection, and the descriptor model for compiled API methods.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Type;

pub mod json_schema;
pub mod types;

pub use json_schema::{JsonMap, SchemaError, ToJsonSchema};

/// Serializable summary of every compiled API file in a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProject {
    pub files: Vec<Arc<ApiFile>>,
}

/// Contains enough information to generate a client for one API file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFile {
    pub class_name: String,
    pub methods: Vec<Arc<ApiMethod>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMethod {
    pub name: String,

    pub params: Vec<ApiParam>,

    pub return_type: Arc<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiParam {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Arc<Type>,
}

/// How one positional parameter slot is bound in the generated handler.
///
/// The schema attached to a pattern-bound slot always describes the whole
/// incoming value, never the destructured sub-fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ParamPattern {
    Identifier { name: String },
    ObjectPattern { fields: Vec<String> },
    ArrayPattern { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamBinding {
    pub pattern: ParamPattern,
    #[serde(default)]
    pub optional: bool,
}

/// Source-level parameter location annotation.
///
/// Compile-time metadata only; carried through for tooling, not enforced by
/// the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
}

/// Validation rules attached to a method: field name mapped to an ordered
/// list of validator references, in declaration order.
pub type FieldRules = Vec<(String, Vec<String>)>;

/// One compiled API method, ready for code generation.
///
/// Built exclusively by the compiler pipeline and immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    pub http_method: String,
    pub path: String,

    /// Index-aligned with `param_schemas`.
    pub bindings: Vec<ParamBinding>,
    pub param_schemas: Vec<JsonMap>,
    pub return_schema: JsonMap,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Option<ParamLocation>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: FieldRules,
}

impl MethodDescriptor {
    /// Default route path for a method of a named class.
    pub fn default_path(class_name: &str, method_name: &str) -> String {
        format!("/{}/{}", class_name, method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keyword;

    #[test]
    fn manifest_round_trip() {
        let file = ApiFile {
            class_name: "TodoService".to_string(),
            methods: vec![Arc::new(ApiMethod {
                name: "createTodo".to_string(),
                params: vec![ApiParam {
                    name: Some("title".to_string()),
                    ty: Arc::new(Type::keyword(Keyword::String)),
                }],
                return_type: Arc::new(Type::keyword(Keyword::String)),
            })],
        };

        let json = serde_json::to_string(&ApiProject { files: vec![Arc::new(file)] }).unwrap();
        let back: ApiProject = serde_json::from_str(&json).unwrap();

        assert_eq!(back.files.len(), 1);
        assert_eq!(back.files[0].class_name, "TodoService");
        assert_eq!(back.files[0].methods[0].name, "createTodo");
        assert_eq!(
            back.files[0].methods[0].params[0].name.as_deref(),
            Some("title")
        );
    }

    #[test]
    fn manifest_keys_are_camel_case() {
        let file = ApiFile {
            class_name: "TodoService".to_string(),
            methods: vec![],
        };
        let v = serde_json::to_value(&file).unwrap();
        assert!(v.get("className").is_some());
    }

    #[test]
    fn binding_wire_format() {
        let json = r#"{"pattern":{"kind":"identifier","name":"title"}}"#;
        let binding: ParamBinding = serde_json::from_str(json).unwrap();
        assert!(!binding.optional);
        assert_eq!(
            binding.pattern,
            ParamPattern::Identifier {
                name: "title".to_string()
            }
        );
    }

    #[test]
    fn default_route_path() {
        assert_eq!(
            MethodDescriptor::default_path("TodoService", "createTodo"),
            "/TodoService/createTodo"
        );
    }
}
