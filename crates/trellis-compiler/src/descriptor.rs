//! Method descriptor extraction.
//!
//! The surface syntax and decorator grammar belong to an external parser;
//! its output arrives here as [`RawClass`]. Extraction issues one oracle
//! query per method, projects the resolved types into schemas, and builds
//! the immutable [`MethodDescriptor`]s the generator consumes.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use trellis_api::json_schema::ToJsonSchema;
use trellis_api::{
    ApiMethod, ApiFile, ApiParam, FieldRules, MethodDescriptor, ParamBinding, ParamLocation,
    ParamPattern,
};
use trellis_oracle::{OracleError, TypeOracle};

/// Parser output for one annotated class declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClass {
    /// `None` for an anonymous default export, which is a hard compile
    /// error: route paths and wrapper metadata key off the class name.
    pub class_name: Option<String>,
    pub methods: Vec<RawMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMethod {
    pub name: String,
    /// Explicit method-level configuration; defaults applied here.
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub params: Vec<RawParam>,
    /// Field name mapped to ordered validator references, from the
    /// validation decorator.
    #[serde(default)]
    pub validators: FieldRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParam {
    pub pattern: ParamPattern,
    #[serde(default)]
    pub optional: bool,
    /// Location decorator (query/path/header). Carried through as
    /// metadata, not enforced.
    #[serde(default)]
    pub location: Option<ParamLocation>,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("API class must have a name; anonymous default exports cannot be compiled")]
    AnonymousClass,

    /// The oracle is unreachable. Fatal for the whole compilation run.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// A localized per-method failure. Compilation of the remaining methods
/// continues.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub method: String,
    pub message: String,
}

/// Everything extracted from one class: descriptors ready for generation,
/// the resolved IR for the manifest, and localized failures.
#[derive(Debug)]
pub struct ExtractedClass {
    pub class_name: String,
    pub methods: Vec<MethodDescriptor>,
    pub api_methods: Vec<ApiMethod>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractedClass {
    pub fn to_api_file(&self) -> ApiFile {
        ApiFile {
            class_name: self.class_name.clone(),
            methods: self
                .api_methods
                .iter()
                .cloned()
                .map(std::sync::Arc::new)
                .collect(),
        }
    }
}

/// Build descriptors for every method of `raw`, querying the oracle once
/// per method.
pub async fn extract_class(
    filename: &str,
    raw: &RawClass,
    oracle: &dyn TypeOracle,
) -> Result<ExtractedClass, CompileError> {
    let class_name = raw
        .class_name
        .clone()
        .ok_or(CompileError::AnonymousClass)?;

    let mut methods = Vec::new();
    let mut api_methods = Vec::new();
    let mut diagnostics = Vec::new();

    for method in &raw.methods {
        let types = match oracle.query_types_of_method(filename, &method.name).await {
            Ok(types) => types,
            Err(err @ OracleError::Unavailable(_)) => return Err(err.into()),
            Err(err) => {
                warn!(file = filename, method = %method.name, error = %err, "skipping method");
                diagnostics.push(Diagnostic {
                    file: filename.to_string(),
                    method: method.name.clone(),
                    message: err.to_string(),
                });
                continue;
            }
        };

        if types.params.len() != method.params.len() {
            diagnostics.push(Diagnostic {
                file: filename.to_string(),
                method: method.name.clone(),
                message: format!(
                    "parser saw {} parameters but the oracle resolved {}",
                    method.params.len(),
                    types.params.len()
                ),
            });
            continue;
        }

        // A schema describes the whole positional value, pattern-bound or
        // not; an unresolvable type aborts this method only.
        let projected: Result<Vec<_>, _> =
            types.params.iter().map(|ty| ty.to_json_schema()).collect();
        let (param_schemas, return_schema) =
            match projected.and_then(|p| types.return_type.to_json_schema().map(|r| (p, r))) {
                Ok(v) => v,
                Err(err) => {
                    diagnostics.push(Diagnostic {
                        file: filename.to_string(),
                        method: method.name.clone(),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

        let descriptor = MethodDescriptor {
            name: method.name.clone(),
            http_method: method
                .http_method
                .clone()
                .unwrap_or_else(|| "POST".to_string()),
            path: method
                .path
                .clone()
                .unwrap_or_else(|| MethodDescriptor::default_path(&class_name, &method.name)),
            bindings: method
                .params
                .iter()
                .map(|p| ParamBinding {
                    pattern: p.pattern.clone(),
                    optional: p.optional,
                })
                .collect(),
            param_schemas,
            return_schema,
            locations: method.params.iter().map(|p| p.location).collect(),
            validators: method.validators.clone(),
        };

        debug!(method = %descriptor.name, path = %descriptor.path, "extracted method");

        api_methods.push(ApiMethod {
            name: method.name.clone(),
            params: types
                .params
                .into_iter()
                .map(|ty| ApiParam {
                    name: None,
                    ty: std::sync::Arc::new(ty),
                })
                .collect(),
            return_type: std::sync::Arc::new(types.return_type),
        });
        methods.push(descriptor);
    }

    Ok(ExtractedClass {
        class_name,
        methods,
        api_methods,
        diagnostics,
    })
}
