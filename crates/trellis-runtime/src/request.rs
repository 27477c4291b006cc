//! Request and reply handles, plus positional parameter reconstruction.
//!
//! Call arguments travel in the request body as an object keyed `p0`, `p1`,
//! ... in any order. Anything that does not reconstruct into a contiguous
//! argument list is the client's mistake and surfaces as a
//! [`RequestShapeError`], never as a crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

use trellis_api::{ParamBinding, ParamPattern};

use crate::context::ContextStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestShapeError {
    #[error("request body must be a JSON object")]
    BodyNotObject,

    #[error("unexpected body key `{key}`")]
    UnexpectedKey { key: String },

    #[error("positional parameters are not contiguous: got `p{index}` among {count} entries")]
    NonContiguous { index: usize, count: usize },

    #[error("missing required parameter in slot {index}")]
    MissingRequired { index: usize },

    #[error("parameter in slot {index} must be {expected}")]
    PatternMismatch { index: usize, expected: String },

    #[error("expected at most {expected} parameters, got {got}")]
    TooManyParams { expected: usize, got: usize },
}

struct RequestInner {
    body: Value,
    context: ContextStore,
    reply: ApiReply,
}

/// Handle to one in-flight request. Cheap to clone; all clones share the
/// same body and context store.
#[derive(Clone)]
pub struct ApiRequest {
    inner: Arc<RequestInner>,
}

impl ApiRequest {
    pub fn new(body: Value) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                body,
                context: ContextStore::default(),
                reply: ApiReply::new(),
            }),
        }
    }

    pub fn body(&self) -> &Value {
        &self.inner.body
    }

    pub fn reply(&self) -> ApiReply {
        self.inner.reply.clone()
    }

    pub(crate) fn context(&self) -> &ContextStore {
        &self.inner.context
    }
}

struct ReplyInner {
    status: AtomicU16,
    headers: Mutex<HashMap<String, String>>,
}

/// Handle for shaping the response before the handler returns. Shared with
/// provider resolvers, which may set status or headers ahead of the body.
#[derive(Clone)]
pub struct ApiReply {
    inner: Arc<ReplyInner>,
}

impl ApiReply {
    fn new() -> Self {
        Self {
            inner: Arc::new(ReplyInner {
                status: AtomicU16::new(200),
                headers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn set_status(&self, status: u16) {
        self.inner.status.store(status, Ordering::Relaxed);
    }

    pub fn status(&self) -> u16 {
        self.inner.status.load(Ordering::Relaxed)
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut headers = self.inner.headers.lock().unwrap();
        headers.insert(name.into(), value.into());
    }

    pub fn headers(&self) -> HashMap<String, String> {
        self.inner.headers.lock().unwrap().clone()
    }
}

/// Reconstruct the positional argument list from a request body.
///
/// Keys may arrive in any order, but together they must cover exactly
/// `0..n`. A `null` body stands for an empty argument list.
pub fn parse_params(body: &Value) -> Result<Vec<Value>, RequestShapeError> {
    let map = match body {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        _ => return Err(RequestShapeError::BodyNotObject),
    };

    let count = map.len();
    let mut slots: Vec<Option<Value>> = vec![None; count];

    for (key, value) in map {
        let index = key
            .strip_prefix('p')
            .and_then(|digits| digits.parse::<usize>().ok())
            // reject non-canonical spellings like `p01`
            .filter(|index| key[1..] == index.to_string())
            .ok_or_else(|| RequestShapeError::UnexpectedKey { key: key.clone() })?;

        if index >= count {
            return Err(RequestShapeError::NonContiguous { index, count });
        }
        if slots[index].replace(value.clone()).is_some() {
            return Err(RequestShapeError::UnexpectedKey { key: key.clone() });
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(RequestShapeError::NonContiguous { index, count }))
        .collect()
}

/// Check the reconstructed arguments against the method's parameter
/// bindings, filling absent trailing optionals with `null`.
pub fn apply_bindings(
    bindings: &[ParamBinding],
    slots: &[Value],
) -> Result<Vec<Value>, RequestShapeError> {
    if slots.len() > bindings.len() {
        return Err(RequestShapeError::TooManyParams {
            expected: bindings.len(),
            got: slots.len(),
        });
    }

    let mut args = Vec::with_capacity(bindings.len());
    for (index, binding) in bindings.iter().enumerate() {
        let slot = match slots.get(index) {
            Some(value) => value,
            None if binding.optional => {
                args.push(Value::Null);
                continue;
            }
            None => return Err(RequestShapeError::MissingRequired { index }),
        };

        if slot.is_null() && binding.optional {
            args.push(Value::Null);
            continue;
        }

        match &binding.pattern {
            ParamPattern::Identifier { .. } => {}
            ParamPattern::ObjectPattern { .. } => {
                if !slot.is_object() {
                    return Err(RequestShapeError::PatternMismatch {
                        index,
                        expected: "an object".to_string(),
                    });
                }
            }
            ParamPattern::ArrayPattern { count } => {
                let ok = slot.as_array().is_some_and(|items| items.len() >= *count);
                if !ok {
                    return Err(RequestShapeError::PatternMismatch {
                        index,
                        expected: format!("an array with at least {count} elements"),
                    });
                }
            }
        }
        args.push(slot.clone());
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn required(pattern: ParamPattern) -> ParamBinding {
        ParamBinding {
            pattern,
            optional: false,
        }
    }

    fn ident(name: &str) -> ParamPattern {
        ParamPattern::Identifier {
            name: name.to_string(),
        }
    }

    #[test]
    fn single_param_body() {
        let slots = parse_params(&json!({ "p0": "my todo" })).unwrap();
        assert_eq!(slots, vec![json!("my todo")]);
    }

    #[test]
    fn order_of_keys_does_not_matter() {
        let body = serde_json::from_str::<Value>(r#"{"p2": 3, "p0": 1, "p1": 2}"#).unwrap();
        assert_eq!(parse_params(&body).unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn null_body_is_no_arguments() {
        assert_eq!(parse_params(&Value::Null).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn array_body_is_rejected() {
        assert_eq!(
            parse_params(&json!([1, 2])).unwrap_err(),
            RequestShapeError::BodyNotObject
        );
    }

    #[test]
    fn gap_in_indices_is_rejected() {
        let err = parse_params(&json!({ "p0": 1, "p2": 3 })).unwrap_err();
        assert_eq!(err, RequestShapeError::NonContiguous { index: 2, count: 2 });
    }

    #[test]
    fn stray_keys_are_rejected() {
        let err = parse_params(&json!({ "p0": 1, "title": "x" })).unwrap_err();
        assert_eq!(
            err,
            RequestShapeError::UnexpectedKey {
                key: "title".to_string()
            }
        );

        let err = parse_params(&json!({ "p01": 1 })).unwrap_err();
        assert_eq!(
            err,
            RequestShapeError::UnexpectedKey {
                key: "p01".to_string()
            }
        );
    }

    #[test]
    fn missing_required_slot() {
        let bindings = [required(ident("title"))];
        let err = apply_bindings(&bindings, &[]).unwrap_err();
        assert_eq!(err, RequestShapeError::MissingRequired { index: 0 });
    }

    #[test]
    fn trailing_optional_defaults_to_null() {
        let bindings = [
            required(ident("title")),
            ParamBinding {
                pattern: ident("note"),
                optional: true,
            },
        ];
        let args = apply_bindings(&bindings, &[json!("buy milk")]).unwrap();
        assert_eq!(args, vec![json!("buy milk"), Value::Null]);
    }

    #[test]
    fn object_pattern_requires_an_object() {
        let bindings = [required(ParamPattern::ObjectPattern {
            fields: vec!["title".to_string()],
        })];
        assert!(apply_bindings(&bindings, &[json!({ "title": "x" })]).is_ok());

        let err = apply_bindings(&bindings, &[json!("not an object")]).unwrap_err();
        assert!(matches!(err, RequestShapeError::PatternMismatch { index: 0, .. }));
    }

    #[test]
    fn array_pattern_checks_arity() {
        let bindings = [required(ParamPattern::ArrayPattern { count: 2 })];
        assert!(apply_bindings(&bindings, &[json!([1, 2, 3])]).is_ok());

        let err = apply_bindings(&bindings, &[json!([1])]).unwrap_err();
        assert!(matches!(err, RequestShapeError::PatternMismatch { index: 0, .. }));
    }

    #[test]
    fn extra_slots_are_rejected() {
        let bindings = [required(ident("title"))];
        let err = apply_bindings(&bindings, &[json!(1), json!(2)]).unwrap_err();
        assert_eq!(err, RequestShapeError::TooManyParams { expected: 1, got: 2 });
    }
}
