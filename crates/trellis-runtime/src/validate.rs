//! Field validators.
//!
//! Method descriptors carry an ordered list of validator references per
//! field. References are either a builtin name (`required`, `email`,
//! `minLength:3`, `maxLength:80`) or the name of a custom validator
//! registered on the [`Validators`] set.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use trellis_api::FieldRules;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub trait Validator: Send + Sync {
    fn validate(&self, field: &str, value: &Value) -> Option<ValidationFailure>;
}

struct Required;

impl Validator for Required {
    fn validate(&self, field: &str, value: &Value) -> Option<ValidationFailure> {
        let missing = match value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        missing.then(|| ValidationFailure::new(field, format!("`{field}` is required")))
    }
}

struct Email;

impl Validator for Email {
    fn validate(&self, field: &str, value: &Value) -> Option<ValidationFailure> {
        let ok = value.as_str().is_some_and(|s| {
            s.split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        });
        (!ok).then(|| ValidationFailure::new(field, format!("`{field}` must be an email address")))
    }
}

struct MinLength(usize);

impl Validator for MinLength {
    fn validate(&self, field: &str, value: &Value) -> Option<ValidationFailure> {
        let ok = value
            .as_str()
            .is_some_and(|s| s.chars().count() >= self.0);
        (!ok).then(|| {
            ValidationFailure::new(
                field,
                format!("`{field}` must be at least {} characters", self.0),
            )
        })
    }
}

struct MaxLength(usize);

impl Validator for MaxLength {
    fn validate(&self, field: &str, value: &Value) -> Option<ValidationFailure> {
        let ok = value
            .as_str()
            .is_some_and(|s| s.chars().count() <= self.0);
        (!ok).then(|| {
            ValidationFailure::new(
                field,
                format!("`{field}` must be at most {} characters", self.0),
            )
        })
    }
}

/// Custom validator built from a plain function.
pub struct Custom<F>(pub F);

impl<F> Validator for Custom<F>
where
    F: Fn(&str, &Value) -> Option<ValidationFailure> + Send + Sync,
{
    fn validate(&self, field: &str, value: &Value) -> Option<ValidationFailure> {
        (self.0)(field, value)
    }
}

/// Validator set resolving references to implementations. Builtins are
/// always available; registered custom validators shadow nothing.
#[derive(Default, Clone)]
pub struct Validators {
    custom: HashMap<String, Arc<dyn Validator>>,
}

impl Validators {
    pub fn register(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.custom.insert(name.into(), validator);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&str, &Value) -> Option<ValidationFailure> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(Custom(f)));
    }

    pub fn resolve(&self, reference: &str) -> Option<Arc<dyn Validator>> {
        match reference {
            "required" => return Some(Arc::new(Required)),
            "email" => return Some(Arc::new(Email)),
            _ => {}
        }
        if let Some((name, arg)) = reference.split_once(':') {
            let len = arg.parse::<usize>().ok()?;
            return match name {
                "minLength" => Some(Arc::new(MinLength(len))),
                "maxLength" => Some(Arc::new(MaxLength(len))),
                _ => None,
            };
        }
        self.custom.get(reference).cloned()
    }
}

/// Run every field's rule list against the named request fields. The first
/// failure short-circuits that field; other fields still run.
pub fn run_validators(
    rules: &FieldRules,
    fields: &serde_json::Map<String, Value>,
    validators: &Validators,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    for (field, refs) in rules {
        let value = fields.get(field).unwrap_or(&Value::Null);
        for reference in refs {
            let Some(validator) = validators.resolve(reference) else {
                failures.push(ValidationFailure::new(
                    field,
                    format!("unknown validator `{reference}`"),
                ));
                break;
            };
            if let Some(failure) = validator.validate(field, value) {
                failures.push(failure);
                break;
            }
        }
    }

    failures
}
