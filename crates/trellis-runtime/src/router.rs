//! Routing for wrapped API classes.
//!
//! [`wrap_api_class`] turns a class (its handlers) plus its compiled method
//! descriptors into a [`Router`]: one route per method, each dispatching
//! body -> positional arguments -> handler. The router plugs into any HTTP
//! substrate through the [`Registrar`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error};

use trellis_api::{MethodDescriptor, ParamPattern};

use crate::request::{apply_bindings, parse_params, ApiReply, ApiRequest};
use crate::validate::{run_validators, Validators};
use crate::BoxError;

pub type Handler = Arc<
    dyn Fn(ApiRequest, ApiReply, Vec<Value>) -> BoxFuture<'static, Result<Value, BoxError>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("cannot wrap an anonymous class; exported API classes must be named")]
    AnonymousClass,

    #[error("class has no handler for method `{method}`")]
    MissingHandler { method: String },

    #[error("no route for {http_method} {path}")]
    NoRoute { http_method: String, path: String },
}

/// An API class as the runtime sees it: an optional name and one handler
/// per compiled method.
#[derive(Default)]
pub struct ApiClass {
    name: Option<String>,
    handlers: HashMap<String, Handler>,
    validators: Validators,
}

impl ApiClass {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn handler<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(ApiRequest, ApiReply, Vec<Value>) -> BoxFuture<'static, Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(f));
        self
    }

    pub fn validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }
}

/// Outcome of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    pub headers: HashMap<String, String>,
}

/// One method's route: descriptor plus handler, ready to serve requests.
pub struct Route {
    descriptor: Arc<MethodDescriptor>,
    handler: Handler,
    validators: Validators,
}

impl Route {
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Serve one request body. Shape and validation problems are the
    /// client's (400); a failing handler is ours (500) and never takes the
    /// process down.
    pub async fn dispatch(&self, body: Value) -> Response {
        let request = ApiRequest::new(body);
        let reply = request.reply();

        let slots = match parse_params(request.body()) {
            Ok(slots) => slots,
            Err(err) => return client_error(err.to_string()),
        };
        let args = match apply_bindings(&self.descriptor.bindings, &slots) {
            Ok(args) => args,
            Err(err) => return client_error(err.to_string()),
        };

        if !self.descriptor.validators.is_empty() {
            let fields = named_fields(&self.descriptor, &args);
            let failures = run_validators(&self.descriptor.validators, &fields, &self.validators);
            if !failures.is_empty() {
                let failures: Vec<Value> = failures
                    .into_iter()
                    .map(|f| json!({ "field": f.field, "message": f.message }))
                    .collect();
                return Response {
                    status: 400,
                    body: json!({ "error": "validation failed", "failures": failures }),
                    headers: HashMap::new(),
                };
            }
        }

        debug!(method = %self.descriptor.name, "dispatching");
        match (self.handler)(request, reply.clone(), args).await {
            Ok(value) => Response {
                status: reply.status(),
                body: value,
                headers: reply.headers(),
            },
            Err(err) => {
                error!(method = %self.descriptor.name, error = %err, "handler failed");
                Response {
                    status: 500,
                    body: json!({ "error": "internal server error" }),
                    headers: HashMap::new(),
                }
            }
        }
    }
}

fn client_error(message: String) -> Response {
    Response {
        status: 400,
        body: json!({ "error": message }),
        headers: HashMap::new(),
    }
}

/// Project bound arguments back into named fields for validation. Array
/// patterns carry no field names and are skipped.
fn named_fields(descriptor: &MethodDescriptor, args: &[Value]) -> Map<String, Value> {
    let mut fields = Map::new();
    for (binding, arg) in descriptor.bindings.iter().zip(args) {
        match &binding.pattern {
            ParamPattern::Identifier { name } => {
                fields.insert(name.clone(), arg.clone());
            }
            ParamPattern::ObjectPattern { fields: names } => {
                for name in names {
                    let value = arg.get(name).cloned().unwrap_or(Value::Null);
                    fields.insert(name.clone(), value);
                }
            }
            ParamPattern::ArrayPattern { .. } => {}
        }
    }
    fields
}

/// The installable surface of a wrapped class.
pub struct Router {
    class_name: String,
    routes: Vec<Arc<Route>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("class_name", &self.class_name)
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Install every route into an HTTP substrate.
    pub fn install(&self, registrar: &mut dyn Registrar) {
        for route in &self.routes {
            registrar.register(
                &route.descriptor.http_method,
                &route.descriptor.path,
                route.clone(),
            );
        }
    }

    /// Direct dispatch without a substrate, matching on method and path.
    pub async fn dispatch(
        &self,
        http_method: &str,
        path: &str,
        body: Value,
    ) -> Result<Response, RouterError> {
        let route = self
            .routes
            .iter()
            .find(|r| r.descriptor.http_method == http_method && r.descriptor.path == path)
            .ok_or_else(|| RouterError::NoRoute {
                http_method: http_method.to_string(),
                path: path.to_string(),
            })?;
        Ok(route.dispatch(body).await)
    }
}

/// Boundary to the hosting HTTP stack. The runtime stays substrate-neutral;
/// anything that can install `(method, path, route)` triples can serve a
/// wrapped class.
pub trait Registrar {
    fn register(&mut self, http_method: &str, path: &str, route: Arc<Route>);
}

/// Wrap a named class and its compiled descriptors into a router.
pub fn wrap_api_class(
    class: ApiClass,
    methods: Vec<Arc<MethodDescriptor>>,
) -> Result<Router, RouterError> {
    let class_name = class.name.ok_or(RouterError::AnonymousClass)?;
    let mut handlers = class.handlers;

    let mut routes = Vec::with_capacity(methods.len());
    for descriptor in methods {
        let handler = handlers
            .remove(&descriptor.name)
            .ok_or_else(|| RouterError::MissingHandler {
                method: descriptor.name.clone(),
            })?;
        routes.push(Arc::new(Route {
            descriptor,
            handler,
            validators: class.validators.clone(),
        }));
    }

    Ok(Router { class_name, routes })
}
