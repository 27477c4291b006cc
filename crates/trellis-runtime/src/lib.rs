//! Request runtime for Trellis.
//!
//! Hosts compiled API classes behind any HTTP substrate: routes built from
//! method descriptors, positional parameter reconstruction from request
//! bodies, and request-scoped providers with identity-keyed memoization.

pub mod context;
pub mod request;
pub mod router;
pub mod validate;

pub use context::{provide, ContextStore, Provider, ProviderError, ProviderId};
pub use request::{apply_bindings, parse_params, ApiReply, ApiRequest, RequestShapeError};
pub use router::{wrap_api_class, ApiClass, Handler, Registrar, Response, Route, Router, RouterError};
pub use validate::{run_validators, ValidationFailure, Validator, Validators};

/// Errors handlers and provider resolvers are allowed to fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
