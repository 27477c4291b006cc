//! Request-scoped providers.
//!
//! A [`Provider`] is created once, at module load, and identified by a
//! process-wide token rather than by the shape of what it produces. Each
//! request carries its own [`ContextStore`]; the first lookup of a provider
//! within a request runs its resolver, every later or concurrent lookup
//! attaches to the same cell, and nothing outlives the request.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::request::{ApiReply, ApiRequest};
use crate::BoxError;

/// Identity token for a provider. Two providers with identical resolvers
/// are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

impl ProviderId {
    fn next() -> Self {
        ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider resolution failed: {message}")]
    Resolve { message: String },

    #[error("provider value had an unexpected type")]
    TypeMismatch,
}

type Resolver<T> =
    dyn Fn(ApiRequest, ApiReply) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync;

/// A lazily-resolved, per-request value.
pub struct Provider<T> {
    id: ProviderId,
    resolver: Arc<Resolver<T>>,
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            resolver: self.resolver.clone(),
        }
    }
}

impl<T> Provider<T> {
    pub fn id(&self) -> ProviderId {
        self.id
    }
}

/// Create a provider from a resolver. The resolver runs at most once per
/// request, however many lookups race for it.
pub fn provide<T, F>(resolver: F) -> Provider<T>
where
    F: Fn(ApiRequest, ApiReply) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync + 'static,
{
    Provider {
        id: ProviderId::next(),
        resolver: Arc::new(resolver),
    }
}

type Settled = Result<Arc<dyn Any + Send + Sync>, ProviderError>;

/// Per-request memoization table, keyed by provider identity. Created empty
/// with the request and dropped with it.
#[derive(Default)]
pub struct ContextStore {
    cells: Mutex<HashMap<ProviderId, Arc<OnceCell<Settled>>>>,
}

impl ContextStore {
    fn cell(&self, id: ProviderId) -> Arc<OnceCell<Settled>> {
        let mut cells = self.cells.lock().unwrap();
        cells.entry(id).or_default().clone()
    }
}

impl ApiRequest {
    /// Look up a provider's value for this request, resolving it on first
    /// use. A rejected resolver settles the cell too; retries within the
    /// same request observe the original failure.
    pub async fn context_get<T>(&self, provider: &Provider<T>) -> Result<Arc<T>, ProviderError>
    where
        T: Send + Sync + 'static,
    {
        let cell = self.context().cell(provider.id);
        let resolver = provider.resolver.clone();
        let req = self.clone();
        let reply = self.reply();

        let settled = cell
            .get_or_init(|| async move {
                match resolver(req, reply).await {
                    Ok(value) => Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>),
                    Err(err) => Err(ProviderError::Resolve {
                        message: err.to_string(),
                    }),
                }
            })
            .await;

        match settled {
            Ok(value) => value
                .clone()
                .downcast::<T>()
                .map_err(|_| ProviderError::TypeMismatch),
            Err(err) => Err(err.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn counting_provider(calls: Arc<AtomicUsize>) -> Provider<String> {
        provide(move |_req, _reply| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("db-handle".to_string())
            })
        })
    }

    #[tokio::test]
    async fn resolver_runs_once_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = counting_provider(calls.clone());
        let req = ApiRequest::new(json!({}));

        let first = req.context_get(&provider).await.unwrap();
        let second = req.context_get(&provider).await.unwrap();

        assert_eq!(*first, "db-handle");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requests_do_not_share_values() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = counting_provider(calls.clone());

        let a = ApiRequest::new(json!({}));
        let b = ApiRequest::new(json!({}));
        let va = a.context_get(&provider).await.unwrap();
        let vb = b.context_get(&provider).await.unwrap();

        assert!(!Arc::ptr_eq(&va, &vb));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_lookups_attach_to_one_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slow_calls = calls.clone();
        let provider: Provider<u32> = provide(move |_req, _reply| {
            let calls = slow_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(7)
            })
        });

        let req = ApiRequest::new(json!({}));
        let (a, b) = tokio::join!(req.context_get(&provider), req.context_get(&provider));

        assert_eq!(*a.unwrap(), 7);
        assert_eq!(*b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_is_settled_for_the_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fail_calls = calls.clone();
        let provider: Provider<u32> = provide(move |_req, _reply| {
            let calls = fail_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("connection refused".into())
            })
        });

        let req = ApiRequest::new(json!({}));
        let first = req.context_get(&provider).await.unwrap_err();
        let second = req.context_get(&provider).await.unwrap_err();

        assert_eq!(first, second);
        assert!(matches!(first, ProviderError::Resolve { ref message } if message.contains("connection refused")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn providers_are_distinguished_by_identity() {
        let a: Provider<u32> = provide(|_req, _reply| Box::pin(async { Ok(1) }));
        let b: Provider<u32> = provide(|_req, _reply| Box::pin(async { Ok(2) }));
        assert_ne!(a.id(), b.id());

        let req = ApiRequest::new(json!({}));
        assert_eq!(*req.context_get(&a).await.unwrap(), 1);
        assert_eq!(*req.context_get(&b).await.unwrap(), 2);
    }
}
