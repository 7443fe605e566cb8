//! Handler contract.
//!
//! A handler receives a [`HandlerContext`] and resolves to a value to send,
//! to nothing (204), or to a failure (500). Synchronous handlers are wrapped
//! with [`sync`] so the dispatcher awaits every handler the same way.

use axum::body::Body;
use axum::http::Request;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::http::negotiate::accepts_json;
use crate::http::response::{Payload, ResponseHandle};

/// Opaque per-route value fixed at registration time.
pub type Store = Arc<dyn Any + Send + Sync>;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Payload>>;

/// Path parameters captured by the matched route, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Value of a parameter; the last one wins on duplicate names.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rfind(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a handler gets for one request.
pub struct HandlerContext {
    pub request: Request<Body>,
    pub response: ResponseHandle,
    pub params: Params,
    store: Option<Store>,
}

impl HandlerContext {
    pub fn new(
        request: Request<Body>,
        response: ResponseHandle,
        params: Params,
        store: Option<Store>,
    ) -> Self {
        Self {
            request,
            response,
            params,
            store,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// The route's store, if it holds a `T`.
    pub fn store<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.store.as_deref().and_then(|store| store.downcast_ref::<T>())
    }

    /// Whether the client accepts a JSON representation.
    pub fn accepts_json(&self) -> bool {
        accepts_json(self.request.headers())
    }
}

/// A request handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, cx: HandlerContext) -> HandlerFuture;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Payload>,
{
    fn call(&self, cx: HandlerContext) -> HandlerFuture {
        let fut = self(cx);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}

/// Handler built from a synchronous function.
pub struct SyncHandler<F>(F);

/// Adapt a synchronous function into a [`Handler`].
pub fn sync<F, R>(f: F) -> SyncHandler<F>
where
    F: Fn(HandlerContext) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Payload>,
{
    SyncHandler(f)
}

impl<F, R> Handler for SyncHandler<F>
where
    F: Fn(HandlerContext) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Payload>,
{
    fn call(&self, cx: HandlerContext) -> HandlerFuture {
        let result = (self.0)(cx).map(Into::into);
        Box::pin(std::future::ready(result))
    }
}
