//! Ordered handler chain.
//!
//! A [`Chain`] is a list of [`Middleware`] stages in front of a terminal
//! [`Handler`]. Each stage receives the request context, the request, and a
//! [`Next`] continuation; it either calls `next.run(..)` or returns early.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::auth::RequestContext;

/// Boxed future returned by handlers and stages.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal handler of a chain.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: RequestContext, request: Value) -> BoxFuture<'_, Result<Value>>;
}

/// Handler built from an async closure, see [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    HandlerFn(f)
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin((self.0)(ctx, request))
    }
}

/// A stage wrapping the rest of the chain.
pub trait Middleware: Send + Sync {
    fn handle<'a>(
        &'a self,
        ctx: RequestContext,
        request: Value,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Value>>;
}

/// Remainder of the chain after the current stage.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the remaining stages and the terminal handler.
    pub fn run(self, ctx: RequestContext, request: Value) -> BoxFuture<'a, Result<Value>> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(
                ctx,
                request,
                Next {
                    stages: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(ctx, request),
        }
    }
}

/// Ordered middleware stages in front of a handler.
#[derive(Clone)]
pub struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Handler>,
}

impl Chain {
    /// Create a chain with no stages.
    pub fn new(endpoint: Arc<dyn Handler>) -> Self {
        Self {
            stages: Vec::new(),
            endpoint,
        }
    }

    /// Append a stage; stages run in the order they were added.
    pub fn with<M: Middleware + 'static>(mut self, stage: M) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Dispatch a call through every stage.
    pub async fn call(&self, ctx: RequestContext, request: Value) -> Result<Value> {
        Next {
            stages: &self.stages,
            endpoint: self.endpoint.as_ref(),
        }
        .run(ctx, request)
        .await
    }

    /// Number of stages in front of the handler.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
