//! Replay handlers keyed by mutation type.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::record::MutationType;

/// Remote write collaborator for one mutation type.
///
/// A handler may see the same payload more than once (at-least-once
/// delivery), so the remote call should tolerate repeats.
#[async_trait]
pub trait MutationHandler: Send + Sync {
  async fn replay(&self, payload: &Value) -> Result<()>;
}

struct FnHandler<F> {
  f: F,
}

#[async_trait]
impl<F, Fut> MutationHandler for FnHandler<F>
where
  F: Fn(Value) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<()>> + Send + 'static,
{
  async fn replay(&self, payload: &Value) -> Result<()> {
    (self.f)(payload.clone()).await
  }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MutationHandler>
where
  F: Fn(Value) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<()>> + Send + 'static,
{
  Arc::new(FnHandler { f })
}

/// Dispatch table from mutation type to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
  handlers: HashMap<MutationType, Arc<dyn MutationHandler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register (or replace) the handler for `kind`.
  pub fn register(mut self, kind: MutationType, handler: Arc<dyn MutationHandler>) -> Self {
    self.handlers.insert(kind, handler);
    self
  }

  pub fn get(&self, kind: &MutationType) -> Option<&Arc<dyn MutationHandler>> {
    self.handlers.get(kind)
  }

  pub fn len(&self) -> usize {
    self.handlers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.is_empty()
  }
}
