use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::tasks::payload::{PayloadVariant, TaskPayload};
use crate::tasks::types::{TaskContext, TaskKind};

/// Strategy that performs the work of one task kind.
///
/// The associated `Payload` type fixes which [`TaskKind`] the processor is
/// registered under, so a processor can never receive another kind's payload.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    type Payload: PayloadVariant;

    /// Execute one attempt. The returned value becomes the task result.
    async fn process(&self, payload: &Self::Payload, ctx: &TaskContext) -> AppResult<JsonValue>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Object-safe view over a [`TaskProcessor`] used by the registry
#[async_trait]
pub(crate) trait ErasedProcessor: Send + Sync {
    async fn process(&self, payload: &TaskPayload, ctx: &TaskContext) -> AppResult<JsonValue>;

    fn name(&self) -> &'static str;
}

struct Erased<P>(P);

#[async_trait]
impl<P: TaskProcessor> ErasedProcessor for Erased<P> {
    async fn process(&self, payload: &TaskPayload, ctx: &TaskContext) -> AppResult<JsonValue> {
        let typed = P::Payload::from_payload(payload).ok_or_else(|| {
            AppError::validation(
                "payload",
                format!(
                    "processor {} expects {} payload, got {}",
                    self.0.name(),
                    P::Payload::KIND,
                    payload.kind()
                ),
            )
        })?;
        self.0.process(typed, ctx).await
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

/// Maps task kinds to their processor
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<TaskKind, Arc<dyn ErasedProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor. A later registration for the same kind wins.
    pub fn register<P: TaskProcessor>(&mut self, processor: P) -> &mut Self {
        let kind = P::Payload::KIND;
        if let Some(previous) = self.processors.insert(kind, Arc::new(Erased(processor))) {
            tracing::warn!(
                task_kind = %kind,
                replaced = previous.name(),
                "Processor replaced"
            );
        }
        self
    }

    pub(crate) fn get(&self, kind: TaskKind) -> Option<Arc<dyn ErasedProcessor>> {
        self.processors.get(&kind).cloned()
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.processors.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.processors.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
