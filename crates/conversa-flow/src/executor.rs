use std::sync::Arc;

use async_trait::async_trait;
use conversa_channels::{InboundMessage, OutboundMessage};
use dashmap::DashMap;
use serde_json::Value;

use crate::context::FlowContext;

/// Result of a single executor invocation (§4.4). `success = false` only for
/// unrecoverable infra failures — expected outcomes (validation failed, low
/// NLU confidence) are still `success = true` with an `event` selecting the
/// non-default transition.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<Value>,
    pub event: Option<String>,
    pub outbound: Vec<OutboundMessage>,
    pub next_state: Option<String>,
}

impl ExecutionResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            event: None,
            outbound: Vec::new(),
            next_state: None,
        }
    }

    pub fn ok_event(event: impl Into<String>) -> Self {
        Self {
            success: true,
            output: None,
            event: Some(event.into()),
            outbound: Vec::new(),
            next_state: None,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_outbound(mut self, outbound: Vec<OutboundMessage>) -> Self {
        self.outbound = outbound;
        self
    }

    pub fn failure(event: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            event: Some(event.into()),
            outbound: Vec::new(),
            next_state: None,
        }
    }
}

/// A named, registered handler invoked by state actions (§4.4). Pure in the
/// sense that all side effects (outbound messaging) flow back through
/// `outbound[]` rather than being dispatched directly, so the engine can
/// atomically commit or discard on a failed transition.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        input: Option<&InboundMessage>,
    ) -> ExecutionResult;
}

/// Registry of executors by name, looked up per `ActionSpec.executor`
/// (teacher's `HookEngine` registry shape).
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self { executors: DashMap::new() }
    }

    pub fn register(&self, name: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).map(|e| e.clone())
    }
}
