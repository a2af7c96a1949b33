//! The canonical executors (§4.4) and a constructor that wires them into a
//! fresh [`crate::executor::ExecutorRegistry`].

pub mod branch;
pub mod http;
pub mod llm;
pub mod nlu;
pub mod response;
pub mod session;
pub mod set;
pub mod validation;

use std::sync::Arc;

use conversa_llm::LlmProvider;
use conversa_nlu::NluClient;

use crate::executor::ExecutorRegistry;

pub const RESPONSE: &str = "response";
pub const LLM: &str = "llm";
pub const NLU: &str = "nlu";
pub const VALIDATION: &str = "validation";
pub const HTTP: &str = "http";
pub const SET: &str = "set";
pub const BRANCH: &str = "branch";
/// Not one of the spec's seven canonical executors — the flow↔session
/// bridge described at `executors::session::SessionExecutor`.
pub const SESSION: &str = "session";

/// Build the registry every gateway process starts with: the seven built-in
/// executors plus `session`, wired to the shared LLM router and NLU client.
pub fn builtin_registry(llm_provider: Arc<dyn LlmProvider>, nlu_client: Arc<dyn NluClient>) -> ExecutorRegistry {
    let registry = ExecutorRegistry::new();
    registry.register(RESPONSE, Arc::new(response::ResponseExecutor));
    registry.register(LLM, Arc::new(llm::LlmExecutor::new(llm_provider)));
    registry.register(NLU, Arc::new(nlu::NluExecutor::new(nlu_client)));
    registry.register(VALIDATION, Arc::new(validation::ValidationExecutor));
    registry.register(HTTP, Arc::new(http::HttpExecutor::new()));
    registry.register(SET, Arc::new(set::SetExecutor));
    registry.register(BRANCH, Arc::new(branch::BranchExecutor));
    registry.register(SESSION, Arc::new(session::SessionExecutor));
    registry
}
