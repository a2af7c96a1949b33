//! LLM provider contract, concrete HTTP providers, failover router and
//! passive health tracking for the `generate` flow executor.

pub mod anthropic;
pub mod health;
pub mod openai;
pub mod provider;
pub mod router;

pub use health::{HealthTracker, ProviderHealthEntry, ProviderStatus};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role};
pub use router::{ProviderRouter, ProviderSlot};
