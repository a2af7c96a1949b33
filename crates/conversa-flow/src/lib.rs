//! Flow definitions, run context, interpolation, the condition
//! mini-language, the executor registry and the engine loop that drives a
//! [`FlowDefinition`] over a [`FlowContext`] (§3.2/§3.3/§4.4/§4.5).

pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod executor;
pub mod executors;
pub mod interpolate;

pub use context::{FlowContext, LastError, RunStatus};
pub use definition::{ActionSpec, Condition, FlowDefinition, StateDefinition, StateType};
pub use engine::{cancel, resume_on_timeout, step, step_arc};
pub use error::{FlowError, Result};
pub use executor::{ExecutionResult, Executor, ExecutorRegistry};
pub use executors::builtin_registry;
