//! NLU client contract (§6.3): text classification with a keyword-heuristic
//! fallback when the remote service is unavailable.

pub mod client;
pub mod error;
pub mod types;

pub use client::{classify_with_fallback, keyword_fallback, HttpNluClient, NluClient};
pub use error::NluError;
pub use types::{Classification, Entity};
