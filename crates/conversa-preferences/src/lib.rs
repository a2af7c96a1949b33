//! Preference Enricher (§4.8): confidence-tiered extraction of categorized
//! user preferences, run fire-and-forget after the reply path (§4.7 step 7).

pub mod enricher;
pub mod error;
pub mod types;

pub use enricher::{parse_confirmation_reply, PreferenceEnricher};
pub use error::{PreferenceError, Result};
pub use types::{
    AttributeStatus, AttributeValue, EnrichmentOutcome, ExtractedItem, ExtractionResponse,
    PendingQuestion, PreferenceCategory, ProfileKey, PROFILE_KEYS,
};
