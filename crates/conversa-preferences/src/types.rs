use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four preference categories from §3.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceCategory {
    Dietary,
    Shopping,
    Communication,
    Personality,
}

impl PreferenceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dietary => "dietary",
            Self::Shopping => "shopping",
            Self::Communication => "communication",
            Self::Personality => "personality",
        }
    }
}

/// One item the extraction prompt may return, before confidence gating.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedItem {
    pub category: PreferenceCategory,
    pub key: String,
    pub value: Value,
    pub confidence: f64,
}

/// Raw shape of the LLM's JSON-only extraction response (§4.8 step 1-2).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
}

/// A single stored attribute value (§3.6: "value and confidence [0,1]").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: Value,
    pub confidence: f64,
    pub status: AttributeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeStatus {
    /// Auto-saved (`confidence >= 0.85`), counted toward completeness.
    Confirmed,
    /// Saved at `0.70 <= confidence < 0.85`, awaiting user confirmation,
    /// not yet counted toward completeness.
    Pending,
}

/// Named, weighted key this profile tracks — used to derive
/// `profile_completeness` (§4.8 step 4). Weights sum to 100 across all
/// required and optional keys; required keys are weighted 2x optional
/// ones to reflect their outsized effect on personalization quality.
pub struct ProfileKey {
    pub category: PreferenceCategory,
    pub key: &'static str,
    pub required: bool,
    pub weight: f64,
}

pub const PROFILE_KEYS: &[ProfileKey] = &[
    ProfileKey { category: PreferenceCategory::Dietary, key: "dietary_type", required: true, weight: 20.0 },
    ProfileKey { category: PreferenceCategory::Dietary, key: "spice_level", required: false, weight: 10.0 },
    ProfileKey { category: PreferenceCategory::Shopping, key: "budget_range", required: true, weight: 20.0 },
    ProfileKey { category: PreferenceCategory::Shopping, key: "preferred_categories", required: false, weight: 10.0 },
    ProfileKey { category: PreferenceCategory::Communication, key: "preferred_language", required: true, weight: 20.0 },
    ProfileKey { category: PreferenceCategory::Communication, key: "notification_opt_in", required: false, weight: 10.0 },
    ProfileKey { category: PreferenceCategory::Personality, key: "tone_preference", required: false, weight: 10.0 },
];

/// What happened to each extracted item, returned from one enrichment pass
/// so the caller (§4.7 step 7: "fire-and-forget") can log it without
/// blocking the reply path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentOutcome {
    pub saved: Vec<String>,
    pub pending_confirmation: Vec<String>,
    pub discarded: Vec<String>,
    pub profile_completeness: f64,
    /// One question per item that entered `pending_confirmation` this pass
    /// (§4.8 step 3), for the caller to surface as an outbound message.
    pub pending_questions: Vec<PendingQuestion>,
}

/// A yes/no confirmation question for one mid-confidence preference item,
/// keyed by its full `category.key` so the reply can be routed back to
/// [`crate::PreferenceEnricher::confirm`].
#[derive(Debug, Clone, Serialize)]
pub struct PendingQuestion {
    pub full_key: String,
    pub question: String,
}
