use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Result of classifying a piece of text (§4.4 `nlu` executor / §4.6 router).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub entities: Vec<Entity>,
    pub language: Option<String>,
}
