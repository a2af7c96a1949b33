use std::sync::Arc;

use conversa_core::config::{PREFERENCE_AUTO_SAVE_CONFIDENCE, PREFERENCE_CONFIRM_CONFIDENCE};
use conversa_llm::{ChatRequest, LlmProvider, Message, Role};
use conversa_persistence::UserProfileStore;
use conversa_sessions::HistoryTurn;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::error::Result;
use crate::types::{AttributeStatus, AttributeValue, EnrichmentOutcome, ExtractionResponse, PendingQuestion, PROFILE_KEYS};

const EXTRACTION_TEMPERATURE: f32 = 0.3;
const EXTRACTION_MAX_TOKENS: u32 = 512;

/// Extracts and persists categorized user preferences from one message
/// (§4.8). Grounded on the confidence-gated upsert from the teacher's
/// memory manager: a new value only overwrites an existing one when its
/// confidence is at least as high — a noisier later read never regresses a
/// confident earlier one.
pub struct PreferenceEnricher {
    llm: Arc<dyn LlmProvider>,
    profiles: Arc<UserProfileStore>,
    model: String,
}

impl PreferenceEnricher {
    pub fn new(llm: Arc<dyn LlmProvider>, profiles: Arc<UserProfileStore>, model: impl Into<String>) -> Self {
        Self { llm, profiles, model: model.into() }
    }

    /// Run one enrichment pass. Never returns an error for an LLM failure
    /// or malformed JSON — both are a no-op per §4.8's "Failure ... no-op;
    /// log and continue" — only a persistence-layer error propagates.
    #[instrument(skip(self, message, recent_history), fields(user_id))]
    pub async fn enrich(
        &self,
        user_id: &str,
        message: &str,
        recent_history: &[HistoryTurn],
    ) -> Result<EnrichmentOutcome> {
        let request = build_request(&self.model, message, recent_history);

        let response = match self.llm.send(&request).await {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, "preference extraction call failed, skipping");
                return Ok(EnrichmentOutcome::default());
            }
        };

        let parsed: ExtractionResponse = match serde_json::from_str(&response.content) {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "preference extraction returned invalid JSON, skipping");
                return Ok(EnrichmentOutcome::default());
            }
        };

        let existing = self.profiles.get(user_id)?;
        let mut attrs = existing.map(|row| row.attrs).unwrap_or_else(|| json!({}));
        let mut outcome = EnrichmentOutcome::default();

        for item in parsed.items {
            let category = item.category.as_str();
            let full_key = format!("{category}.{}", item.key);

            if item.confidence >= PREFERENCE_AUTO_SAVE_CONFIDENCE {
                upsert_attr(&mut attrs, category, &item.key, item.value, item.confidence, AttributeStatus::Confirmed);
                outcome.saved.push(full_key);
            } else if item.confidence >= PREFERENCE_CONFIRM_CONFIDENCE {
                if self.profiles.was_asked_recently(user_id, &full_key)? {
                    continue;
                }
                let question = confirmation_question(&item.key, &item.value);
                upsert_attr(&mut attrs, category, &item.key, item.value, item.confidence, AttributeStatus::Pending);
                self.profiles.record_question_asked(user_id, &full_key)?;
                outcome.pending_questions.push(PendingQuestion { full_key: full_key.clone(), question });
                outcome.pending_confirmation.push(full_key);
            } else {
                outcome.discarded.push(full_key);
            }
        }

        outcome.profile_completeness = compute_completeness(&attrs);
        self.profiles.put(user_id, &attrs, outcome.profile_completeness)?;
        Ok(outcome)
    }

    /// Resolve a pending confirmation (§4.8 step 3): `accepted` promotes the
    /// attribute to `Confirmed` (now counted toward completeness), a
    /// decline removes it outright. Returns `false` if `full_key` doesn't
    /// name a pending attribute on this profile (already resolved, or the
    /// profile was never enriched) so the caller can skip the reply.
    #[instrument(skip(self), fields(user_id))]
    pub async fn confirm(&self, user_id: &str, full_key: &str, accepted: bool) -> Result<bool> {
        let Some((category, key)) = full_key.split_once('.') else { return Ok(false) };
        let Some(row) = self.profiles.get(user_id)? else { return Ok(false) };
        let mut attrs = row.attrs;

        let is_pending = attrs
            .get(category)
            .and_then(|c| c.get(key))
            .and_then(|v| v.get("status"))
            .and_then(Value::as_str)
            == Some("pending");
        if !is_pending {
            return Ok(false);
        }

        if let Some(map) = attrs.get_mut(category).and_then(Value::as_object_mut) {
            if accepted {
                if let Some(attr) = map.get_mut(key).and_then(Value::as_object_mut) {
                    attr.insert("status".to_string(), json!("confirmed"));
                }
            } else {
                map.remove(key);
            }
        }

        let completeness = compute_completeness(&attrs);
        self.profiles.put(user_id, &attrs, completeness)?;
        Ok(true)
    }
}

/// Renders a yes/no question for a mid-confidence item (§4.8 step 3).
fn confirmation_question(key: &str, value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let label = key.replace('_', " ");
    format!("Just to confirm — should I set your {label} to \"{rendered}\"? (yes/no)")
}

/// Recognizes a yes/no reply to a preference confirmation question, same
/// vocabulary as the `validation` executor's `yes_no` type.
pub fn parse_confirmation_reply(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" | "yeah" | "yep" | "sure" | "ok" | "okay" => Some(true),
        "no" | "n" | "nope" | "nah" => Some(false),
        _ => None,
    }
}

fn upsert_attr(attrs: &mut Value, category: &str, key: &str, value: Value, confidence: f64, status: AttributeStatus) {
    if !attrs.is_object() {
        *attrs = json!({});
    }
    let root = attrs.as_object_mut().expect("just ensured object");
    let category_map = root
        .entry(category.to_string())
        .or_insert_with(|| Value::Object(Default::default()))
        .as_object_mut();
    let Some(category_map) = category_map else { return };

    let existing_confidence = category_map
        .get(key)
        .and_then(|v| v.get("confidence"))
        .and_then(Value::as_f64);
    if existing_confidence.is_some_and(|existing| confidence < existing) {
        return;
    }

    let attribute = AttributeValue { value, confidence, status };
    category_map.insert(key.to_string(), serde_json::to_value(attribute).expect("AttributeValue serializes"));
}

/// Deterministic completeness from §4.8 step 4: sum the weight of every
/// required/optional key that has a `confirmed` value, capped at 100.
fn compute_completeness(attrs: &Value) -> f64 {
    let mut total = 0.0;
    for profile_key in PROFILE_KEYS {
        let confirmed = attrs
            .get(profile_key.category.as_str())
            .and_then(|c| c.get(profile_key.key))
            .and_then(|v| v.get("status"))
            .and_then(Value::as_str)
            == Some("confirmed");
        if confirmed {
            total += profile_key.weight;
        }
    }
    total.min(100.0)
}

fn build_request(model: &str, message: &str, recent_history: &[HistoryTurn]) -> ChatRequest {
    let system = format!(
        "You extract user preferences from a conversation. Categories and keys you may \
         report on: {}. Respond with JSON only, matching \
         {{\"items\": [{{\"category\": <category>, \"key\": <key>, \"value\": <any>, \
         \"confidence\": <0..1>}}]}}. Omit anything not clearly stated. Never invent values.",
        key_listing(),
    );

    let mut messages: Vec<Message> = recent_history
        .iter()
        .map(|turn| Message {
            role: if turn.role == "assistant" { Role::Assistant } else { Role::User },
            content: turn.content.clone(),
        })
        .collect();
    messages.push(Message { role: Role::User, content: message.to_string() });

    ChatRequest {
        model: model.to_string(),
        system,
        messages,
        max_tokens: EXTRACTION_MAX_TOKENS,
        temperature: EXTRACTION_TEMPERATURE,
    }
}

fn key_listing() -> String {
    PROFILE_KEYS
        .iter()
        .map(|k| format!("{}.{}", k.category.as_str(), k.key))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conversa_llm::{ChatResponse, ProviderError};
    use conversa_persistence::init_db;
    use rusqlite::Connection;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.0.clone(),
                model: req.model.clone(),
                tokens_in: 10,
                tokens_out: 10,
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl LlmProvider for AlwaysFails {
        fn name(&self) -> &str {
            "failing"
        }
        async fn send(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("down".to_string()))
        }
    }

    fn profiles() -> Arc<UserProfileStore> {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        UserProfileStore::new(conn)
    }

    #[tokio::test]
    async fn high_confidence_item_is_auto_saved_and_raises_completeness() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "dietary", "key": "dietary_type", "value": "vegetarian", "confidence": 0.92}]}"#
                .to_string(),
        ));
        let enricher = PreferenceEnricher::new(llm, profiles(), "test-model");

        let outcome = enricher.enrich("u1", "main vegetarian hoon", &[]).await.unwrap();
        assert_eq!(outcome.saved, vec!["dietary.dietary_type"]);
        assert!(outcome.profile_completeness > 0.0);
    }

    #[tokio::test]
    async fn mid_confidence_item_enters_pending_with_cooldown() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "shopping", "key": "budget_range", "value": "mid", "confidence": 0.75}]}"#
                .to_string(),
        ));
        let store = profiles();
        let enricher = PreferenceEnricher::new(llm, store.clone(), "test-model");

        let first = enricher.enrich("u1", "kuch sasta dikhao", &[]).await.unwrap();
        assert_eq!(first.pending_confirmation, vec!["shopping.budget_range"]);
        assert!(store.was_asked_recently("u1", "shopping.budget_range").unwrap());

        let second = enricher.enrich("u1", "kuch sasta dikhao", &[]).await.unwrap();
        assert!(second.pending_confirmation.is_empty());
    }

    #[tokio::test]
    async fn low_confidence_item_is_discarded() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "personality", "key": "tone_preference", "value": "formal", "confidence": 0.3}]}"#
                .to_string(),
        ));
        let enricher = PreferenceEnricher::new(llm, profiles(), "test-model");

        let outcome = enricher.enrich("u1", "whatever", &[]).await.unwrap();
        assert_eq!(outcome.discarded, vec!["personality.tone_preference"]);
        assert_eq!(outcome.profile_completeness, 0.0);
    }

    #[tokio::test]
    async fn llm_failure_is_a_no_op() {
        let llm: Arc<dyn LlmProvider> = Arc::new(AlwaysFails);
        let enricher = PreferenceEnricher::new(llm, profiles(), "test-model");

        let outcome = enricher.enrich("u1", "whatever", &[]).await.unwrap();
        assert!(outcome.saved.is_empty());
        assert!(outcome.pending_confirmation.is_empty());
    }

    #[tokio::test]
    async fn lower_confidence_never_overwrites_confirmed_value() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "dietary", "key": "dietary_type", "value": "vegan", "confidence": 0.95}]}"#
                .to_string(),
        ));
        let store = profiles();
        let enricher = PreferenceEnricher::new(llm, store.clone(), "test-model");
        enricher.enrich("u1", "main vegan hoon", &[]).await.unwrap();

        let weaker: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "dietary", "key": "dietary_type", "value": "vegetarian", "confidence": 0.9}]}"#
                .to_string(),
        ));
        let enricher2 = PreferenceEnricher::new(weaker, store.clone(), "test-model");
        enricher2.enrich("u1", "main vegetarian hoon", &[]).await.unwrap();

        let profile = store.get("u1").unwrap().unwrap();
        assert_eq!(profile.attrs["dietary"]["dietary_type"]["value"], "vegan");
    }

    #[tokio::test]
    async fn mid_confidence_item_carries_a_pending_question() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "dietary", "key": "spice_level", "value": "mild", "confidence": 0.75}]}"#
                .to_string(),
        ));
        let enricher = PreferenceEnricher::new(llm, profiles(), "test-model");

        let outcome = enricher.enrich("u1", "thoda kam teekha", &[]).await.unwrap();
        assert_eq!(outcome.pending_questions.len(), 1);
        assert_eq!(outcome.pending_questions[0].full_key, "dietary.spice_level");
        assert!(outcome.pending_questions[0].question.contains("mild"));
    }

    #[tokio::test]
    async fn accepted_confirmation_promotes_pending_to_confirmed() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "shopping", "key": "budget_range", "value": "mid", "confidence": 0.75}]}"#
                .to_string(),
        ));
        let store = profiles();
        let enricher = PreferenceEnricher::new(llm, store.clone(), "test-model");
        let before = enricher.enrich("u1", "kuch sasta dikhao", &[]).await.unwrap();
        assert_eq!(before.profile_completeness, 0.0);

        let applied = enricher.confirm("u1", "shopping.budget_range", true).await.unwrap();
        assert!(applied);

        let profile = store.get("u1").unwrap().unwrap();
        assert_eq!(profile.attrs["shopping"]["budget_range"]["status"], "confirmed");
        assert!(profile.profile_completeness > 0.0);
    }

    #[tokio::test]
    async fn declined_confirmation_removes_the_attribute() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            r#"{"items": [{"category": "shopping", "key": "budget_range", "value": "mid", "confidence": 0.75}]}"#
                .to_string(),
        ));
        let store = profiles();
        let enricher = PreferenceEnricher::new(llm, store.clone(), "test-model");
        enricher.enrich("u1", "kuch sasta dikhao", &[]).await.unwrap();

        let applied = enricher.confirm("u1", "shopping.budget_range", false).await.unwrap();
        assert!(applied);

        let profile = store.get("u1").unwrap().unwrap();
        assert!(profile.attrs["shopping"].get("budget_range").is_none());
    }

    #[tokio::test]
    async fn confirming_an_unknown_key_is_a_no_op() {
        let enricher = PreferenceEnricher::new(Arc::new(AlwaysFails), profiles(), "test-model");
        let applied = enricher.confirm("nobody", "dietary.dietary_type", true).await.unwrap();
        assert!(!applied);
    }

    #[test]
    fn confirmation_reply_parsing_recognizes_common_phrasing() {
        assert_eq!(parse_confirmation_reply("Yep"), Some(true));
        assert_eq!(parse_confirmation_reply("nah"), Some(false));
        assert_eq!(parse_confirmation_reply("maybe"), None);
    }
}
