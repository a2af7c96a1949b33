use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::NluError;
use crate::types::Classification;

/// Contract for the NLU service (§6.3): `text -> {intent, confidence,
/// entities, language}`.
#[async_trait]
pub trait NluClient: Send + Sync {
    async fn classify(&self, text: &str, language: Option<&str>) -> Result<Classification, NluError>;
}

/// HTTP implementation of [`NluClient`]: `POST /classify`, 500ms timeout
/// (§6.3).
pub struct HttpNluClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNluClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[async_trait]
impl NluClient for HttpNluClient {
    async fn classify(&self, text: &str, language: Option<&str>) -> Result<Classification, NluError> {
        let url = format!("{}/classify", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&ClassifyRequest { text, language })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NluError::Timeout
                } else {
                    NluError::Http(e)
                }
            })?;

        if !resp.status().is_success() {
            return Err(NluError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        resp.json::<Classification>()
            .await
            .map_err(|e| NluError::Parse(e.to_string()))
    }
}

/// Classify via the HTTP client, falling back to a keyword heuristic on any
/// failure (§6.3, §8 boundary behavior 12: "NLU unavailable: router falls
/// back to heuristic; flows still start if a trigger matches").
pub async fn classify_with_fallback(
    client: &dyn NluClient,
    text: &str,
    language: Option<&str>,
) -> Classification {
    match client.classify(text, language).await {
        Ok(c) => c,
        Err(err) => {
            warn!(error = %err, "NLU classify failed, falling back to keyword heuristic");
            keyword_fallback(text)
        }
    }
}

/// Minimal keyword heuristic used when the NLU service is unreachable.
/// Deliberately low-confidence so the router's threshold check still routes
/// through `AskClarification` unless a keyword happens to match strongly.
pub fn keyword_fallback(text: &str) -> Classification {
    let lower = text.to_lowercase();
    const KEYWORDS: &[(&str, &str)] = &[
        ("order", "order_food"),
        ("pizza", "order_food"),
        ("hi", "greeting"),
        ("hello", "greeting"),
        ("hey", "greeting"),
        ("cancel", "cancel"),
        ("help", "help"),
        ("track", "track_order"),
        ("status", "track_order"),
        ("balance", "wallet_balance"),
    ];

    for (keyword, intent) in KEYWORDS {
        if lower.contains(keyword) {
            return Classification {
                intent: intent.to_string(),
                confidence: 0.55,
                entities: Vec::new(),
                language: None,
            };
        }
    }

    Classification {
        intent: "unknown".to_string(),
        confidence: 0.1,
        entities: Vec::new(),
        language: None,
    }
}
