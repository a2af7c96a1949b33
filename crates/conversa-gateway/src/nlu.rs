//! NLU client selection: a real HTTP client when `nlu.base_url` is
//! configured, otherwise a client that always fails fast so
//! `classify_with_fallback` degrades straight to the keyword heuristic
//! (§6.3, §8 boundary behavior 12).

use std::sync::Arc;

use async_trait::async_trait;
use conversa_core::config::NluConfig;
use conversa_nlu::{Classification, HttpNluClient, NluClient, NluError};

struct UnconfiguredNluClient;

#[async_trait]
impl NluClient for UnconfiguredNluClient {
    async fn classify(
        &self,
        _text: &str,
        _language: Option<&str>,
    ) -> Result<Classification, NluError> {
        Err(NluError::Timeout)
    }
}

pub fn build_nlu_client(cfg: &NluConfig) -> Arc<dyn NluClient> {
    match &cfg.base_url {
        Some(url) => Arc::new(HttpNluClient::new(url.clone())),
        None => Arc::new(UnconfiguredNluClient),
    }
}
