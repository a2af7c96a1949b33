use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conversa_channels::InboundMessage;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::context::FlowContext;
use crate::executor::{ExecutionResult, Executor};
use crate::interpolate::interpolate_json;

const RETRY_BASE_MS: u64 = 200;
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// `save_to` (§4.4's http config table) is deliberately not a field here —
/// it names where in `context` the response lands, which is the engine's
/// concern (`engine::run_actions`), not the executor's. The engine reads it
/// straight off the rendered config for any executor, generically.
#[derive(Debug, Deserialize)]
struct HttpConfig {
    #[serde(default)]
    method: HttpMethod,
    url: String,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Calls a business collaborator over HTTP (§4.4). Non-GET requests carry an
/// `Idempotency-Key` derived from the run id and state name; a short-lived
/// local dedup set suppresses the rare case where the retry-once path would
/// otherwise double-send before the collaborator itself dedups on the key.
pub struct HttpExecutor {
    client: reqwest::Client,
    recent_keys: DashMap<String, Instant>,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(8))
                .build()
                .expect("reqwest client builds"),
            recent_keys: DashMap::new(),
        }
    }

    fn sweep_expired(&self) {
        self.recent_keys.retain(|_, inserted| inserted.elapsed() < IDEMPOTENCY_TTL);
    }

    async fn send_once(&self, cfg: &HttpConfig, idempotency_key: &str, body: &Value) -> Result<Value, String> {
        let mut builder = match cfg.method {
            HttpMethod::Get => self.client.get(&cfg.url),
            HttpMethod::Post => self.client.post(&cfg.url),
            HttpMethod::Put => self.client.put(&cfg.url),
            HttpMethod::Patch => self.client.patch(&cfg.url),
            HttpMethod::Delete => self.client.delete(&cfg.url),
        };
        for (k, v) in &cfg.headers {
            builder = builder.header(k, v);
        }
        if cfg.method != HttpMethod::Get {
            builder = builder.header("Idempotency-Key", idempotency_key).json(body);
        }

        let resp = builder.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("upstream returned {}", resp.status()));
        }
        resp.json::<Value>().await.or_else(|_| Ok(Value::Null))
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn jitter_millis(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let max_jitter = ((base_ms as f64) * 0.3) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(
        &self,
        config: &Value,
        ctx: &FlowContext,
        _input: Option<&InboundMessage>,
    ) -> ExecutionResult {
        let view = ctx.interpolation_view();
        let rendered_config = interpolate_json(config, &view);
        let cfg: HttpConfig = match serde_json::from_value(rendered_config) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "http executor config schema error");
                return ExecutionResult::failure("error");
            }
        };

        self.sweep_expired();
        let idempotency_key = format!("{}:{}:{}", ctx.run_id.0, ctx.current_state, Uuid::new_v4());
        let body = cfg.body.clone();

        match self.send_once(&cfg, &idempotency_key, &body).await {
            Ok(v) => return ExecutionResult::ok(v).with_event("success"),
            Err(e) => warn!(error = %e, url = %cfg.url, "http executor call failed"),
        }

        let jitter_ms = RETRY_BASE_MS + jitter_millis(RETRY_BASE_MS);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        if self.recent_keys.contains_key(&idempotency_key) {
            return ExecutionResult::failure("error");
        }
        self.recent_keys.insert(idempotency_key.clone(), Instant::now());

        match self.send_once(&cfg, &idempotency_key, &body).await {
            Ok(v) => ExecutionResult::ok(v).with_event("success"),
            Err(e) => {
                warn!(error = %e, url = %cfg.url, "http executor retry failed");
                ExecutionResult::failure("error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded() {
        for _ in 0..20 {
            let j = jitter_millis(RETRY_BASE_MS);
            assert!(j < RETRY_BASE_MS);
        }
    }
}
