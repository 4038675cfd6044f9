//! Post-hoc usage accounting fetch.
//!
//! Best-effort: the fetch runs at session close and its failure must never
//! block or fail cleanup. Every network, parse, or shape problem degrades to
//! "no data" after a warn log.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use browserd_core::config::{EngineConfig, ReplayConfig};
use browserd_core::types::UsageMetrics;

/// Aggregated token/time totals for one remote session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub inference_time_ms: u64,
}

impl From<ReplayTotals> for UsageMetrics {
    fn from(totals: ReplayTotals) -> Self {
        Self {
            input_tokens: Some(totals.input_tokens),
            output_tokens: Some(totals.output_tokens),
            inference_time_ms: Some(totals.inference_time_ms),
            cost: None,
        }
    }
}

/// Sum per-action token usage records out of the accounting payload.
///
/// The payload is provider-owned; walk it leniently and treat anything
/// unexpected as absent rather than failing.
fn sum_action_usage(body: &serde_json::Value) -> Option<ReplayTotals> {
    let actions = body["actions"].as_array().or_else(|| body.as_array())?;

    let mut totals = ReplayTotals::default();
    let mut seen = false;
    for action in actions {
        let usage = &action["usage"];
        let record = if usage.is_object() { usage } else { action };
        let input = record["inputTokens"].as_u64();
        let output = record["outputTokens"].as_u64();
        if input.is_none() && output.is_none() {
            continue;
        }
        seen = true;
        totals.input_tokens += input.unwrap_or(0);
        totals.output_tokens += output.unwrap_or(0);
        totals.inference_time_ms += record["inferenceTimeMs"].as_u64().unwrap_or(0);
    }

    seen.then_some(totals)
}

/// The external collaborator contract: given a remote session id, return
/// aggregated usage totals or nothing. Implementations must never fail — a
/// failed fetch is "no data".
#[async_trait]
pub trait ReplayFetch: Send + Sync {
    async fn fetch(&self, remote_id: &str) -> Option<ReplayTotals>;
}

/// Fetches aggregated token/time usage for a remote session from the
/// provider's accounting endpoint.
pub struct UsageReplayFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    project_id: String,
    model_api_key: Option<String>,
}

impl UsageReplayFetcher {
    /// Build from config. Returns `None` when the replay fetch is disabled or
    /// not configured; the registry then simply skips it.
    pub fn from_config(replay: &ReplayConfig, engine: &EngineConfig) -> Option<Self> {
        if !replay.enabled {
            return None;
        }
        let base_url = replay.base_url.clone()?;
        let api_key = engine.api_key.clone()?;
        let project_id = engine.project_id.clone()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url,
            api_key,
            project_id,
            model_api_key: replay.model_api_key.clone(),
        })
    }

    async fn try_fetch(&self, remote_id: &str) -> anyhow::Result<Option<ReplayTotals>> {
        let url = format!(
            "{}/v1/sessions/{remote_id}/usage",
            self.base_url.trim_end_matches('/')
        );

        let mut request = self
            .client
            .get(&url)
            .header("x-bb-api-key", &self.api_key)
            .header("x-bb-project-id", &self.project_id);
        if let Some(model_key) = &self.model_api_key {
            request = request.header("x-model-api-key", model_key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("replay endpoint returned {}", resp.status());
        }

        let body: serde_json::Value = resp.json().await?;
        Ok(sum_action_usage(&body))
    }
}

#[async_trait]
impl ReplayFetch for UsageReplayFetcher {
    /// Fetch totals for `remote_id`, or `None` when there is no data or
    /// anything at all went wrong.
    async fn fetch(&self, remote_id: &str) -> Option<ReplayTotals> {
        match self.try_fetch(remote_id).await {
            Ok(Some(totals)) => {
                debug!(
                    remote_id,
                    input_tokens = totals.input_tokens,
                    output_tokens = totals.output_tokens,
                    "Replay usage fetched"
                );
                Some(totals)
            }
            Ok(None) => {
                debug!(remote_id, "Replay endpoint returned no usage data");
                None
            }
            Err(e) => {
                warn!(remote_id, %e, "Replay usage fetch failed");
                None
            }
        }
    }
}
