//! HTTP-backed automation engine.
//!
//! Drives the provider's sessions REST API: create (with proxy/context
//! options), status lookup for resume, debug-URL fetch, and release.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use browserd_core::config::EngineConfig;
use browserd_core::error::{BrowserdError, Result};

use crate::{AutomationEngine, AutomationHandle, EngineOptions};

const DEFAULT_BASE_URL: &str = "https://api.browserbase.com";

#[derive(Debug)]
struct EngineInner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    project_id: String,
}

/// Automation engine speaking the provider's REST sessions API.
#[derive(Debug)]
pub struct HttpEngine {
    inner: Arc<EngineInner>,
}

impl HttpEngine {
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| BrowserdError::Config("engine.api_key is required".into()))?;
        let project_id = cfg
            .project_id
            .clone()
            .ok_or_else(|| BrowserdError::Config("engine.project_id is required".into()))?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BrowserdError::Engine(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                client,
                base_url,
                api_key,
                project_id,
            }),
        })
    }
}

impl EngineInner {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(self.url(path))
            .header("x-bb-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| BrowserdError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(BrowserdError::Engine(format!(
                "GET {path} returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| BrowserdError::Engine(e.to_string()))
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.url(path))
            .header("x-bb-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrowserdError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(BrowserdError::Engine(format!(
                "POST {path} returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| BrowserdError::Engine(e.to_string()))
    }

    /// Fetch the live-view and debugger URLs for a session. Best-effort: a
    /// session without debug URLs is still usable.
    async fn debug_urls(&self, remote_id: &str) -> (Option<String>, Option<String>) {
        match self.get_json(&format!("/v1/sessions/{remote_id}/debug")).await {
            Ok(body) => {
                let live = body["debuggerFullscreenUrl"].as_str().map(str::to_string);
                let debugger = body["debuggerUrl"].as_str().map(str::to_string);
                (live, debugger)
            }
            Err(e) => {
                warn!(remote_id, %e, "Debug URL fetch failed");
                (None, None)
            }
        }
    }

    async fn session_status(&self, remote_id: &str) -> Result<String> {
        let body = self.get_json(&format!("/v1/sessions/{remote_id}")).await?;
        Ok(body["status"].as_str().unwrap_or("UNKNOWN").to_string())
    }
}

struct HttpHandle {
    inner: Arc<EngineInner>,
    remote_id: String,
    live_view_url: Option<String>,
    debugger_url: Option<String>,
}

#[async_trait]
impl AutomationHandle for HttpHandle {
    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    fn live_view_url(&self) -> Option<&str> {
        self.live_view_url.as_deref()
    }

    fn debugger_url(&self) -> Option<&str> {
        self.debugger_url.as_deref()
    }

    async fn is_alive(&self) -> bool {
        matches!(
            self.inner.session_status(&self.remote_id).await.as_deref(),
            Ok("RUNNING")
        )
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let resp = self
            .inner
            .client
            .get(self.inner.url(&format!("/v1/sessions/{}/screenshot", self.remote_id)))
            .header("x-bb-api-key", &self.inner.api_key)
            .send()
            .await
            .map_err(|e| BrowserdError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(BrowserdError::Engine(format!(
                "screenshot returned {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BrowserdError::Engine(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.inner
            .post_json(
                &format!("/v1/sessions/{}", self.remote_id),
                json!({
                    "projectId": self.inner.project_id,
                    "status": "REQUEST_RELEASE",
                }),
            )
            .await?;
        debug!(remote_id = %self.remote_id, "Remote session released");
        Ok(())
    }
}

#[async_trait]
impl AutomationEngine for HttpEngine {
    async fn open(&self, opts: &EngineOptions) -> Result<Box<dyn AutomationHandle>> {
        let mut body = json!({
            "projectId": self.inner.project_id,
            "proxies": opts.proxies,
            "keepAlive": opts.keep_alive,
        });
        if let Some(context) = &opts.context {
            body["browserSettings"] = json!({
                "context": { "id": context, "persist": true }
            });
        }

        let resp = self.inner.post_json("/v1/sessions", body).await?;
        let remote_id = resp["id"]
            .as_str()
            .ok_or_else(|| BrowserdError::Engine("create response missing session id".into()))?
            .to_string();

        let (live_view_url, debugger_url) = self.inner.debug_urls(&remote_id).await;
        debug!(remote_id, proxies = opts.proxies, "Opened remote session");

        Ok(Box::new(HttpHandle {
            inner: Arc::clone(&self.inner),
            remote_id,
            live_view_url,
            debugger_url,
        }))
    }

    async fn resume(
        &self,
        remote_id: &str,
        _opts: &EngineOptions,
    ) -> Result<Box<dyn AutomationHandle>> {
        let status = self.inner.session_status(remote_id).await?;
        if status != "RUNNING" {
            return Err(BrowserdError::Engine(format!(
                "remote session {remote_id} is {status}, not RUNNING"
            )));
        }

        let (live_view_url, debugger_url) = self.inner.debug_urls(remote_id).await;
        debug!(remote_id, "Resumed remote session");

        Ok(Box::new(HttpHandle {
            inner: Arc::clone(&self.inner),
            remote_id: remote_id.to_string(),
            live_view_url,
            debugger_url,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_credentials() {
        let err = HttpEngine::from_config(&EngineConfig::default()).unwrap_err();
        assert!(matches!(err, BrowserdError::Config(_)));
    }

    #[test]
    fn test_url_join_trims_trailing_slash() {
        let cfg = EngineConfig {
            api_key: Some("key".into()),
            project_id: Some("proj".into()),
            base_url: Some("https://example.test/".into()),
            ..Default::default()
        };
        let engine = HttpEngine::from_config(&cfg).unwrap();
        assert_eq!(
            engine.inner.url("/v1/sessions"),
            "https://example.test/v1/sessions"
        );
    }
}
