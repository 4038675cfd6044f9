//! Serve loop: line-delimited JSON requests on stdin, one JSON response per
//! line on stdout. Request framing beyond that is the transport's problem;
//! this loop only resolves the tool, executes it, and meters the call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use browserd_core::config::Config;
use browserd_core::types::UsageKey;
use browserd_registry::{ResourceStore, SessionRegistry};
use browserd_tools::{ToolContext, ToolRegistry};
use browserd_usage::UsageMeter;

/// Everything a request needs, shared across the loop.
pub struct ServeState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub meter: Arc<UsageMeter>,
    pub resources: Arc<ResourceStore>,
    pub tools: ToolRegistry,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    #[serde(default)]
    id: Option<serde_json::Value>,
    tool: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
    content: serde_json::Value,
    is_error: bool,
}

/// Handle one request line. Never fails: every problem becomes an error
/// response so the transport stays up.
pub async fn handle_line(state: &ServeState, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Response {
                id: None,
                content: serde_json::Value::String(format!("Malformed request: {e}")),
                is_error: true,
            };
        }
    };

    // Capability listing is answered directly, not metered.
    if request.tool == "tools/list" {
        return Response {
            id: request.id,
            content: serde_json::Value::Array(state.tools.definitions()),
            is_error: false,
        };
    }

    let Some(tool) = state.tools.get(&request.tool) else {
        return Response {
            id: request.id,
            content: serde_json::Value::String(format!("Unknown tool: {}", request.tool)),
            is_error: true,
        };
    };

    let context = ToolContext {
        session_id: request.session_id.clone(),
        registry: Arc::clone(&state.registry),
        meter: Arc::clone(&state.meter),
        resources: Arc::clone(&state.resources),
        config: Arc::clone(&state.config),
    };

    let params = request.params.unwrap_or_else(|| serde_json::json!({}));
    debug!(tool = %request.tool, "Dispatching tool call");

    let output = match tool.execute(params, &context).await {
        Ok(output) => output,
        Err(e) => {
            warn!(tool = %request.tool, %e, "Tool execution failed");
            return Response {
                id: request.id,
                content: serde_json::Value::String(format!("Tool failed: {e}")),
                is_error: true,
            };
        }
    };

    // Meter the call against the session it ran under. Requests with no
    // session binding land in the default session's bucket when one exists.
    let session_id = match request.session_id {
        Some(id) => id,
        None => state
            .registry
            .default_session_id()
            .await
            .unwrap_or_else(|| "unbound".to_string()),
    };
    let key = UsageKey {
        session_id,
        tool_name: tool.name().to_string(),
        operation: tool.operation().to_string(),
    };
    state.meter.record(&key, None).await;

    Response {
        id: request.id,
        content: serde_json::json!({
            "text": output.content,
            "media": output.media,
        }),
        is_error: output.is_error,
    }
}

/// Run the loop until stdin closes.
pub async fn run(state: Arc<ServeState>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&state, &line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use browserd_core::error::Result;
    use browserd_core::types::StatsScope;
    use browserd_engine::{AutomationEngine, AutomationHandle, EngineOptions};

    struct StubHandle {
        remote_id: String,
    }

    #[async_trait]
    impl AutomationHandle for StubHandle {
        fn remote_id(&self) -> &str {
            &self.remote_id
        }

        fn live_view_url(&self) -> Option<&str> {
            None
        }

        fn debugger_url(&self) -> Option<&str> {
            None
        }

        async fn is_alive(&self) -> bool {
            true
        }

        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubEngine {
        opens: AtomicU32,
    }

    #[async_trait]
    impl AutomationEngine for StubEngine {
        async fn open(&self, _opts: &EngineOptions) -> Result<Box<dyn AutomationHandle>> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubHandle {
                remote_id: format!("remote-{n}"),
            }))
        }

        async fn resume(
            &self,
            remote_id: &str,
            _opts: &EngineOptions,
        ) -> Result<Box<dyn AutomationHandle>> {
            Ok(Box::new(StubHandle {
                remote_id: remote_id.to_string(),
            }))
        }
    }

    fn state() -> ServeState {
        let meter = Arc::new(UsageMeter::new());
        let resources = Arc::new(ResourceStore::in_memory());
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(StubEngine::default()),
            Arc::clone(&resources),
            Arc::clone(&meter),
            None,
        ));
        ServeState {
            config: Arc::new(Config::default()),
            registry,
            meter,
            resources,
            tools: ToolRegistry::with_builtins(),
        }
    }

    #[tokio::test]
    async fn test_malformed_request_is_error_response() {
        let state = state();
        let response = handle_line(&state, "not json").await;
        assert!(response.is_error);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_response() {
        let state = state();
        let response =
            handle_line(&state, r#"{"id": 1, "tool": "teleport"}"#).await;
        assert!(response.is_error);
        assert_eq!(response.id, Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let state = state();
        let response = handle_line(&state, r#"{"tool": "tools/list"}"#).await;
        assert!(!response.is_error);
        assert_eq!(response.content.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_dispatch_creates_session_and_meters_call() {
        let state = state();
        let response = handle_line(
            &state,
            r#"{"id": "a", "tool": "session_create", "sessionId": "s1"}"#,
        )
        .await;
        assert!(!response.is_error);

        let snap = state.meter.snapshot(StatsScope::All, None).await;
        assert_eq!(snap.global["session"].call_count, 1);
        assert_eq!(snap.global["session"].tool_call_counts["session_create"], 1);
        assert_eq!(snap.per_session["s1"].operations["session"].call_count, 1);
    }

    #[tokio::test]
    async fn test_unbound_calls_land_in_default_bucket() {
        let state = state();
        handle_line(&state, r#"{"tool": "session_create"}"#).await;
        let default_id = state.registry.default_session_id().await.unwrap();

        let snap = state.meter.snapshot(StatsScope::All, None).await;
        assert_eq!(
            snap.per_session[&default_id].operations["session"].call_count,
            1
        );
    }
}
