//! Session lifecycle tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{Tool, ToolContext, ToolOutput};

/// Create or resume a browser session.
pub struct SessionCreateTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    resume_id: Option<String>,
}

#[async_trait]
impl Tool for SessionCreateTool {
    fn name(&self) -> &str {
        "session_create"
    }

    fn operation(&self) -> &str {
        "session"
    }

    fn description(&self) -> &str {
        "Create a browser session (or resume a remote one) and return its remote id and debug URLs. Without a sessionId, the shared default session is used."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": {
                    "type": "string",
                    "description": "Session id to create or reuse. Omit for the default session."
                },
                "resumeId": {
                    "type": "string",
                    "description": "Remote session id to resume instead of opening a new one."
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let p: CreateParams = serde_json::from_value(params)?;
        let engine_cfg = context.config.engine();

        let session_id = p.session_id.or_else(|| context.session_id.clone());
        debug!(session_id = session_id.as_deref(), "session_create");

        let result = match &session_id {
            Some(id) => {
                context
                    .registry
                    .create_or_resume_session(id, &engine_cfg, p.resume_id.as_deref())
                    .await
            }
            None => context.registry.ensure_default_session(&engine_cfg).await,
        };

        match result {
            Ok(session) => {
                let body = json!({
                    "sessionId": session.id,
                    "remoteId": session.remote_id,
                    "liveViewUrl": session.live_view_url(),
                    "debuggerUrl": session.debugger_url(),
                });
                Ok(ToolOutput::text(serde_json::to_string_pretty(&body)?))
            }
            Err(e) => Ok(ToolOutput::error(format!("Session creation failed: {e}"))),
        }
    }
}

/// Close a session and reset the caller's context to the default.
pub struct SessionCloseTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseParams {
    #[serde(default)]
    session_id: Option<String>,
}

#[async_trait]
impl Tool for SessionCloseTool {
    fn name(&self) -> &str {
        "session_close"
    }

    fn operation(&self) -> &str {
        "session"
    }

    fn description(&self) -> &str {
        "Close a browser session and release its remote browsing context. Closing when no session is live is a no-op."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": {
                    "type": "string",
                    "description": "Session id to close. Omit for the current/default session."
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let p: CloseParams = serde_json::from_value(params)?;

        let target = match p.session_id {
            Some(id) => Some(id),
            None => context.target_session_id().await,
        };

        let Some(previous_id) = target else {
            return Ok(ToolOutput::text(
                "No active session to close. Session context is already default.",
            ));
        };

        let outcome = context.registry.cleanup_session(&previous_id).await;

        let mut message = if outcome.found {
            match &outcome.remote_id {
                Some(remote) => format!(
                    "Closed session {previous_id} (remote {remote}). Session context reset to default."
                ),
                None => format!("Closed session {previous_id}. Session context reset to default."),
            }
        } else {
            format!("No live session for {previous_id}. Session context reset to default.")
        };

        if let Some(purge_error) = &outcome.purge_error {
            message.push_str(&format!(
                " Some cleanup steps encountered errors: {purge_error}."
            ));
        }

        let body = json!({
            "previousSessionId": previous_id,
            "remoteId": outcome.remote_id,
            "message": message,
        });
        Ok(ToolOutput::text(serde_json::to_string_pretty(&body)?))
    }
}
