//! Screenshot tool — thin forwarding to the session's automation handle.
//!
//! The captured image is stored as a per-session artifact so callers can
//! fetch it again by name until the session is cleaned up.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{Tool, ToolContext, ToolMedia, ToolOutput};

pub struct ScreenshotTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    #[serde(default)]
    session_id: Option<String>,
    /// Artifact name; generated from session id and timestamp when omitted.
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl Tool for ScreenshotTool {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn operation(&self) -> &str {
        "capture"
    }

    fn description(&self) -> &str {
        "Capture the session's current page as a PNG, store it as a session artifact, and return it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": {
                    "type": "string",
                    "description": "Session to capture. Omit for the default session."
                },
                "name": {
                    "type": "string",
                    "description": "Artifact name to store the image under."
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let p: Params = serde_json::from_value(params)?;
        let engine_cfg = context.config.engine();

        let session_id = p.session_id.or_else(|| context.session_id.clone());
        let session = match &session_id {
            Some(id) => {
                match context.registry.get_session(id, &engine_cfg, false).await {
                    Ok(Some(session)) => session,
                    Ok(None) => {
                        return Ok(ToolOutput::error(format!("No live session for {id}")));
                    }
                    Err(e) => return Ok(ToolOutput::error(format!("Session lookup failed: {e}"))),
                }
            }
            None => match context.registry.ensure_default_session(&engine_cfg).await {
                Ok(session) => session,
                Err(e) => return Ok(ToolOutput::error(format!("Session creation failed: {e}"))),
            },
        };

        let bytes = match session.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(ToolOutput::error(format!("Screenshot failed: {e}"))),
        };

        let name = p.name.unwrap_or_else(|| {
            format!("screenshot-{}-{}", session.id, chrono::Utc::now().timestamp_millis())
        });
        context
            .resources
            .put(&session.id, &name, bytes.clone(), "image/png")
            .await?;
        debug!(session_id = %session.id, name, bytes = bytes.len(), "Screenshot stored");

        let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(ToolOutput {
            content: format!("Screenshot captured ({} bytes) as {name}", bytes.len()),
            is_error: false,
            media: Some(vec![ToolMedia {
                mime_type: "image/png".into(),
                data: b64,
            }]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::context;
    use serde_json::json;

    #[tokio::test]
    async fn test_screenshot_stores_artifact_under_session() {
        let ctx = context();
        let out = ScreenshotTool
            .execute(json!({"name": "page-1"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);
        assert!(out.media.is_some());

        let entry = ctx.resources.get("page-1").await.unwrap().unwrap();
        let default_id = ctx.registry.default_session_id().await.unwrap();
        assert_eq!(entry.session_id, default_id);
        assert_eq!(entry.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_screenshot_generates_name_when_omitted() {
        let ctx = context();
        let out = ScreenshotTool.execute(json!({}), &ctx).await.unwrap();
        assert!(!out.is_error);

        let default_id = ctx.registry.default_session_id().await.unwrap();
        let names = ctx.resources.names_for_session(&default_id).await.unwrap();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(&format!("screenshot-{default_id}-")));
    }

    #[tokio::test]
    async fn test_screenshot_of_missing_named_session_errors() {
        let ctx = context();
        let out = ScreenshotTool
            .execute(json!({"sessionId": "ghost"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("No live session"));
    }
}
