//! usage_stats tool — snapshot (and optionally reset) the usage meter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use browserd_core::types::StatsScope;

use crate::{Tool, ToolContext, ToolOutput};

pub struct UsageStatsTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    reset: bool,
}

fn default_scope() -> String {
    "all".to_string()
}

#[async_trait]
impl Tool for UsageStatsTool {
    fn name(&self) -> &str {
        "usage_stats"
    }

    fn operation(&self) -> &str {
        "usage"
    }

    fn description(&self) -> &str {
        "Report call/token/cost counters, globally or per session. With reset, the snapshot is taken first and the counters cleared afterwards."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "scope": {
                    "type": "string",
                    "enum": ["global", "session", "all"],
                    "description": "Which buckets to report (default: all)"
                },
                "sessionId": {
                    "type": "string",
                    "description": "Session to report when scope is \"session\""
                },
                "reset": {
                    "type": "boolean",
                    "description": "Clear all counters after taking the snapshot"
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

        let scope: StatsScope = match p.scope.parse() {
            Ok(scope) => scope,
            Err(e) => return Ok(ToolOutput::error(e)),
        };

        let session_id = match scope {
            StatsScope::Session => match p.session_id.or_else(|| context.session_id.clone()) {
                Some(id) => Some(id),
                None => {
                    return Ok(ToolOutput::error(
                        "scope \"session\" requires a sessionId",
                    ));
                }
            },
            _ => None,
        };

        let snapshot = if p.reset {
            context
                .meter
                .snapshot_and_reset(scope, session_id.as_deref())
                .await
        } else {
            context.meter.snapshot(scope, session_id.as_deref()).await
        };

        Ok(ToolOutput::text(serde_json::to_string_pretty(&snapshot)?))
    }
}
