//! Shared types for sessions and usage metering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Typed per-session metadata. Known fields are explicit; truly
/// provider-specific extras go into the `extra` bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Remote context the session was attached to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    /// Whether the session was opened through the provider's proxy pool.
    #[serde(default)]
    pub proxies: bool,

    /// Remote session id this session was resumed from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Identifies one metering bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageKey {
    pub session_id: String,
    pub tool_name: String,
    pub operation: String,
}

/// Numeric usage deltas attached to one recorded call. All fields are
/// optional; absent fields leave the accumulated totals untouched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub inference_time_ms: Option<u64>,
    pub cost: Option<f64>,
}

/// Cumulative usage totals for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub inference_time_ms: u64,
    pub cost: f64,
}

impl UsageTotals {
    /// Fold one call's deltas into the running totals.
    pub fn add(&mut self, metrics: &UsageMetrics) {
        self.input_tokens += metrics.input_tokens.unwrap_or(0);
        self.output_tokens += metrics.output_tokens.unwrap_or(0);
        self.inference_time_ms += metrics.inference_time_ms.unwrap_or(0);
        self.cost += metrics.cost.unwrap_or(0.0);
    }
}

/// Counters for one operation within one scope (global or per-session).
///
/// Invariant: `sum(tool_call_counts.values()) == call_count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationStats {
    pub call_count: u64,
    pub tool_call_counts: HashMap<String, u64>,
    pub totals: UsageTotals,
}

impl OperationStats {
    pub fn record(&mut self, tool_name: &str, metrics: Option<&UsageMetrics>) {
        self.call_count += 1;
        *self.tool_call_counts.entry(tool_name.to_string()).or_insert(0) += 1;
        if let Some(m) = metrics {
            self.totals.add(m);
        }
    }
}

/// Per-session slice of a usage snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionUsage {
    pub operations: HashMap<String, OperationStats>,
}

/// Point-in-time view of the usage meter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub global: HashMap<String, OperationStats>,
    pub per_session: HashMap<String, SessionUsage>,
}

/// Read scope for usage snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsScope {
    Global,
    Session,
    All,
}

impl std::str::FromStr for StatsScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "session" | "per_session" | "perSession" => Ok(Self::Session),
            "all" => Ok(Self::All),
            other => Err(format!("unknown stats scope: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_stats_invariant() {
        let mut stats = OperationStats::default();
        stats.record("navigate", None);
        stats.record("navigate", None);
        stats.record("extract", None);

        assert_eq!(stats.call_count, 3);
        let sum: u64 = stats.tool_call_counts.values().sum();
        assert_eq!(sum, stats.call_count);
    }

    #[test]
    fn test_totals_omitted_metrics_do_not_zero() {
        let mut stats = OperationStats::default();
        stats.record(
            "act",
            Some(&UsageMetrics {
                input_tokens: Some(100),
                output_tokens: Some(20),
                ..Default::default()
            }),
        );
        stats.record("act", None);

        assert_eq!(stats.totals.input_tokens, 100);
        assert_eq!(stats.totals.output_tokens, 20);
        assert_eq!(stats.call_count, 2);
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("global".parse::<StatsScope>().unwrap(), StatsScope::Global);
        assert_eq!("session".parse::<StatsScope>().unwrap(), StatsScope::Session);
        assert_eq!("all".parse::<StatsScope>().unwrap(), StatsScope::All);
        assert!("bogus".parse::<StatsScope>().is_err());
    }
}
