//! In-memory usage meter.
//!
//! Counters are keyed by operation, both globally and per session. All
//! mutation goes through one lock, so a record and a reset never interleave:
//! a record either lands entirely before a reset or entirely after it.

use std::collections::HashMap;

use tokio::sync::Mutex;

use browserd_core::types::{
    OperationStats, SessionUsage, StatsScope, UsageKey, UsageMetrics, UsageSnapshot,
};

#[derive(Default)]
struct MeterState {
    global: HashMap<String, OperationStats>,
    per_session: HashMap<String, SessionUsage>,
}

impl MeterState {
    fn snapshot(&self, scope: StatsScope, session_id: Option<&str>) -> UsageSnapshot {
        match scope {
            StatsScope::Global => UsageSnapshot {
                global: self.global.clone(),
                per_session: HashMap::new(),
            },
            StatsScope::Session => {
                let mut per_session = HashMap::new();
                if let Some(id) = session_id {
                    if let Some(usage) = self.per_session.get(id) {
                        per_session.insert(id.to_string(), usage.clone());
                    }
                }
                UsageSnapshot {
                    global: HashMap::new(),
                    per_session,
                }
            }
            StatsScope::All => UsageSnapshot {
                global: self.global.clone(),
                per_session: self.per_session.clone(),
            },
        }
    }
}

/// Process-wide usage counters. Entries are created lazily on first record
/// and survive session teardown; only an explicit reset clears them.
#[derive(Default)]
pub struct UsageMeter {
    state: Mutex<MeterState>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call against both the global and the session bucket for
    /// `key.operation`. Metric fields are added cumulatively; an absent
    /// `metrics` leaves the accumulated totals untouched.
    pub async fn record(&self, key: &UsageKey, metrics: Option<UsageMetrics>) {
        let mut state = self.state.lock().await;

        state
            .global
            .entry(key.operation.clone())
            .or_default()
            .record(&key.tool_name, metrics.as_ref());

        state
            .per_session
            .entry(key.session_id.clone())
            .or_default()
            .operations
            .entry(key.operation.clone())
            .or_default()
            .record(&key.tool_name, metrics.as_ref());
    }

    /// Read-only point-in-time view, filtered per scope.
    pub async fn snapshot(&self, scope: StatsScope, session_id: Option<&str>) -> UsageSnapshot {
        self.state.lock().await.snapshot(scope, session_id)
    }

    /// Snapshot first, then clear, atomically with respect to records.
    pub async fn snapshot_and_reset(
        &self,
        scope: StatsScope,
        session_id: Option<&str>,
    ) -> UsageSnapshot {
        let mut state = self.state.lock().await;
        let snapshot = state.snapshot(scope, session_id);
        *state = MeterState::default();
        snapshot
    }

    /// Clear all counters.
    pub async fn reset(&self) {
        *self.state.lock().await = MeterState::default();
    }
}
