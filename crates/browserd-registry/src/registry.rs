//! Session lifecycle registry.
//!
//! Owns the map of session id to live session. Per-id serialization comes
//! from one FIFO mutex per id (the "slot"); the map itself sits behind its
//! own lock and is only ever held briefly. Lock order: a slot may be held
//! while taking the map lock, never the other way around.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use browserd_core::config::EngineConfig;
use browserd_core::error::{BrowserdError, Result};
use browserd_core::types::{SessionMeta, UsageKey};
use browserd_engine::{AutomationEngine, AutomationHandle, EngineOptions};
use browserd_usage::{ReplayFetch, UsageMeter};

use crate::resources::ResourceStore;

/// Prefix for generated default-session ids.
const DEFAULT_SESSION_PREFIX: &str = "session-";

/// Meter bucket that replay accounting totals are folded into.
const REPLAY_OPERATION: &str = "replay";
const REPLAY_TOOL: &str = "session_replay";

/// One live session: the local id, the remote browsing context it maps to,
/// and the owned automation handle. The handle is private — only the
/// registry closes or replaces it.
pub struct Session {
    pub id: String,
    pub created: DateTime<Utc>,
    pub remote_id: String,
    handle: Box<dyn AutomationHandle>,
    meta: RwLock<SessionMeta>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created", &self.created)
            .field("remote_id", &self.remote_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn live_view_url(&self) -> Option<&str> {
        self.handle.live_view_url()
    }

    pub fn debugger_url(&self) -> Option<&str> {
        self.handle.debugger_url()
    }

    pub async fn is_alive(&self) -> bool {
        self.handle.is_alive().await
    }

    /// Thin forwarding of the one page action the façade exposes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.handle.screenshot().await
    }

    pub async fn meta(&self) -> SessionMeta {
        self.meta.read().await.clone()
    }
}

#[derive(Default)]
struct Slot {
    session: Option<Arc<Session>>,
}

type SlotRef = Arc<Mutex<Slot>>;

/// What `cleanup_session` actually did. Cleanup itself never fails; partial
/// failures in best-effort side work are reported here (and logged) so the
/// façade can mention them without treating the close as failed.
#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    /// Whether a live session existed for the id.
    pub found: bool,
    /// Remote id of the closed session, when one existed.
    pub remote_id: Option<String>,
    /// Last error from the artifact purge, when retries were exhausted.
    pub purge_error: Option<String>,
    /// Whether replay accounting totals were folded into the meter.
    pub replay_recorded: bool,
}

/// Creates, resumes, and destroys sessions, and owns their cleanup.
pub struct SessionRegistry {
    engine: Arc<dyn AutomationEngine>,
    resources: Arc<ResourceStore>,
    meter: Arc<UsageMeter>,
    replay: Option<Arc<dyn ReplayFetch>>,
    sessions: Mutex<HashMap<String, SlotRef>>,
    default_id: Mutex<Option<String>>,
}

impl SessionRegistry {
    pub fn new(
        engine: Arc<dyn AutomationEngine>,
        resources: Arc<ResourceStore>,
        meter: Arc<UsageMeter>,
        replay: Option<Arc<dyn ReplayFetch>>,
    ) -> Self {
        Self {
            engine,
            resources,
            meter,
            replay,
            sessions: Mutex::new(HashMap::new()),
            default_id: Mutex::new(None),
        }
    }

    /// Return the current default session, creating it lazily. A defunct
    /// default handle is transparently reopened under the same id.
    pub async fn ensure_default_session(&self, cfg: &EngineConfig) -> Result<Arc<Session>> {
        // Claim the default id first; concurrent callers then funnel into
        // the same slot and reuse the in-flight creation.
        let id = {
            let mut cell = self.default_id.lock().await;
            match &*cell {
                Some(id) => id.clone(),
                None => {
                    let id = format!("{DEFAULT_SESSION_PREFIX}{}", Uuid::new_v4());
                    *cell = Some(id.clone());
                    id
                }
            }
        };

        let (slot, mut guard) = self.lock_slot(&id).await;

        if let Some(session) = guard.session.clone() {
            if session.is_alive().await {
                return Ok(session);
            }
            info!(session_id = %id, "Default session handle defunct; reopening");
            if let Err(e) = session.handle.close().await {
                debug!(session_id = %id, %e, "Closing defunct handle failed");
            }
            guard.session = None;
        }

        match self.open_session(&id, cfg, None).await {
            Ok(session) => {
                guard.session = Some(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                self.remove_entry(&id, &slot).await;
                Err(e)
            }
        }
    }

    /// Idempotent create: a live session for `id` is returned unchanged.
    /// With `resume_id`, the remote session is resumed instead of opened; a
    /// failed resume surfaces as `SessionCreation` rather than silently
    /// substituting a fresh session.
    pub async fn create_or_resume_session(
        &self,
        id: &str,
        cfg: &EngineConfig,
        resume_id: Option<&str>,
    ) -> Result<Arc<Session>> {
        let (slot, mut guard) = self.lock_slot(id).await;

        if let Some(session) = &guard.session {
            return Ok(Arc::clone(session));
        }

        match self.open_session(id, cfg, resume_id).await {
            Ok(session) => {
                guard.session = Some(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                // Nothing was committed; drop the empty slot so the id reads
                // as absent again.
                self.remove_entry(id, &slot).await;
                Err(e)
            }
        }
    }

    /// Read path. With `create_if_missing` false, a missing id is `Ok(None)`.
    /// A named session whose handle turns out defunct is reported as
    /// `SessionExpired` and removed; only the default session gets the
    /// transparent reopen.
    pub async fn get_session(
        &self,
        id: &str,
        cfg: &EngineConfig,
        create_if_missing: bool,
    ) -> Result<Option<Arc<Session>>> {
        if create_if_missing {
            return self.create_or_resume_session(id, cfg, None).await.map(Some);
        }

        let Some((slot, mut guard)) = self.lock_existing_slot(id).await else {
            return Ok(None);
        };

        let Some(session) = guard.session.clone() else {
            self.remove_entry(id, &slot).await;
            return Ok(None);
        };

        if session.is_alive().await {
            return Ok(Some(session));
        }

        if self.default_session_id().await.as_deref() == Some(id) {
            info!(session_id = id, "Default session handle defunct; reopening");
            if let Err(e) = session.handle.close().await {
                debug!(session_id = id, %e, "Closing defunct handle failed");
            }
            guard.session = None;
            match self.open_session(id, cfg, None).await {
                Ok(fresh) => {
                    guard.session = Some(Arc::clone(&fresh));
                    Ok(Some(fresh))
                }
                Err(e) => {
                    self.remove_entry(id, &slot).await;
                    Err(e)
                }
            }
        } else {
            warn!(session_id = id, "Named session handle is defunct; removing entry");
            guard.session = None;
            if let Err(e) = session.handle.close().await {
                debug!(session_id = id, %e, "Closing defunct handle failed");
            }
            self.remove_entry(id, &slot).await;
            Err(BrowserdError::SessionExpired(id.to_string()))
        }
    }

    /// Idempotent teardown: closing a missing or already-closed session is a
    /// no-op, never an error. Resource purge and replay accounting are
    /// best-effort; the registry entry is removed even when they fail.
    pub async fn cleanup_session(&self, id: &str) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        let Some((slot, mut guard)) = self.lock_existing_slot(id).await else {
            debug!(session_id = id, "No session to clean up");
            self.clear_default_if(id).await;
            return outcome;
        };

        let Some(session) = guard.session.take() else {
            self.remove_entry(id, &slot).await;
            drop(guard);
            self.clear_default_if(id).await;
            return outcome;
        };
        outcome.found = true;
        outcome.remote_id = Some(session.remote_id.clone());

        if let Err(e) = session.handle.close().await {
            warn!(session_id = id, %e, "Automation handle close failed");
        }

        if let Err(e) = self.resources.clear_for_session(id).await {
            warn!(session_id = id, %e, "Artifact purge exhausted retries; removing session anyway");
            outcome.purge_error = Some(e.to_string());
        }

        if let Some(replay) = &self.replay {
            if let Some(totals) = replay.fetch(&session.remote_id).await {
                let key = UsageKey {
                    session_id: id.to_string(),
                    tool_name: REPLAY_TOOL.to_string(),
                    operation: REPLAY_OPERATION.to_string(),
                };
                self.meter.record(&key, Some(totals.into())).await;
                outcome.replay_recorded = true;
            }
        }

        self.remove_entry(id, &slot).await;
        drop(guard);
        self.clear_default_if(id).await;

        info!(session_id = id, remote_id = %session.remote_id, "Session cleaned up");
        outcome
    }

    /// Apply a metadata update to a live session.
    pub async fn update_session_meta<F>(&self, id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut SessionMeta),
    {
        let Some((_slot, guard)) = self.lock_existing_slot(id).await else {
            return Err(BrowserdError::SessionNotFound(id.to_string()));
        };
        let Some(session) = &guard.session else {
            return Err(BrowserdError::SessionNotFound(id.to_string()));
        };
        update(&mut *session.meta.write().await);
        Ok(())
    }

    /// Currently cached default session id, if any.
    pub async fn default_session_id(&self) -> Option<String> {
        self.default_id.lock().await.clone()
    }

    /// Ids of all live sessions.
    pub async fn active_session_ids(&self) -> Vec<String> {
        let slots: Vec<(String, SlotRef)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut ids = Vec::new();
        for (id, slot) in slots {
            if slot.lock().await.session.is_some() {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    async fn open_session(
        &self,
        id: &str,
        cfg: &EngineConfig,
        resume_id: Option<&str>,
    ) -> Result<Arc<Session>> {
        let opts = EngineOptions::from(cfg);
        let handle = match resume_id {
            Some(remote) => self.engine.resume(remote, &opts).await,
            None => self.engine.open(&opts).await,
        }
        .map_err(|e| BrowserdError::SessionCreation(e.to_string()))?;

        let remote_id = handle.remote_id().to_string();
        info!(
            session_id = id,
            remote_id,
            resumed = resume_id.is_some(),
            "Session opened"
        );

        Ok(Arc::new(Session {
            id: id.to_string(),
            created: Utc::now(),
            remote_id,
            handle,
            meta: RwLock::new(SessionMeta {
                context_id: opts.context.clone(),
                proxies: opts.proxies,
                resumed_from: resume_id.map(str::to_string),
                ..Default::default()
            }),
        }))
    }

    /// Get or insert the slot for `id`. Map lock only.
    async fn slot(&self, id: &str) -> SlotRef {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(
            sessions
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::default()))),
        )
    }

    /// Lock the slot for `id`, inserting one if absent. Re-checks that the
    /// map still points at the locked slot: a concurrent cleanup may have
    /// removed the entry while we waited, in which case we retry against the
    /// fresh slot rather than resurrect a dead one.
    async fn lock_slot(&self, id: &str) -> (SlotRef, OwnedMutexGuard<Slot>) {
        loop {
            let slot = self.slot(id).await;
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.entry_is(id, &slot).await {
                return (slot, guard);
            }
        }
    }

    /// Like `lock_slot`, but never inserts; `None` means the id is absent.
    async fn lock_existing_slot(&self, id: &str) -> Option<(SlotRef, OwnedMutexGuard<Slot>)> {
        loop {
            let slot = {
                let sessions = self.sessions.lock().await;
                Arc::clone(sessions.get(id)?)
            };
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.entry_is(id, &slot).await {
                return Some((slot, guard));
            }
        }
    }

    async fn entry_is(&self, id: &str, slot: &SlotRef) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|s| Arc::ptr_eq(s, slot))
            .unwrap_or(false)
    }

    /// Remove the map entry for `id` if it still points at `slot`. The
    /// caller holds the slot lock, so waiters re-resolve through `lock_slot`.
    async fn remove_entry(&self, id: &str, slot: &SlotRef) {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(id).map(|s| Arc::ptr_eq(s, slot)).unwrap_or(false) {
            sessions.remove(id);
        }
    }

    async fn clear_default_if(&self, id: &str) {
        let mut cell = self.default_id.lock().await;
        if cell.as_deref() == Some(id) {
            *cell = None;
        }
    }
}
