//! Per-session keyed blob storage for captured artifacts.
//!
//! Entries are owned by exactly one session and destroyed with it. Deletion
//! runs under the bounded retry policy; exhausting retries surfaces the last
//! error to the registry, which treats it as non-fatal.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use browserd_core::error::{BrowserdError, Result};
use browserd_core::retry::{RetryPolicy, retry};

/// One stored artifact.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Owning session id.
    pub session_id: String,
    /// Unique name within the store.
    pub name: String,
    pub payload: Vec<u8>,
    pub mime_type: String,
}

/// Storage backend behind the store. The default is in-memory; anything
/// durable (disk, object storage) plugs in here.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn put(&self, entry: ResourceEntry) -> Result<()>;
    async fn get(&self, name: &str) -> Result<Option<ResourceEntry>>;
    async fn remove_for_session(&self, session_id: &str) -> Result<()>;
    async fn remove_all(&self) -> Result<()>;
    async fn names_for_session(&self, session_id: &str) -> Result<Vec<String>>;
}

/// In-memory backend keyed by entry name.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, ResourceEntry>>,
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    async fn put(&self, entry: ResourceEntry) -> Result<()> {
        self.entries.write().await.insert(entry.name.clone(), entry);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ResourceEntry>> {
        Ok(self.entries.read().await.get(name).cloned())
    }

    async fn remove_for_session(&self, session_id: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .retain(|_, e| e.session_id != session_id);
        Ok(())
    }

    async fn remove_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn names_for_session(&self, session_id: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.session_id == session_id)
            .map(|e| e.name.clone())
            .collect())
    }
}

/// Artifact store with retrying per-session deletion.
pub struct ResourceStore {
    backend: Box<dyn ResourceBackend>,
    purge_policy: RetryPolicy,
}

impl ResourceStore {
    pub fn new(backend: Box<dyn ResourceBackend>, purge_policy: RetryPolicy) -> Self {
        Self {
            backend,
            purge_policy,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::default()), RetryPolicy::default())
    }

    pub async fn put(
        &self,
        session_id: &str,
        name: &str,
        payload: Vec<u8>,
        mime_type: &str,
    ) -> Result<()> {
        debug!(session_id, name, bytes = payload.len(), "Storing artifact");
        self.backend
            .put(ResourceEntry {
                session_id: session_id.to_string(),
                name: name.to_string(),
                payload,
                mime_type: mime_type.to_string(),
            })
            .await
    }

    pub async fn get(&self, name: &str) -> Result<Option<ResourceEntry>> {
        self.backend.get(name).await
    }

    pub async fn names_for_session(&self, session_id: &str) -> Result<Vec<String>> {
        self.backend.names_for_session(session_id).await
    }

    /// Delete every entry owned by `session_id`, retrying with backoff.
    /// Exhaustion maps to `ResourcePurge` carrying the last backend error.
    pub async fn clear_for_session(&self, session_id: &str) -> Result<()> {
        retry(&self.purge_policy, "resource_purge", || {
            self.backend.remove_for_session(session_id)
        })
        .await
        .map_err(|e| BrowserdError::ResourcePurge(format!("session {session_id}: {e}")))
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.backend.remove_all().await
    }
}
