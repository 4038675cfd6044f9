//! Automation engine abstraction.
//!
//! The engine is an opaque external capability: it can open or resume a
//! remote browsing context and execute page actions against it. Everything
//! behind these traits (protocol, provider, action semantics) is outside the
//! broker core; the registry only depends on the contract.

use async_trait::async_trait;

use browserd_core::config::EngineConfig;
use browserd_core::error::Result;

pub mod http;

pub use http::HttpEngine;

/// Options passed to the engine when opening or resuming a remote session.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Route through the provider's proxy pool.
    pub proxies: bool,
    /// Remote context id to attach the session to.
    pub context: Option<String>,
    /// Keep the remote session alive after disconnect (required for resume).
    pub keep_alive: bool,
}

impl From<&EngineConfig> for EngineOptions {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            proxies: cfg.proxies,
            context: cfg.context.clone(),
            keep_alive: cfg.keep_alive,
        }
    }
}

/// An owned handle to one live remote browsing context.
///
/// The handle's lifetime is bound to the Session that owns it; only the
/// registry closes it.
#[async_trait]
pub trait AutomationHandle: Send + Sync {
    /// The provider's own identifier for this browsing context.
    fn remote_id(&self) -> &str;

    /// Human-watchable live view URL, when the provider exposes one.
    fn live_view_url(&self) -> Option<&str>;

    /// DevTools debugger URL, when the provider exposes one.
    fn debugger_url(&self) -> Option<&str>;

    /// Probe whether the remote context is still running. Checked lazily by
    /// the registry on use, never by background polling.
    async fn is_alive(&self) -> bool;

    /// Capture the current page as a PNG.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Close the remote context. Idempotent at the provider.
    async fn close(&self) -> Result<()>;
}

/// Opens and resumes remote browsing contexts.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Open a fresh remote session.
    async fn open(&self, opts: &EngineOptions) -> Result<Box<dyn AutomationHandle>>;

    /// Re-attach to an existing remote session. Fails if the remote session
    /// is gone or no longer running; callers must not fall back silently.
    async fn resume(&self, remote_id: &str, opts: &EngineOptions)
    -> Result<Box<dyn AutomationHandle>>;
}
