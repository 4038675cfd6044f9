//! Session lifecycle registry and per-session resource store.

pub mod registry;
pub mod resources;

pub use registry::{CleanupOutcome, Session, SessionRegistry};
pub use resources::{MemoryBackend, ResourceBackend, ResourceEntry, ResourceStore};
