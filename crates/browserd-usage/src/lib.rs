//! Usage metering: in-memory call/token/cost aggregation plus the
//! best-effort replay accounting fetcher.

pub mod meter;
pub mod replay;

pub use meter::UsageMeter;
pub use replay::{ReplayFetch, ReplayTotals, UsageReplayFetcher};
