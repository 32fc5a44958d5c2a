//! The two remote transports (spec.md §4.3–§4.4): REST for CRUD, Graph for
//! hierarchical/type features. Each is a thin typed wrapper over the same
//! underlying `reqwest::Client`; the Hybrid Client (`crate::client`) is the
//! only thing that knows how to route between them.

pub mod graph;
pub mod rest;

use std::time::Duration;

/// Individual HTTP call timeout (spec.md §5), shared by both transports.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry ceiling for idempotent GETs (REST, spec.md §4.3) and for Graph
/// mutations subject to rate limiting (spec.md §4.4).
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(200 * 2u64.pow(attempt))
}
