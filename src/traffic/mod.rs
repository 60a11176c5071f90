//! Traffic engine
//!
//! Identifier cache, request executor, tick pacing, per-endpoint statistics
//! and the fixed-rate load driver.

pub mod driver;
pub mod executor;
pub mod ids;
pub mod listing;
pub mod pacing;
pub mod stats;
pub mod trace_context;

pub use driver::{LoadDriver, LoadPlan, MAX_CONCURRENCY, UnitResults};
pub use executor::{
    FailureKind, HttpMethod, HttpTransport, Outcome, RequestExecutor, RequestSpec, Response,
    RetryPolicy, Timeouts, Transport, TransportError,
};
pub use ids::{EntityId, EntityKind, IdCache};
pub use listing::{Identified, Listing};
pub use pacing::{StopSignal, TickPacer};
pub use stats::{EndpointStats, LatencySummary, RunReport};

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("http://api/", "/boards"), "http://api/boards");
        assert_eq!(join_url("http://api", "boards"), "http://api/boards");
        assert_eq!(
            join_url("http://api:8080/v1", "/posts/7/comments"),
            "http://api:8080/v1/posts/7/comments"
        );
    }
}
