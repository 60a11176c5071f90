//! Outgoing trace-context headers
//!
//! When propagation is enabled, every logical request carries a fresh W3C
//! `traceparent` header plus an `x-request-id`, so generated traffic can be
//! correlated with the spans and log lines the target API emits. Retries of
//! the same logical request reuse the same context.

use uuid::Uuid;

/// W3C trace-context header name
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Request ID header name
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Trace context for one logical request
#[derive(Debug, Clone, Copy)]
pub struct TraceContext {
    trace_id: Uuid,
    span_id: u64,
    request_id: Uuid,
}

impl TraceContext {
    /// Generate a new random trace context
    pub fn new() -> Self {
        let (span_id, _) = Uuid::new_v4().as_u64_pair();
        Self {
            trace_id: Uuid::new_v4(),
            // An all-zero parent id is invalid per the W3C format
            span_id: span_id.max(1),
            request_id: Uuid::new_v4(),
        }
    }

    /// 32 lowercase hex digits
    pub fn trace_id(&self) -> String {
        self.trace_id.simple().to_string()
    }

    /// Get the request ID
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// `traceparent` value: version 00, sampled flag set
    pub fn traceparent(&self) -> String {
        format!("00-{}-{:016x}-01", self.trace_id.simple(), self.span_id)
    }

    /// Merge the propagation headers into `headers`, replacing any previous values
    pub fn apply(&self, headers: &mut Vec<(String, String)>) {
        headers.retain(|(name, _)| {
            !name.eq_ignore_ascii_case(TRACEPARENT_HEADER)
                && !name.eq_ignore_ascii_case(REQUEST_ID_HEADER)
        });
        headers.push((TRACEPARENT_HEADER.to_string(), self.traceparent()));
        headers.push((REQUEST_ID_HEADER.to_string(), self.request_id.to_string()));
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
