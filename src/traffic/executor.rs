//! Request execution with bounded retries
//!
//! `RequestExecutor::execute` sends one logical request and always returns an
//! [`Outcome`]; it never panics and never propagates an error. Only transport
//! failures (connection refused, connect/read timeout) are retried. A response
//! with status >= 400 is a `Success` carrying that status.
//!
//! Backoff is linear: after failed attempt `k` the executor sleeps
//! `retry_delay * k` before attempt `k + 1`. There is no sleep after the last
//! attempt.

use crate::config::HttpConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::{Metrics, OutcomeClass};
use crate::traffic::trace_context::TraceContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts per logical request
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay between attempts (multiplied by the attempt number)
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Response header carrying the server's trace id
pub const SERVER_TRACE_HEADER: &str = "x-trace-id";
/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry configuration for one executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per logical request (at least 1)
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    ///
    /// # Errors
    /// Returns an error if `max_retries` is 0 (at least 1 attempt is required)
    pub fn new(max_retries: u32, retry_delay: Duration) -> Result<Self, &'static str> {
        if max_retries == 0 {
            return Err("max_retries must be at least 1");
        }
        Ok(Self {
            max_retries,
            retry_delay,
        })
    }

    /// Total attempts per logical request
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Delay to wait after failed attempt `attempt` (1-based)
    ///
    /// With the default 500ms delay: 500ms after attempt 1, 1s after attempt 2.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Connect and read timeouts applied to every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// HTTP methods the generator issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!(
                "unsupported HTTP method '{}' (expected GET, POST, PUT or DELETE)",
                s
            )),
        }
    }
}

/// One logical request
///
/// `label` is the route template used for statistics and metrics
/// (`/posts/{id}`); it defaults to the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub label: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method,
            label: url.clone(),
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, url).with_body(body)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A response received from the target, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub elapsed: Duration,
    pub body: String,
    /// Trace id sent with the request, when propagation is enabled
    pub trace_id: Option<String>,
    /// Trace id the server reported in its `X-Trace-ID` header
    pub server_trace_id: Option<String>,
    /// Attempt that produced this response (1-based)
    pub attempts: u32,
}

impl Response {
    pub fn new(status: u16, elapsed: Duration, body: impl Into<String>) -> Self {
        Self {
            status,
            elapsed,
            body: body.into(),
            trace_id: None,
            server_trace_id: None,
            attempts: 1,
        }
    }

    pub fn with_server_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.server_trace_id = Some(trace_id.into());
        self
    }

    /// Trace id to look up in the tracing backend: the server's, else ours
    pub fn lookup_trace_id(&self) -> Option<&str> {
        self.server_trace_id
            .as_deref()
            .or(self.trace_id.as_deref())
    }

    /// Status >= 400
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Status in 200..300
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_micros() as f64 / 1000.0
    }
}

/// Transport failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused or reset
    Connect,
    /// Connect or read timeout
    Timeout,
    /// The request could not be built (bad URL, bad header)
    InvalidRequest,
    /// The response body could not be read
    Body,
    /// Redirect loops and anything unclassified
    Other,
}

impl FailureKind {
    /// Only connection and timeout failures are retried
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Connect | FailureKind::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connect => "connect",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Body => "body",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that produced no response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
    /// Attempts made before giving up
    pub attempts: u32,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 1,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure after {} attempt(s): {}",
            self.kind, self.attempts, self.message
        )
    }
}

/// Result of one logical request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A response was received (any status)
    Success(Response),
    /// Transport kept failing until retries were exhausted
    TransientFailure(TransportError),
    /// Non-retryable transport failure
    PermanentFailure(TransportError),
}

impl Outcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Outcome::Success(response) => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// Status >= 400 or no response at all
    pub fn is_error(&self) -> bool {
        match self {
            Outcome::Success(response) => response.is_error(),
            _ => true,
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        !matches!(self, Outcome::Success(_))
    }

    /// Response with a 2xx status, if any
    pub fn success_response(&self) -> Option<&Response> {
        self.response().filter(|r| r.is_success())
    }

    pub fn class(&self) -> OutcomeClass {
        match self {
            Outcome::Success(response) if response.is_error() => OutcomeClass::HttpError,
            Outcome::Success(_) => OutcomeClass::Success,
            _ => OutcomeClass::TransportFailure,
        }
    }
}

/// Sends a single attempt of a request
///
/// Implementations must not retry; `RequestExecutor` owns the retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<Response, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the given connect/read timeouts
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the TLS backend cannot be initialized
    pub fn new(timeouts: Timeouts) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .user_agent(concat!("loadpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_builder() {
        FailureKind::InvalidRequest
    } else if err.is_redirect() {
        FailureKind::Other
    } else if err.is_body() || err.is_decode() {
        FailureKind::Body
    } else if err.is_connect() || err.is_request() {
        FailureKind::Connect
    } else {
        FailureKind::Other
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::new(classify(&err), err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestSpec) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = tokio::time::Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let server_trace_id = response
            .headers()
            .get(SERVER_TRACE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        let mut received = Response::new(status, started.elapsed(), body);
        received.server_trace_id = server_trace_id;
        Ok(received)
    }
}

/// Executes logical requests with the retry policy and optional trace propagation
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    propagate_trace: bool,
    metrics: Option<Arc<Metrics>>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("policy", &self.policy)
            .field("propagate_trace", &self.propagate_trace)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            propagate_trace: false,
            metrics: None,
        }
    }

    /// Build an executor over `HttpTransport` from the `[http]` section
    pub fn from_config(http: &HttpConfig) -> AppResult<Self> {
        let transport = HttpTransport::new(http.timeouts())?;
        let policy = http.retry_policy()?;
        Ok(Self::new(Arc::new(transport), policy)
            .with_trace_propagation(http.propagate_trace_context))
    }

    pub fn with_trace_propagation(mut self, enabled: bool) -> Self {
        self.propagate_trace = enabled;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Same transport and settings with a different retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request`, retrying transport failures per the policy
    pub async fn execute(&self, request: &RequestSpec) -> Outcome {
        let (request, trace_id) = if self.propagate_trace {
            let context = TraceContext::new();
            let mut traced = request.clone();
            context.apply(&mut traced.headers);
            (Cow::Owned(traced), Some(context.trace_id()))
        } else {
            (Cow::Borrowed(request), None)
        };

        let max_retries = self.policy.max_retries();
        let mut attempt = 1;

        let outcome = loop {
            tracing::trace!(
                endpoint = %request.label,
                method = %request.method,
                attempt,
                max_retries,
                "Sending request"
            );

            match self.transport.send(&request).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    response.trace_id = trace_id;
                    tracing::debug!(
                        endpoint = %request.label,
                        status = response.status,
                        elapsed_ms = response.elapsed.as_millis() as u64,
                        attempt,
                        "Request completed"
                    );
                    break Outcome::Success(response);
                }
                Err(mut err) => {
                    err.attempts = attempt;

                    if !err.kind.is_transient() {
                        tracing::warn!(
                            endpoint = %request.label,
                            url = %request.url,
                            kind = %err.kind,
                            error = %err.message,
                            "Request failed with a non-retryable error"
                        );
                        break Outcome::PermanentFailure(err);
                    }

                    if attempt >= max_retries {
                        tracing::warn!(
                            endpoint = %request.label,
                            url = %request.url,
                            kind = %err.kind,
                            error = %err.message,
                            attempts = attempt,
                            "Request failed after exhausting retries"
                        );
                        break Outcome::TransientFailure(err);
                    }

                    let delay = self.policy.backoff(attempt);
                    tracing::debug!(
                        endpoint = %request.label,
                        kind = %err.kind,
                        error = %err.message,
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transport failure, retrying"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry(&request.label);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        self.record(&request.label, &outcome);
        outcome
    }

    fn record(&self, label: &str, outcome: &Outcome) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.record_request(label, outcome.class());
        if let Some(response) = outcome.response()
            && let Err(e) = metrics.record_duration(label, response.elapsed_ms())
        {
            tracing::warn!(endpoint = %label, error = %e, "Failed to record request duration");
        }
    }
}
