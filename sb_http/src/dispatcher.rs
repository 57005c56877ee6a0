use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use http::HeaderValue;
use sb_ratelimit::BucketKey;
use sb_ratelimit::CallBuckets;
use sb_ratelimit::LimitType;
use sb_ratelimit::ParsedLimits;
use sb_ratelimit::QuotaTracker;
use sb_ratelimit::Reservation;
use sb_ratelimit::headers;
use secrecy::ExposeSecret;
use secrecy::SecretString;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::HttpClient;
use crate::client::HttpClientConfig;
use crate::config::DispatcherConfig;
use crate::descriptor::RequestDescriptor;
use crate::errors::DispatchError;
use crate::errors::Result;
use crate::queue::Admission;
use crate::queue::RequestQueue;
use crate::region::RegionRouter;
use crate::region::Route;
use crate::retry::Outcome;
use crate::retry::RetryPolicy;
use crate::retry::classify;
use crate::transport::ApiRequest;
use crate::transport::ApiResponse;
use crate::transport::Transport;

/// Credential header attached to every call
pub const CREDENTIAL_HEADER: &str = "x-riot-token";

/// Quota-aware front door for every API call
///
/// Each submission is routed, admitted against its app and method buckets
/// (queueing FIFO behind earlier calls when quota is exhausted), sent, and
/// reconciled with the quota headers of the response. 429s cool the bucket down
/// and retry through admission again; 5xx, timeouts and network errors retry
/// with linear backoff; everything else is returned on first occurrence.
///
/// Cloning is cheap and clones share quota state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    router: RegionRouter,
    tracker: Arc<QuotaTracker>,
    queue: Arc<RequestQueue>,
    policy: RetryPolicy,
    credential: HeaderValue,
    default_region: String,
    request_timeout: Duration,
    endpoint_override: Option<String>,
}

/// Why an attempt produced no response
enum AttemptError {
    Network(String),
    Cancelled,
}

impl Dispatcher {
    /// Create a dispatcher backed by the reqwest client
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        DispatcherBuilder::from_config(config).build()
    }

    /// Create a new dispatcher builder
    pub fn builder(api_key: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(api_key)
    }

    /// Quota state shared by every call of this dispatcher
    pub fn tracker(&self) -> &Arc<QuotaTracker> {
        &self.inner.tracker
    }

    /// Calls waiting for quota on a method bucket
    pub fn queued(&self, bucket: &BucketKey) -> usize {
        self.inner.queue.len(bucket)
    }

    /// Region used by calls without an override
    pub fn region(&self) -> &str {
        &self.inner.default_region
    }

    /// Send one call and return its JSON body
    pub async fn submit(&self, descriptor: RequestDescriptor) -> Result<Value> {
        self.submit_with_cancel(descriptor, CancellationToken::new()).await
    }

    /// Like [`submit`](Self::submit), but abandoned when `cancel` fires
    ///
    /// While queued or backing off the call returns `Cancelled` at once, without
    /// further network I/O. While a request is in flight it is allowed to finish
    /// so its quota headers are still reconciled, then the result is discarded.
    pub async fn submit_with_cancel(&self, descriptor: RequestDescriptor, cancel: CancellationToken) -> Result<Value> {
        let region = descriptor.region.as_deref().unwrap_or(&self.inner.default_region);
        let route = self.inner.router.resolve(region, descriptor.is_regional, &descriptor.method_key)?;
        let url = self.url_for(&route, &descriptor.path);

        let span = tracing::info_span!(
            "dispatch",
            method = %descriptor.method_key,
            label = %descriptor.debug_label,
            region = %region,
            route = %route.buckets.app.route,
            force = descriptor.force,
        );
        self.run(route, url, cancel).instrument(span).await
    }

    async fn run(&self, route: Route, url: String, cancel: CancellationToken) -> Result<Value> {
        let policy = &self.inner.policy;
        let bucket = route.buckets.method.clone();
        let mut attempts = 0u32;
        let mut failures = 0u32;
        let mut throttles = 0u32;

        loop {
            let Some(reservation) = self.admit(&route.buckets, &cancel).await else {
                tracing::debug!(attempts, "cancelled before sending");
                return Err(DispatchError::Cancelled { bucket, attempts });
            };

            attempts += 1;
            tracing::debug!(attempt = attempts, bucket = %bucket, "sending request");

            let response = match self.execute(&url, &cancel).await {
                Ok(response) => response,
                Err(AttemptError::Cancelled) => {
                    self.inner.tracker.release(reservation);
                    return Err(DispatchError::Cancelled { bucket, attempts });
                }
                Err(AttemptError::Network(reason)) => {
                    self.inner.tracker.release(reservation);
                    failures += 1;
                    if failures >= policy.max_attempts {
                        tracing::error!(attempt = attempts, %reason, "giving up");
                        return Err(DispatchError::UpstreamUnavailable { bucket, attempts, reason });
                    }

                    let delay = policy.backoff_for(failures);
                    tracing::warn!(attempt = attempts, %reason, delay_ms = delay.as_millis() as u64, "request failed, retrying");
                    if !Self::pause(delay, &cancel).await {
                        return Err(DispatchError::Cancelled { bucket, attempts });
                    }
                    continue;
                }
            };

            self.settle(reservation, &response.headers);
            if cancel.is_cancelled() {
                tracing::debug!(attempt = attempts, status = response.status.as_u16(), "discarding response of cancelled call");
                return Err(DispatchError::Cancelled { bucket, attempts });
            }

            let status = response.status;
            tracing::debug!(attempt = attempts, status = status.as_u16(), "response received");
            match classify(status) {
                Outcome::Success => return decode(&response, bucket, attempts),
                Outcome::Throttled => {
                    throttles += 1;
                    let cooldown = self.throttle(&route.buckets, &response.headers);
                    if throttles >= policy.rate_limit_attempts {
                        tracing::error!(attempt = attempts, "rate limit retries exhausted");
                        return Err(DispatchError::RateLimitExceeded { bucket, attempts });
                    }

                    tracing::warn!(attempt = attempts, cooldown_ms = cooldown.as_millis() as u64, "throttled, retrying after cooldown");
                    if !Self::pause(cooldown, &cancel).await {
                        return Err(DispatchError::Cancelled { bucket, attempts });
                    }
                }
                Outcome::Transient => {
                    failures += 1;
                    let reason = format!("HTTP {}", status);
                    if failures >= policy.max_attempts {
                        tracing::error!(attempt = attempts, %reason, "giving up");
                        return Err(DispatchError::UpstreamUnavailable { bucket, attempts, reason });
                    }

                    let delay = policy.backoff_for(failures);
                    tracing::warn!(attempt = attempts, %reason, delay_ms = delay.as_millis() as u64, "server error, retrying");
                    if !Self::pause(delay, &cancel).await {
                        return Err(DispatchError::Cancelled { bucket, attempts });
                    }
                }
                Outcome::NotFound => return Err(DispatchError::NotFound { bucket, attempts }),
                Outcome::Unauthorized => return Err(DispatchError::Unauthorized { bucket, attempts, status: status.as_u16() }),
                Outcome::Rejected => return Err(DispatchError::Rejected { bucket, attempts, status: status.as_u16() }),
            }
        }
    }

    /// Wait for a reservation on both buckets; `None` if cancelled first
    async fn admit(&self, buckets: &CallBuckets, cancel: &CancellationToken) -> Option<Reservation> {
        if cancel.is_cancelled() {
            return None;
        }

        match self.inner.queue.admit(buckets) {
            Admission::Ready(reservation) => Some(reservation),
            Admission::Queued(mut ticket) => {
                tracing::info!(bucket = %buckets.method, queued = self.inner.queue.len(&buckets.method), "quota exhausted, call queued");
                tokio::select! {
                    reservation = ticket.released() => reservation,
                    _ = cancel.cancelled() => None,
                }
            }
        }
    }

    async fn execute(&self, url: &str, cancel: &CancellationToken) -> std::result::Result<ApiResponse, AttemptError> {
        let mut headers = HeaderMap::new();
        headers.insert(CREDENTIAL_HEADER, self.inner.credential.clone());
        let request = ApiRequest { url: url.to_string(), headers };

        let timeout = self.inner.request_timeout;
        match tokio::time::timeout(timeout, self.inner.transport.get(&request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) if cancel.is_cancelled() => Err(AttemptError::Cancelled),
            Ok(Err(err)) => Err(AttemptError::Network(err.to_string())),
            Err(_) => Err(AttemptError::Network(format!("timed out after {}ms", timeout.as_millis()))),
        }
    }

    /// Bring both buckets in line with the server's view
    fn settle(&self, reservation: Reservation, headers: &HeaderMap) {
        let now = Instant::now();
        let parsed = match headers::parse_headers(headers, now) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed rate limit headers");
                ParsedLimits::observed_at(now)
            }
        };
        self.inner.tracker.settle(reservation, &parsed);
    }

    /// Saturate the bucket a 429 was charged to and return how long it stays closed
    fn throttle(&self, buckets: &CallBuckets, headers: &HeaderMap) -> Duration {
        let bucket = match headers::limit_type(headers) {
            Some(LimitType::Application) => &buckets.app,
            Some(LimitType::Method) | Some(LimitType::Service) | None => &buckets.method,
        };

        let policy = &self.inner.policy;
        let requested = headers::retry_after(headers)
            .or_else(|| self.inner.tracker.cooldown(bucket))
            .unwrap_or_else(|| policy.default_cooldown());
        if requested > policy.max_cooldown() {
            tracing::warn!(bucket = %bucket, requested_secs = requested.as_secs(), "capping cooldown");
        }

        let capped = requested.min(policy.max_cooldown());
        let now = Instant::now();
        let (cooldown, until) = match now.checked_add(capped) {
            Some(until) => (capped, until),
            None => {
                let fallback = policy.default_cooldown();
                (fallback, now.checked_add(fallback).unwrap_or(now))
            }
        };
        self.inner.tracker.saturate(bucket, until);
        cooldown
    }

    /// Sleep for `delay`; false if cancelled first
    async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }

    fn url_for(&self, route: &Route, path: &str) -> String {
        match &self.inner.endpoint_override {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => format!("https://{}{}", route.host, path),
        }
    }
}

fn decode(response: &ApiResponse, bucket: BucketKey, attempts: u32) -> Result<Value> {
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|source| DispatchError::InvalidBody { bucket, attempts, source })
}

/// Builder for configuring a dispatcher
pub struct DispatcherBuilder {
    api_key: SecretString,
    region: String,
    http_config: HttpClientConfig,
    retry: RetryPolicy,
    router: RegionRouter,
    endpoint_override: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    tracker: Option<Arc<QuotaTracker>>,
}

impl DispatcherBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_config(DispatcherConfig::new(api_key))
    }

    pub fn from_config(config: DispatcherConfig) -> Self {
        let http_config = HttpClientConfig { request_timeout: config.request_timeout(), ..Default::default() };
        Self {
            api_key: config.api_key,
            region: config.region,
            http_config,
            retry: config.retry,
            router: RegionRouter::default(),
            endpoint_override: config.endpoint_override,
            transport: None,
            tracker: None,
        }
    }

    /// Default region for calls without an override
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Configure HTTP client settings
    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Per-call network timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.http_config.request_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn router(mut self, router: RegionRouter) -> Self {
        self.router = router;
        self
    }

    /// Send every call to `base` instead of its routed host
    pub fn endpoint_override(mut self, base: impl Into<String>) -> Self {
        self.endpoint_override = Some(base.into());
        self
    }

    /// Replace the reqwest client
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share quota state with other dispatchers using the same key
    pub fn tracker(mut self, tracker: Arc<QuotaTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Build the dispatcher
    pub fn build(self) -> Result<Dispatcher> {
        if RegionRouter::platform(&self.region).is_none() {
            return Err(DispatchError::Configuration(format!("unknown default region {:?}", self.region)));
        }

        let mut credential = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|_| DispatchError::Configuration("API key is not a valid header value".to_string()))?;
        credential.set_sensitive(true);

        let request_timeout = self.http_config.request_timeout;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpClient::with_config(self.http_config)?),
        };
        let tracker = self.tracker.unwrap_or_default();
        let queue = Arc::new(RequestQueue::new(Arc::clone(&tracker)));

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                transport,
                router: self.router,
                tracker,
                queue,
                policy: self.retry,
                credential,
                default_region: self.region,
                request_timeout,
                endpoint_override: self.endpoint_override,
            }),
        })
    }
}
