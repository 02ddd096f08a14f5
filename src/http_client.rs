//! Universal HTTP Client (§4.1): uniform auth, retry, circuit-breaking and
//! observability around outbound adapter calls.
//!
//! The circuit breaker wraps the retry loop, so breaker failures mean
//! "this client's retry budget was exhausted," never "one attempt among
//! several failed." Built from [`crate::circuit_breaker::CircuitBreakerPolicy`]
//! and [`crate::retry::RetryPolicy`] exactly as `stack.rs` composes them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::auth::{inject, OutboundRequest, TokenCache, TokenExchanger};
use crate::backoff::Backoff;
use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::error::ResilienceError;
use crate::gateway_error::GatewayError;
use crate::model::{AuthConfig, Endpoint};
use crate::retry::RetryPolicy;
use crate::telemetry::events::GatewayEvent;
use crate::telemetry::sinks::{emit_best_effort, NullSink, TelemetrySink};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub name: String,
    pub base_url: String,
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    pub authentication: AuthConfig,
}

impl HttpClientConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, authentication: AuthConfig) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
            authentication,
        }
    }
}

/// `{data, params, headers}` — the per-call overrides accepted by [`UniversalHttpClient::request`].
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    pub data: Option<Value>,
    pub params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug)]
pub enum TransportError {
    Transport(String),
    Status { status: u16, body: Value },
}

impl TransportError {
    fn is_5xx(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if *status >= 500)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Transport(message) => write!(f, "transport error: {message}"),
            TransportError::Status { status, .. } => write!(f, "upstream returned {status}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub struct HealthCheckResult {
    pub healthy: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// One outbound client per configured service (§3 "Circuit Breaker State" is
/// per-client, keyed by service name at the registry layer above this type).
pub struct UniversalHttpClient<Sink: TelemetrySink = NullSink> {
    config: HttpClientConfig,
    http: reqwest::Client,
    breaker: CircuitBreakerPolicy,
    retry: RetryPolicy<TransportError>,
    token_cache: TokenCache,
    exchanger: Option<Arc<dyn TokenExchanger>>,
    sink: Sink,
    request_seq: AtomicU64,
}

impl UniversalHttpClient<NullSink> {
    pub fn new(config: HttpClientConfig, exchanger: Option<Arc<dyn TokenExchanger>>) -> Self {
        Self::with_sink(config, exchanger, NullSink)
    }
}

impl<Sink: TelemetrySink> UniversalHttpClient<Sink> {
    pub fn with_sink(
        config: HttpClientConfig,
        exchanger: Option<Arc<dyn TokenExchanger>>,
        sink: Sink,
    ) -> Self {
        let retry_delay = config.retry_delay;
        let retry_attempts = config.retry_attempts;
        let retry = RetryPolicy::builder()
            .max_attempts(retry_attempts)
            .expect("retry_attempts must be nonzero")
            .backoff(Backoff::exponential(retry_delay))
            .should_retry(|e: &TransportError| matches!(e, TransportError::Transport(_)) || e.is_5xx())
            .build();

        Self {
            http: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .expect("reqwest client builder never fails for this configuration"),
            breaker: CircuitBreakerPolicy::new(5, Duration::from_secs(60)),
            retry,
            token_cache: TokenCache::new(),
            exchanger,
            sink,
            request_seq: AtomicU64::new(0),
            config,
        }
    }

    /// Share a breaker (e.g. one pulled from [`crate::circuit_breaker_registry::CircuitBreakerRegistry`])
    /// instead of the fresh per-client one `with_sink` constructs, so the
    /// facade's health/readiness views and this client observe the same
    /// per-service breaker state (§3).
    pub fn with_breaker(mut self, breaker: CircuitBreakerPolicy) -> Self {
        self.breaker = breaker;
        self
    }

    /// `request({path, method}, {data, params, headers})` (§4.1).
    pub async fn request(
        &self,
        path: &str,
        method: &str,
        options: RequestOptions,
    ) -> Result<Value, GatewayError> {
        let method = method.to_string();
        let path = path.to_string();
        let service = self.config.name.clone();

        self.emit(GatewayEvent::Http {
            service: service.clone(),
            method: method.clone(),
            url: format!("{}{}", self.config.base_url, path),
        })
        .await;

        // A 4xx is a client error, not a breaker failure (§4.1): surface it to
        // the breaker as `Ok` so `on_failure()` never fires for it, then
        // unwrap the disguise once we're back on this side of the breaker.
        let breaker_result = self
            .breaker
            .execute(|| {
                let method = method.clone();
                let path = path.clone();
                let options = options.clone();
                async move {
                    match self.try_with_retry(&method, &path, &options).await {
                        Err(ResilienceError::Inner(TransportError::Status { status, body }))
                            if (400..500).contains(&status) =>
                        {
                            Ok(Err(TransportError::Status { status, body }))
                        }
                        Err(e) => Err(e),
                        Ok(value) => Ok(Ok(value)),
                    }
                }
            })
            .await;

        match breaker_result {
            Ok(Ok(value)) => {
                self.emit(GatewayEvent::HttpResponse { service, status: 200 }).await;
                Ok(value)
            }
            Ok(Err(TransportError::Status { status, body })) => {
                self.emit(GatewayEvent::HttpError { service: service.clone(), kind: "transport".into(), message: format!("upstream returned {status}") }).await;
                Err(GatewayError::Upstream4xx { status, body })
            }
            Ok(Err(TransportError::Transport(message))) => {
                self.emit(GatewayEvent::HttpError { service: service.clone(), kind: "transport".into(), message: message.clone() }).await;
                Err(GatewayError::ExecutionError { adapter: service, tool: path, message })
            }
            Err(ResilienceError::CircuitOpen { failure_count, .. }) => {
                self.emit(GatewayEvent::CircuitBreakerOpen { service: service.clone(), failures: failure_count }).await;
                Err(GatewayError::CircuitOpen { service, failures: failure_count })
            }
            Err(ResilienceError::RetryExhausted { attempts, failures }) => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                self.emit(GatewayEvent::HttpError { service: service.clone(), kind: "retry_exhausted".into(), message: last.clone() }).await;
                Err(GatewayError::RetryExhausted { service, attempts, last })
            }
            Err(ResilienceError::Inner(e)) => {
                self.emit(GatewayEvent::HttpError { service: service.clone(), kind: "transport".into(), message: e.to_string() }).await;
                match e {
                    TransportError::Status { status, body } => Err(GatewayError::Upstream5xx { status, body }),
                    TransportError::Transport(message) => {
                        Err(GatewayError::ExecutionError { adapter: service, tool: path, message })
                    }
                }
            }
            Err(other) => Err(GatewayError::ExecutionError {
                adapter: service,
                tool: path,
                message: other.to_string(),
            }),
        }
    }

    async fn try_with_retry(
        &self,
        method: &str,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Value, ResilienceError<TransportError>> {
        self.retry.execute(|| self.send_once(method, path, options)).await
    }

    async fn send_once(
        &self,
        method: &str,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Value, ResilienceError<TransportError>> {
        let mut outbound = OutboundRequest {
            method: method.to_string(),
            path: path.to_string(),
            body: options.data.as_ref().map(|d| d.to_string().into_bytes()).unwrap_or_default(),
            ..Default::default()
        };
        outbound.headers.extend(options.headers.clone());

        inject(&self.config.authentication, &mut outbound, &self.token_cache, self.exchanger.as_deref())
            .await
            .map_err(|e| ResilienceError::Inner(TransportError::Transport(e.to_string())))?;

        let url = format!("{}{}", self.config.base_url, path);
        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|e| ResilienceError::Inner(TransportError::Transport(e.to_string())))?;

        let mut builder = self.http.request(http_method, &url).query(&options.params);
        for (k, v) in &outbound.headers {
            builder = builder.header(k, v);
        }
        if let Some(data) = &options.data {
            builder = builder.json(data);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ResilienceError::Inner(TransportError::Transport(e.to_string())))?;

        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .unwrap_or(Value::Null);

        if status >= 400 {
            return Err(ResilienceError::Inner(TransportError::Status { status, body }));
        }
        Ok(body)
    }

    /// `healthCheck()` (§4.1).
    pub async fn health_check(&self) -> HealthCheckResult {
        match self.request("/", "GET", RequestOptions::default()).await {
            Ok(data) => HealthCheckResult { healthy: true, data: Some(data), error: None },
            Err(e) => HealthCheckResult { healthy: false, data: None, error: Some(e.to_string()) },
        }
    }

    /// `generateMethods(endpoints)` — bind path placeholders in a named operation (§4.1).
    pub fn generate_methods(&self, endpoints: &[Endpoint]) -> HashMap<String, BoundEndpoint> {
        endpoints
            .iter()
            .map(|e| (e.name.clone(), BoundEndpoint { method: e.method.clone(), path_template: e.path.clone() }))
            .collect()
    }

    async fn emit(&self, event: GatewayEvent) {
        emit_best_effort(self.sink.clone(), event).await;
        self.request_seq.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct BoundEndpoint {
    pub method: String,
    pub path_template: String,
}

impl BoundEndpoint {
    /// Substitute `{placeholder}` segments with values from `params`.
    pub fn bind(&self, params: &HashMap<String, String>) -> String {
        let mut path = self.path_template.clone();
        for (k, v) in params {
            path = path.replace(&format!("{{{k}}}"), v);
        }
        path
    }
}
