//! Prometheus metrics sink for `gateway-core`.
//! Bring your own `prometheus::Registry`; counters are registered and incremented.

use gateway_core::telemetry::events::{
    BulkheadEvent, CircuitBreakerEvent, GatewayEvent, RequestOutcome, RetryEvent, TimeoutEvent,
};
use gateway_core::telemetry::sinks::TelemetrySink;
use prometheus::{IntCounterVec, Registry};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::future::{ready, Ready};

#[derive(Clone, Debug)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    events: IntCounterVec,
    http: IntCounterVec,
}

impl PrometheusSink {
    /// Create a sink and register counters into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let events = IntCounterVec::new(
            prometheus::Opts::new("gateway_policy_events_total", "Resilience policy events"),
            &["policy", "event"],
        )?;
        registry.register(Box::new(events.clone()))?;

        let http = IntCounterVec::new(
            prometheus::Opts::new("gateway_http_events_total", "Outbound HTTP client events"),
            &["service", "event"],
        )?;
        registry.register(Box::new(http.clone()))?;

        Ok(Self { registry, events, http })
    }

    /// Expose the registry for HTTP scraping (`GET /metrics`).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl tower_service::Service<GatewayEvent> for PrometheusSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: GatewayEvent) -> Self::Future {
        match &event {
            GatewayEvent::Retry(r) => {
                let label = match r {
                    RetryEvent::Attempt { .. } => "attempt",
                    RetryEvent::Exhausted { .. } => "exhausted",
                };
                self.events.with_label_values(&["retry", label]).inc();
            }
            GatewayEvent::CircuitBreaker(c) => {
                let label = match c {
                    CircuitBreakerEvent::Opened { .. } => "opened",
                    CircuitBreakerEvent::HalfOpen => "half_open",
                    CircuitBreakerEvent::Closed => "closed",
                };
                self.events.with_label_values(&["circuit_breaker", label]).inc();
            }
            GatewayEvent::Bulkhead(b) => {
                let label = match b {
                    BulkheadEvent::Acquired { .. } => "acquired",
                    BulkheadEvent::Rejected { .. } => "rejected",
                };
                self.events.with_label_values(&["bulkhead", label]).inc();
            }
            GatewayEvent::Timeout(TimeoutEvent::Occurred { .. }) => {
                self.events.with_label_values(&["timeout", "occurred"]).inc();
            }
            GatewayEvent::Request(r) => {
                let label = match r {
                    RequestOutcome::Success { .. } => "success",
                    RequestOutcome::Failure { .. } => "failure",
                };
                self.events.with_label_values(&["request", label]).inc();
            }
            GatewayEvent::Http { service, .. } => {
                self.http.with_label_values(&[service, "request"]).inc();
            }
            GatewayEvent::HttpResponse { service, .. } => {
                self.http.with_label_values(&[service, "response"]).inc();
            }
            GatewayEvent::HttpError { service, .. } => {
                self.http.with_label_values(&[service, "error"]).inc();
            }
            GatewayEvent::CircuitBreakerOpen { service, .. } => {
                self.http.with_label_values(&[service, "circuit_open"]).inc();
            }
            GatewayEvent::AuditLogged { .. } => {
                self.events.with_label_values(&["audit", "logged"]).inc();
            }
        }
        ready(Ok(()))
    }
}

impl TelemetrySink for PrometheusSink {
    type SinkError = Infallible;
}
