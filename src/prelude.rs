//! Convenient re-exports for the resilience primitives and gateway types
//! used across most call sites.
pub use crate::{
    adaptive::DynamicConfig,
    algebra::{CombinedLayer, FallbackLayer, ForkJoinLayer, Policy},
    backoff::{
        Backoff, BackoffError, BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff,
        MAX_BACKOFF,
    },
    bulkhead::BulkheadLayer,
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerLayer},
    jitter::Jitter,
    retry::{BuildError, RetryLayer, RetryPolicy, RetryPolicyBuilder},
    telemetry::{
        BulkheadEvent, CircuitBreakerEvent, FallbackSink, LogSink, MemorySink, MulticastSink,
        NullSink, GatewayEvent, RequestOutcome, RetryEvent, StreamingSink, TelemetrySink,
        TimeoutEvent,
    },
    timeout::TimeoutLayer,
    timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT},
    BulkheadPolicy, ResilienceError,
};
