//! Registry of per-service circuit breakers (§3 "Circuit Breaker State" is
//! keyed by service name, shared between the Universal HTTP Client and the
//! vendor health check consulted by [`crate::vendor::VendorAbstraction`]).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreakerPolicy, CircuitState};

/// Registry keyed by service name; lazily creates a breaker with the given
/// defaults the first time a service is looked up.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreakerPolicy>>>,
    failure_threshold: usize,
    recovery_timeout: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Fetch the breaker for `service`, creating one with the registry's
    /// defaults if this is the first time it's been seen.
    pub fn get_or_create(&self, service: &str) -> CircuitBreakerPolicy {
        let mut breakers = self.inner.lock().unwrap();
        breakers
            .entry(service.to_string())
            .or_insert_with(|| CircuitBreakerPolicy::new(self.failure_threshold, self.recovery_timeout))
            .clone()
    }

    /// Register an already-configured breaker under `service`, overwriting
    /// any default one created by a prior [`Self::get_or_create`] call.
    pub fn register(&self, service: impl Into<String>, breaker: CircuitBreakerPolicy) {
        self.inner.lock().unwrap().insert(service.into(), breaker);
    }

    pub fn state_of(&self, service: &str) -> Option<CircuitState> {
        self.inner.lock().unwrap().get(service).map(|b| b.current_state())
    }

    /// A service is "healthy" for vendor-selection purposes (§4.4.1) when its
    /// breaker is closed or half-open; an open breaker excludes it.
    pub fn is_healthy(&self, service: &str) -> bool {
        match self.state_of(service) {
            Some(CircuitState::Open) => false,
            Some(_) | None => true,
        }
    }

    pub fn reset(&self, service: &str) -> Result<(), String> {
        match self.inner.lock().unwrap().get(service) {
            Some(breaker) => {
                breaker.reset();
                Ok(())
            }
            None => Err(format!("no breaker registered for service: {service}")),
        }
    }

    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let breakers = self.inner.lock().unwrap();
        let mut entries: Vec<(String, CircuitState)> =
            breakers.iter().map(|(k, v)| (k.clone(), v.current_state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
