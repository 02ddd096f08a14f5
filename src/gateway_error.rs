//! Crate-wide error type for the gateway surface.
//!
//! Internal resilience primitives (retry, circuit breaker, bulkhead, timeout)
//! keep their own [`crate::ResilienceError`]; this type is the one surface
//! the facade, discovery layer, and compliance pipeline actually return, and
//! the one place every error kind in the gateway is enumerated.

use serde::Serialize;
use std::fmt;

/// Every error kind the gateway surface can produce.
#[derive(Debug)]
#[non_exhaustive]
pub enum GatewayError {
    InvalidToolId { tool_id: String },
    InvalidToolIdFormat { tool_id: String },
    ToolNotFound { tool_id: String },
    AdapterNotFound { adapter_id: String },
    AdapterNotExecutable { adapter_id: String },
    MockAdapter { adapter_id: String },
    MissingRequiredParam { param: String },
    InvalidParamType { param: String, expected: &'static str, received: String },
    InvalidParamValue { param: String, reason: String },
    InvalidParams { reason: String },
    IdempotencyRequired,
    ConfirmationRequired,
    CircuitOpen { service: String, failures: usize },
    RetryExhausted { service: String, attempts: usize, last: String },
    ExecutionError { adapter: String, tool: String, message: String },
    ComplianceViolation { regulation: &'static str, details: String },
    GdprConsentRequired { field: String },
    ScaRequired { amount: f64, threshold: f64 },
    SchemaViolation { reason: String },
    AbstractionNotFound { category: String, operation: String },
    NoVendorAvailable { category: String },
    AuthFailed { reason: String },
    RateLimited { retry_after_secs: u64 },
    Timeout { elapsed_ms: u64, limit_ms: u64 },
    Upstream4xx { status: u16, body: serde_json::Value },
    Upstream5xx { status: u16, body: serde_json::Value },

    /// Ambient: configuration could not be loaded.
    Config(String),
    /// Ambient: I/O failure outside the request path (audit sink, catalog load).
    Io(String),
    /// Ambient: (de)serialization failure.
    Serialization(String),
}

impl GatewayError {
    /// Stable machine-readable code, used in both the HTTP and MCP payloads.
    pub fn code(&self) -> &'static str {
        use GatewayError::*;
        match self {
            InvalidToolId { .. } => "INVALID_TOOL_ID",
            InvalidToolIdFormat { .. } => "INVALID_TOOL_ID_FORMAT",
            ToolNotFound { .. } => "TOOL_NOT_FOUND",
            AdapterNotFound { .. } => "ADAPTER_NOT_FOUND",
            AdapterNotExecutable { .. } => "ADAPTER_NOT_EXECUTABLE",
            MockAdapter { .. } => "MOCK_ADAPTER",
            MissingRequiredParam { .. } => "MISSING_REQUIRED_PARAM",
            InvalidParamType { .. } => "INVALID_PARAM_TYPE",
            InvalidParamValue { .. } => "INVALID_PARAM_VALUE",
            InvalidParams { .. } => "INVALID_PARAMS",
            IdempotencyRequired => "IDEMPOTENCY_REQUIRED",
            ConfirmationRequired => "CONFIRMATION_REQUIRED",
            CircuitOpen { .. } => "CIRCUIT_OPEN",
            RetryExhausted { .. } => "RETRY_EXHAUSTED",
            ExecutionError { .. } => "EXECUTION_ERROR",
            ComplianceViolation { .. } => "COMPLIANCE_VIOLATION",
            GdprConsentRequired { .. } => "GDPR_CONSENT_REQUIRED",
            ScaRequired { .. } => "SCA_REQUIRED",
            SchemaViolation { .. } => "SCHEMA_VIOLATION",
            AbstractionNotFound { .. } => "ABSTRACTION_NOT_FOUND",
            NoVendorAvailable { .. } => "NO_VENDOR_AVAILABLE",
            AuthFailed { .. } => "AUTH_FAILED",
            RateLimited { .. } => "RATE_LIMITED",
            Timeout { .. } => "TIMEOUT",
            Upstream4xx { .. } => "UPSTREAM_4XX",
            Upstream5xx { .. } => "UPSTREAM_5XX",
            Config(_) => "CONFIG_ERROR",
            Io(_) => "IO_ERROR",
            Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// HTTP status this error should render as.
    pub fn status_code(&self) -> u16 {
        use GatewayError::*;
        match self {
            InvalidToolId { .. }
            | InvalidToolIdFormat { .. }
            | MissingRequiredParam { .. }
            | InvalidParamType { .. }
            | InvalidParamValue { .. }
            | InvalidParams { .. }
            | SchemaViolation { .. } => 400,
            AuthFailed { .. } => 401,
            IdempotencyRequired | ConfirmationRequired => 412,
            ToolNotFound { .. } | AdapterNotFound { .. } | AbstractionNotFound { .. } => 404,
            MockAdapter { .. } | AdapterNotExecutable { .. } => 409,
            ComplianceViolation { .. } | GdprConsentRequired { .. } | ScaRequired { .. } => 403,
            RateLimited { .. } => 429,
            CircuitOpen { .. } => 503,
            NoVendorAvailable { .. } => 503,
            Timeout { .. } => 504,
            RetryExhausted { .. } | ExecutionError { .. } | Upstream5xx { .. } => 502,
            Upstream4xx { status, .. } => *status,
            Config(_) | Io(_) | Serialization(_) => 500,
        }
    }

    /// Render the canonical HTTP error body: `{error, message?, requestId, ts, details?}`.
    pub fn to_http_body(&self, request_id: &str, ts: i64) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
            "requestId": request_id,
            "ts": ts,
            "details": self.details(),
        })
    }

    /// Render the MCP payload shape: `{success:false, error:{code, message, ...}}`.
    pub fn to_mcp_body(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            },
        })
    }

    fn details(&self) -> Option<serde_json::Value> {
        use GatewayError::*;
        match self {
            InvalidParamType { param, expected, received } => Some(serde_json::json!({
                "param": param, "expected": expected, "received": received,
            })),
            CircuitOpen { service, failures } => {
                Some(serde_json::json!({ "service": service, "failures": failures }))
            }
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GatewayError::*;
        match self {
            InvalidToolId { tool_id } => write!(f, "invalid tool id: {tool_id}"),
            InvalidToolIdFormat { tool_id } => {
                write!(f, "tool id does not match ^[a-z0-9-]+:[a-z0-9-]+$: {tool_id}")
            }
            ToolNotFound { tool_id } => write!(f, "tool not found: {tool_id}"),
            AdapterNotFound { adapter_id } => write!(f, "adapter not found: {adapter_id}"),
            AdapterNotExecutable { adapter_id } => {
                write!(f, "adapter is not executable: {adapter_id}")
            }
            MockAdapter { adapter_id } => write!(f, "adapter is a mock: {adapter_id}"),
            MissingRequiredParam { param } => write!(f, "missing required param: {param}"),
            InvalidParamType { param, expected, received } => {
                write!(f, "param {param} has wrong type: expected {expected}, got {received}")
            }
            InvalidParamValue { param, reason } => {
                write!(f, "invalid value for param {param}: {reason}")
            }
            InvalidParams { reason } => write!(f, "invalid params: {reason}"),
            IdempotencyRequired => write!(f, "an idempotency_key is required for this operation"),
            ConfirmationRequired => write!(f, "confirmed:true is required for this operation"),
            CircuitOpen { service, failures } => {
                write!(f, "circuit open for {service} ({failures} failures)")
            }
            RetryExhausted { service, attempts, last } => {
                write!(f, "retries exhausted for {service} after {attempts} attempts: {last}")
            }
            ExecutionError { adapter, tool, message } => {
                write!(f, "execution failed in {adapter}:{tool}: {message}")
            }
            ComplianceViolation { regulation, details } => {
                write!(f, "{regulation} compliance violation: {details}")
            }
            GdprConsentRequired { field } => {
                write!(f, "field {field} requires consent but none was provided")
            }
            ScaRequired { amount, threshold } => write!(
                f,
                "strong customer authentication required: amount {amount} exceeds threshold {threshold}"
            ),
            SchemaViolation { reason } => write!(f, "schema violation: {reason}"),
            AbstractionNotFound { category, operation } => {
                write!(f, "no vendor abstraction for {category}.{operation}")
            }
            NoVendorAvailable { category } => write!(f, "no healthy vendor available for {category}"),
            AuthFailed { reason } => write!(f, "authentication failed: {reason}"),
            RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {retry_after_secs}s")
            }
            Timeout { elapsed_ms, limit_ms } => {
                write!(f, "timed out after {elapsed_ms}ms (limit {limit_ms}ms)")
            }
            Upstream4xx { status, .. } => write!(f, "upstream returned {status}"),
            Upstream5xx { status, .. } => write!(f, "upstream returned {status}"),
            Config(msg) => write!(f, "configuration error: {msg}"),
            Io(msg) => write!(f, "io error: {msg}"),
            Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// `{error, requestId, ts}` (and `details` when present) — shared by HTTP and MCP renderers.
#[derive(Serialize)]
pub struct ErrorEnvelope {
    pub error: &'static str,
    pub message: String,
    pub request_id: String,
    pub ts: i64,
}
