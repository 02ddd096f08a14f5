//! Gateway Facade (§4.6): the `axum` HTTP surface plus the MCP meta-tool
//! surface, both backed by the same adapter registry, vendor abstraction,
//! and compliance pipeline. Cross-cutting concerns (request ID, rate
//! limiting) are layered around the router the same way the resilience
//! stack layers `tower::Layer`s around a transport (§4.1, §4.6.1).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Extension, Json, Router};
use serde_json::Value;

use crate::auth::TokenExchanger;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::compliance::{AuditLog, AuditSink, ComplianceCache};
use crate::config::{EncryptionKeySource, GatewayConfig};
use crate::discovery::{
    adapters_catalog, dispatch, execute_gate, gateway_intent, reference as reference_doc, tools_for_adapter,
    ExecuteOptions, ExecutionGate, OperationRegistry,
};
use crate::gateway_error::GatewayError;
use crate::http_client::{HttpClientConfig, RequestOptions, UniversalHttpClient};
use crate::model::ServiceDescriptor;
use crate::rate_limit::store::InMemoryTokenStore;
use crate::rate_limit::strategies::KeyedFixedWindow;
use crate::registry::{Adapter, AdapterRegistry, CallContext, NameCollision};
use crate::telemetry::events::GatewayEvent;
use crate::telemetry::sinks::{emit_best_effort, NullSink, TelemetrySink};
use crate::vendor::VendorAbstraction;

type WebhookHandler = dyn Fn(Value, HashMap<String, String>) -> Result<Value, GatewayError> + Send + Sync;

struct Inner<Sink: TelemetrySink> {
    config: GatewayConfig,
    adapters: AdapterRegistry,
    operations: RwLock<Arc<OperationRegistry>>,
    vendors: VendorAbstraction,
    compliance: ComplianceCache,
    audit: AuditLog,
    breakers: CircuitBreakerRegistry,
    services: RwLock<HashMap<String, ServiceDescriptor>>,
    clients: RwLock<HashMap<String, Arc<UniversalHttpClient<Sink>>>>,
    webhooks: RwLock<HashMap<String, Arc<WebhookHandler>>>,
    rate_limiter: KeyedFixedWindow<InMemoryTokenStore>,
    sink: Sink,
    started_at: i64,
}

/// Shared, cheaply-cloneable facade state (§5 "build-once, read-many").
pub struct GatewayState<Sink: TelemetrySink = NullSink> {
    inner: Arc<Inner<Sink>>,
}

impl<Sink: TelemetrySink> Clone for GatewayState<Sink> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl GatewayState<NullSink> {
    pub fn new(config: GatewayConfig, audit_sink: Box<dyn AuditSink>) -> Self {
        Self::with_sink(config, audit_sink, NullSink)
    }
}

impl<Sink: TelemetrySink> GatewayState<Sink> {
    pub fn with_sink(config: GatewayConfig, audit_sink: Box<dyn AuditSink>, sink: Sink) -> Self {
        let rate_limiter = KeyedFixedWindow::new(
            InMemoryTokenStore::new(),
            Duration::from_secs(config.rate_limit.window_secs),
            config.rate_limit.max_requests,
        );
        let adapters = AdapterRegistry::new();
        let operations = OperationRegistry::build(&adapters);
        Self {
            inner: Arc::new(Inner {
                config,
                adapters,
                operations: RwLock::new(Arc::new(operations)),
                vendors: VendorAbstraction::new(),
                compliance: ComplianceCache::new(),
                audit: AuditLog::new(audit_sink),
                breakers: CircuitBreakerRegistry::new(5, Duration::from_secs(60)),
                services: RwLock::new(HashMap::new()),
                clients: RwLock::new(HashMap::new()),
                webhooks: RwLock::new(HashMap::new()),
                rate_limiter,
                sink,
                started_at: now_epoch_secs(),
            }),
        }
    }

    pub fn vendors(&self) -> &VendorAbstraction {
        &self.inner.vendors
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.inner.adapters
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.inner.breakers
    }

    /// Register an adapter and rebuild the operation registry the five
    /// meta-tools search over (§4.3.1 "rebuilt whenever adapters change").
    pub async fn register_adapter(&self, adapter: Arc<dyn Adapter>) -> Result<(), NameCollision> {
        self.inner.adapters.register(adapter).await?;
        let rebuilt = OperationRegistry::build(&self.inner.adapters);
        *self.inner.operations.write().unwrap() = Arc::new(rebuilt);
        Ok(())
    }

    /// Register a proxied service: validates the descriptor, pulls a shared
    /// breaker from the registry, and builds the outbound client (§4.6
    /// `/api/services/{name}/*`).
    pub fn register_service(
        &self,
        descriptor: ServiceDescriptor,
        exchanger: Option<Arc<dyn TokenExchanger>>,
    ) -> Result<(), GatewayError> {
        descriptor.validate().map_err(|e| GatewayError::Config(e.to_string()))?;

        let base_url = self
            .inner
            .config
            .service_base_url_overrides
            .get(&descriptor.name)
            .cloned()
            .unwrap_or_else(|| descriptor.base_url.clone());

        let breaker = self.inner.breakers.get_or_create(&descriptor.name);
        let client_config = HttpClientConfig::new(descriptor.name.clone(), base_url, descriptor.authentication.clone());
        let client = UniversalHttpClient::with_sink(client_config, exchanger, self.inner.sink.clone()).with_breaker(breaker);

        self.inner.clients.write().unwrap().insert(descriptor.name.clone(), Arc::new(client));
        self.inner.services.write().unwrap().insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn register_webhook(
        &self,
        service: impl Into<String>,
        handler: impl Fn(Value, HashMap<String, String>) -> Result<Value, GatewayError> + Send + Sync + 'static,
    ) {
        self.inner.webhooks.write().unwrap().insert(service.into(), Arc::new(handler));
    }

    fn service(&self, name: &str) -> Option<ServiceDescriptor> {
        self.inner.services.read().unwrap().get(name).cloned()
    }

    fn client(&self, name: &str) -> Option<Arc<UniversalHttpClient<Sink>>> {
        self.inner.clients.read().unwrap().get(name).cloned()
    }

    fn operations(&self) -> Arc<OperationRegistry> {
        self.inner.operations.read().unwrap().clone()
    }

    async fn audit(&self, action: &str, details: Value) {
        if let Ok(entry) = self.inner.audit.append(action, details, now_epoch_secs()) {
            emit_best_effort(self.inner.sink.clone(), GatewayEvent::AuditLogged { entry_id: entry.id }).await;
        }
    }

    /// Resolve the configured `ENCRYPTION_KEY` into 32 raw bytes (§4.5.1),
    /// stretching a passphrase with `pseudonym_salt` if that's what was
    /// configured. `None` if no key was configured at all.
    fn encryption_key(&self) -> Option<[u8; 32]> {
        let source = self.inner.config.encryption_key.as_ref()?;
        match &source.0 {
            EncryptionKeySource::Hex32(bytes) => Some(*bytes),
            EncryptionKeySource::Passphrase(passphrase) => {
                crate::compliance::stretch_passphrase(passphrase, self.inner.config.pseudonym_salt.as_bytes()).ok()
            }
        }
    }
}

fn now_epoch_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Build the full router: HTTP proxy surface, MCP meta-tool surface, and the
/// request-ID/rate-limit middleware wrapped around both (§4.6.1).
///
/// Serve with `into_make_service_with_connect_info::<std::net::SocketAddr>()`
/// so the rate limiter's per-remote-address key has something to key on.
pub fn router<Sink: TelemetrySink>(state: GatewayState<Sink>) -> Router {
    Router::new()
        .route("/health", get(health::<Sink>))
        .route("/ready", get(ready::<Sink>))
        .route("/metrics", get(metrics::<Sink>))
        .route("/api/services", get(list_services::<Sink>))
        .route("/api/services/:name", get(get_service::<Sink>))
        .route("/api/services/:name/activate", post(activate_service::<Sink>))
        .route("/api/services/:name/deactivate", post(deactivate_service::<Sink>))
        .route("/api/services/:name/*path", any(proxy_call::<Sink>))
        .route("/api/webhooks/:name", post(webhook::<Sink>))
        .route("/mcp/gateway.intent", post(mcp_intent::<Sink>))
        .route("/mcp/gateway.execute", post(mcp_execute::<Sink>))
        .route("/mcp/gateway.adapters", post(mcp_adapters::<Sink>))
        .route("/mcp/gateway.tools", post(mcp_tools::<Sink>))
        .route("/mcp/gateway.reference", post(mcp_reference::<Sink>))
        .layer(middleware::from_fn(request_id_mw))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_mw::<Sink>))
        .with_state(state)
}

#[derive(Clone)]
struct RequestId(String);

async fn request_id_mw(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("req_{}", uuid::Uuid::new_v4().simple()));

    req.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = axum::http::HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn rate_limit_mw<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    match state.inner.rate_limiter.acquire(&addr.ip().to_string()).await {
        Ok(decision) if decision.is_allowed() => next.run(req).await,
        _ => error_response(&GatewayError::RateLimited { retry_after_secs: state.inner.config.rate_limit.window_secs }, &request_id),
    }
}

fn error_response(error: &GatewayError, request_id: &str) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error.to_http_body(request_id, now_epoch_secs()))).into_response()
}

fn request_id_of(headers: &HeaderMap, ext_id: Option<&RequestId>) -> String {
    ext_id.map(|r| r.0.clone()).unwrap_or_else(|| {
        headers.get("x-request-id").and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_string()
    })
}

async fn health<Sink: TelemetrySink>(State(state): State<GatewayState<Sink>>) -> impl IntoResponse {
    let services: Vec<String> = state.inner.services.read().unwrap().keys().cloned().collect();
    Json(serde_json::json!({
        "status": "ok",
        "ts": now_epoch_secs(),
        "services": services,
        "uptime": now_epoch_secs() - state.inner.started_at,
    }))
}

async fn ready<Sink: TelemetrySink>(State(state): State<GatewayState<Sink>>) -> impl IntoResponse {
    let has_services = !state.inner.services.read().unwrap().is_empty();
    let status = if has_services { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(serde_json::json!({ "ready": has_services })))
}

/// Renders whatever the caller wired up via a metrics registry living
/// outside this crate (§4.6.1 — `gateway-metrics` depends on this crate, not
/// the other way around, so the text snapshot is supplied, not computed here).
async fn metrics<Sink: TelemetrySink>(State(_state): State<GatewayState<Sink>>) -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], String::new())
}

async fn list_services<Sink: TelemetrySink>(State(state): State<GatewayState<Sink>>) -> impl IntoResponse {
    let services: Vec<ServiceDescriptor> = state.inner.services.read().unwrap().values().cloned().collect();
    Json(services)
}

async fn get_service<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Path(name): Path<String>,
    ext_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id_of(&headers, ext_id.as_ref().map(|e| &e.0));
    match state.service(&name) {
        Some(descriptor) => Json(descriptor).into_response(),
        None => error_response(&GatewayError::AdapterNotFound { adapter_id: name }, &request_id),
    }
}

async fn activate_service<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    state.audit("service.activated", serde_json::json!({ "service": name })).await;
    (StatusCode::OK, Json(serde_json::json!({ "service": name, "active": true })))
}

async fn deactivate_service<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    state.audit("service.deactivated", serde_json::json!({ "service": name })).await;
    (StatusCode::OK, Json(serde_json::json!({ "service": name, "active": false })))
}

/// `ALL /api/services/{name}/{*path}` (§4.6): proxies straight through the
/// Universal HTTP Client, applying the compliance request/response filters
/// the service's declared flags call for.
async fn proxy_call<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Path((name, path)): Path<(String, String)>,
    method: axum::http::Method,
    ext_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let request_id = request_id_of(&headers, ext_id.as_ref().map(|e| &e.0));

    let Some(descriptor) = state.service(&name) else {
        return error_response(&GatewayError::AdapterNotFound { adapter_id: name }, &request_id);
    };
    let Some(client) = state.client(&name) else {
        return error_response(&GatewayError::AdapterNotFound { adapter_id: name }, &request_id);
    };

    let mut data: Option<Value> = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => Some(v),
            Err(e) => return error_response(&GatewayError::Serialization(e.to_string()), &request_id),
        }
    };

    if descriptor.compliance.pci {
        if let Some(payload) = data.as_mut() {
            for field in crate::compliance::strip_prohibited_fields(payload) {
                state.audit("PCI_FIELD_REMOVED", serde_json::json!({ "field": field })).await;
            }
            if let Some(card) = payload.get("cardNumber").and_then(Value::as_str).map(str::to_string) {
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("cardNumber".into(), Value::String(crate::compliance::mask_card_number(&card)));
                }
            }
            if let Some(fields) = descriptor.metadata.get("pciSensitiveFields") {
                let names: Vec<String> = fields.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
                if !names.is_empty() {
                    let Some(key) = state.encryption_key() else {
                        return error_response(
                            &GatewayError::Config("PCI sensitive fields configured without an ENCRYPTION_KEY".into()),
                            &request_id,
                        );
                    };
                    for name in names {
                        let Some(plaintext) = payload.get(&name).and_then(Value::as_str).map(str::to_string) else {
                            continue;
                        };
                        match crate::compliance::encrypt_field(&key, &plaintext) {
                            Ok(ciphertext) => {
                                if let Some(obj) = payload.as_object_mut() {
                                    obj.insert(name, Value::String(ciphertext));
                                }
                            }
                            Err(e) => return error_response(&e, &request_id),
                        }
                    }
                }
            }
        }
    }
    if descriptor.compliance.gdpr {
        if let (Some(fields), Some(payload)) = (descriptor.metadata.get("gdprConsentFields"), data.as_ref()) {
            let required: Vec<String> = fields.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            if let Err(e) = crate::compliance::check_consent(payload, &required) {
                return error_response(&e, &request_id);
            }
        }
    }

    let options = RequestOptions { data, params: HashMap::new(), headers: HashMap::new() };
    let result = client.request(&format!("/{path}"), method.as_str(), options).await;

    state
        .audit(
            "service.proxied",
            serde_json::json!({ "service": name, "path": path, "method": method.as_str(), "ok": result.is_ok() }),
        )
        .await;

    match result {
        Ok(mut value) => {
            if descriptor.compliance.pci {
                if let Some(card) = value.get("cardNumber").and_then(Value::as_str).map(str::to_string) {
                    if let Some(obj) = value.as_object_mut() {
                        obj.insert("cardNumber".into(), Value::String(crate::compliance::mask_card_number(&card)));
                    }
                }
            }
            Json(value).into_response()
        }
        Err(e) => error_response(&e, &request_id),
    }
}

async fn webhook<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Path(name): Path<String>,
    ext_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let request_id = request_id_of(&headers, ext_id.as_ref().map(|e| &e.0));
    let handler = state.inner.webhooks.read().unwrap().get(&name).cloned();
    match handler {
        Some(handler) => {
            let header_map: HashMap<String, String> = headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();
            match handler(payload, header_map) {
                Ok(value) => Json(value).into_response(),
                Err(e) => error_response(&e, &request_id),
            }
        }
        None => error_response(&GatewayError::AdapterNotFound { adapter_id: name }, &request_id),
    }
}

fn call_context(headers: &HeaderMap, request_id: &str) -> CallContext {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    CallContext {
        authorization: header("authorization"),
        api_key: header("x-api-key"),
        project_scope: header("x-project-scope"),
        request_id: Some(request_id.to_string()),
        session_id: header("x-session-id"),
        headers: HashMap::new(),
    }
    .with_headers()
}

#[derive(serde::Deserialize)]
struct IntentRequest {
    query: String,
    adapter: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}
fn default_limit() -> usize {
    3
}

async fn mcp_intent<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Json(req): Json<IntentRequest>,
) -> impl IntoResponse {
    let operations = state.operations();
    Json(gateway_intent(&operations, &req.query, req.adapter.as_deref(), req.limit))
}

#[derive(serde::Deserialize)]
struct ExecuteRequest {
    tool_id: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    options: ExecuteOptions,
}

async fn mcp_execute<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    ext_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    let request_id = request_id_of(&headers, ext_id.as_ref().map(|e| &e.0));
    let operations = state.operations();

    let gate = match execute_gate(&operations, &req.tool_id, &req.params, &req.options) {
        Ok(gate) => gate,
        Err(e) => return mcp_error_response(&e),
    };

    let operation = match gate {
        ExecutionGate::DryRun { operation } => {
            return Json(serde_json::json!({
                "success": true,
                "dryRun": true,
                "operation": { "toolId": operation.tool_id, "riskLevel": operation.risk_level },
            }))
            .into_response();
        }
        ExecutionGate::Proceed { operation } => operation,
    };

    let context = call_context(&headers, &request_id);
    match dispatch(&state.inner.adapters, &operation, req.params, context).await {
        Ok((data, elapsed_ms)) => {
            state
                .audit("tool.executed", serde_json::json!({ "toolId": operation.tool_id, "elapsedMs": elapsed_ms }))
                .await;
            Json(serde_json::json!({
                "success": true,
                "data": data,
                "meta": {
                    "adapter": operation.adapter,
                    "tool": operation.name,
                    "requestId": request_id,
                    "timestamp": now_epoch_secs(),
                    "elapsedMs": elapsed_ms,
                },
            }))
            .into_response()
        }
        Err(e) => mcp_error_response(&e),
    }
}

fn mcp_error_response(error: &GatewayError) -> Response {
    (StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(error.to_mcp_body())).into_response()
}

#[derive(serde::Deserialize, Default)]
struct AdaptersRequest {
    category: Option<String>,
    capability: Option<String>,
}

async fn mcp_adapters<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Json(req): Json<AdaptersRequest>,
) -> impl IntoResponse {
    Json(adapters_catalog(&state.inner.adapters, req.category.as_deref(), req.capability.as_deref()))
}

#[derive(serde::Deserialize)]
struct ToolsRequest {
    adapter: String,
    search: Option<String>,
    #[serde(default = "default_tools_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}
fn default_tools_limit() -> usize {
    20
}

async fn mcp_tools<Sink: TelemetrySink>(
    State(state): State<GatewayState<Sink>>,
    Json(req): Json<ToolsRequest>,
) -> Response {
    match tools_for_adapter(&state.inner.adapters, &req.adapter, req.search.as_deref(), req.limit, req.offset) {
        Ok(tools) => Json(serde_json::json!({ "tools": tools })).into_response(),
        Err(e) => mcp_error_response(&e),
    }
}

#[derive(serde::Deserialize)]
struct ReferenceRequest {
    topic: String,
}

async fn mcp_reference<Sink: TelemetrySink>(Json(req): Json<ReferenceRequest>) -> impl IntoResponse {
    Json(reference_doc(&req.topic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::NullAuditSink;
    use crate::model::{AuthConfig, AuthType, ComplianceFlags};

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            port: 0,
            allowed_origins: vec![],
            encryption_key: None,
            pseudonym_salt: "salt".into(),
            auth_gateway_url: None,
            rate_limit: crate::config::RateLimitConfig { window_secs: 60, max_requests: 100 },
            service_base_url_overrides: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn register_service_creates_a_client_and_breaker() {
        let state = GatewayState::new(test_config(), Box::new(NullAuditSink));
        let descriptor = ServiceDescriptor {
            name: "paystack".into(),
            base_url: "https://api.paystack.co".into(),
            authentication: AuthConfig { kind: AuthType::None, config: HashMap::new() },
            endpoints: vec![],
            capabilities: vec![],
            metadata: HashMap::new(),
            compliance: Default::default(),
        };
        state.register_service(descriptor, None).unwrap();
        assert!(state.service("paystack").is_some());
        assert!(state.client("paystack").is_some());
        assert!(state.breakers().state_of("paystack").is_some());
    }

    #[tokio::test]
    async fn register_adapter_rebuilds_operation_registry() {
        let state = GatewayState::new(test_config(), Box::new(NullAuditSink));
        state.register_adapter(Arc::new(crate::registry::MockAdapter::new("mock-vendor", 2, "payments"))).await.unwrap();
        let ops = state.operations();
        assert!(ops.all().count() >= 2);
    }

    #[tokio::test]
    async fn pci_request_masks_card_and_audits_removed_fields() {
        use wiremock::matchers::{method as http_method, path as http_path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(http_path("/charge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .mount(&server)
            .await;

        let state = GatewayState::new(test_config(), Box::new(NullAuditSink));
        let descriptor = ServiceDescriptor {
            name: "paystack".into(),
            base_url: server.uri(),
            authentication: AuthConfig { kind: AuthType::None, config: HashMap::new() },
            endpoints: vec![],
            capabilities: vec![],
            metadata: HashMap::new(),
            compliance: ComplianceFlags { pci: true, ..Default::default() },
        };
        state.register_service(descriptor, None).unwrap();

        let body = serde_json::json!({ "cardNumber": "4111111111111111", "cvv2": "123", "amount": 500 });
        let bytes = axum::body::Bytes::from(serde_json::to_vec(&body).unwrap());

        let response = proxy_call::<NullSink>(
            State(state.clone()),
            Path(("paystack".to_string(), "charge".to_string())),
            axum::http::Method::POST,
            None,
            HeaderMap::new(),
            bytes,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let entries = state.inner.audit.recent();
        assert!(entries.iter().any(|e| e.action == "PCI_FIELD_REMOVED" && e.details["field"] == "cvv2"));

        let received = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent["cardNumber"], "411111******1111");
        assert!(sent.get("cvv2").is_none());
    }

    #[test]
    fn call_context_reads_known_headers_only() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer u".parse().unwrap());
        let ctx = call_context(&headers, "req_1");
        assert_eq!(ctx.authorization.as_deref(), Some("Bearer u"));
        assert_eq!(ctx.request_id.as_deref(), Some("req_1"));
        assert!(ctx.api_key.is_none());
    }
}
