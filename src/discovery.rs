//! MCP Discovery Layer (§4.3): the Operation Registry, the search engine,
//! and the five meta-tools that stand in for thousands of first-class tools.
//!
//! Built the way `control/command.rs`'s `CommandRegistry` turns labeled
//! commands into a lookup table: one record per adapter tool, indexed by
//! canonical ID, with risk classification folded in at build time instead
//! of recomputed per call.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use crate::gateway_error::GatewayError;
use crate::model::{Operation, RiskLevel};
use crate::registry::{AdapterRegistry, CallContext};

/// Built once from the adapter registry at startup (§4.3.1); rebuilt whenever
/// adapters are (re)registered.
pub struct OperationRegistry {
    operations: HashMap<String, Operation>,
}

impl OperationRegistry {
    /// Derive one [`Operation`] per adapter tool.
    pub fn build(adapters: &AdapterRegistry) -> Self {
        let mut operations = HashMap::new();
        for adapter_id in adapters.adapter_ids() {
            let Some(adapter) = adapters.adapter(&adapter_id) else { continue };
            for tool in adapter.tools() {
                let tool_id = crate::model::canonical_tool_id(&adapter_id, &tool.name);
                let risk_level = RiskLevel::classify(&tool.name, adapter.category());
                let (required_params, optional_params) = split_required(&tool.input_schema);
                operations.insert(
                    tool_id.clone(),
                    Operation {
                        tool_id,
                        adapter: adapter_id.clone(),
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        category: adapter.category().to_string(),
                        method: "POST".into(),
                        risk_level,
                        required_params,
                        optional_params,
                        input_schema: tool.input_schema.clone(),
                        tags: adapter.capabilities().to_vec(),
                    },
                );
            }
        }
        Self { operations }
    }

    pub fn get(&self, tool_id: &str) -> Option<&Operation> {
        self.operations.get(tool_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn by_adapter<'a>(&'a self, adapter_id: &'a str) -> impl Iterator<Item = &'a Operation> {
        self.operations.values().filter(move |op| op.adapter == adapter_id)
    }
}

fn split_required(schema: &Value) -> (Vec<String>, Vec<String>) {
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let optional: Vec<String> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().filter(|k| !required.contains(k)).cloned().collect())
        .unwrap_or_default();
    (required, optional)
}

/// One search hit (§4.3.2).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    pub tool_id: String,
    pub confidence: f64,
    pub why: String,
}

/// Tokenize-and-score search over the operation registry (§4.3.2).
pub struct SearchEngine;

impl SearchEngine {
    /// Search `query` across name/description/tags/category/adapter capabilities.
    /// Returns up to `limit` results ordered by descending confidence, ties
    /// broken by adapter name. `needs_selection` per the caller: top two
    /// confidences differ by < 0.1.
    pub fn search(
        registry: &OperationRegistry,
        query: &str,
        adapter_filter: Option<&str>,
        limit: usize,
    ) -> Vec<SearchResult> {
        let query_terms = tokenize(query);
        let mut scored: Vec<(f64, &Operation)> = registry
            .all()
            .filter(|op| adapter_filter.map(|a| a == op.adapter).unwrap_or(true))
            .map(|op| (score(op, &query_terms), op))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|(s1, op1), (s2, op2)| {
            s2.partial_cmp(s1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| op1.adapter.cmp(&op2.adapter))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(confidence, op)| SearchResult {
                tool_id: op.tool_id.clone(),
                confidence: confidence.min(1.0),
                why: format!("matched \"{}\" in {}", query, op.name),
            })
            .collect()
    }

    /// True when the top two confidences differ by less than 0.1 (§4.3.2).
    pub fn needs_selection(results: &[SearchResult]) -> bool {
        match (results.first(), results.get(1)) {
            (Some(a), Some(b)) => (a.confidence - b.confidence).abs() < 0.1,
            _ => false,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn score(op: &Operation, query_terms: &[String]) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let haystack: Vec<String> = [op.name.clone(), op.description.clone(), op.category.clone(), op.tags.join(" "), op.adapter.clone()]
        .join(" ")
        .split_whitespace()
        .map(|s| s.to_lowercase())
        .collect();

    let matches = query_terms.iter().filter(|t| haystack.iter().any(|h| h.contains(t.as_str()))).count();
    let mut confidence = matches as f64 / query_terms.len() as f64;

    let name_tokens = tokenize(&op.name);
    if query_terms.iter().all(|t| name_tokens.contains(t)) {
        confidence += 0.2;
    }
    confidence.min(1.0)
}

/// `gateway.intent` response shape (§4.3.3).
#[derive(Debug, serde::Serialize)]
pub struct IntentResponse {
    pub recommended: Option<Recommendation>,
    pub ready_to_execute: Option<ReadyToExecute>,
    pub missing_inputs: Vec<String>,
    pub next_step: String,
    pub alternatives: Vec<Recommendation>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Recommendation {
    pub tool_id: String,
    pub confidence: f64,
    pub why: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ReadyToExecute {
    pub tool_id: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub param_schemas: Value,
    pub example: Value,
    pub constraints: Constraints,
}

#[derive(Debug, serde::Serialize)]
pub struct Constraints {
    pub risk_level: RiskLevel,
    pub requires_idempotency: bool,
    pub requires_confirmation: bool,
}

/// `gateway.intent({query, adapter?, context?, limit=3})` (§4.3.3).
pub fn gateway_intent(
    registry: &OperationRegistry,
    query: &str,
    adapter: Option<&str>,
    limit: usize,
) -> IntentResponse {
    let results = SearchEngine::search(registry, query, adapter, limit.max(1));
    let recommended = results.first().cloned().map(|r| Recommendation {
        tool_id: r.tool_id,
        confidence: r.confidence,
        why: r.why,
    });

    let ready_to_execute = recommended.as_ref().and_then(|rec| {
        registry.get(&rec.tool_id).map(|op| ReadyToExecute {
            tool_id: op.tool_id.clone(),
            required_params: op.required_params.clone(),
            optional_params: op.optional_params.clone(),
            param_schemas: op.input_schema.clone(),
            example: synthesize_example(op),
            constraints: Constraints {
                risk_level: op.risk_level,
                requires_idempotency: op.risk_level.requires_idempotency(),
                requires_confirmation: op.requires_confirmation(),
            },
        })
    });

    let missing_inputs = ready_to_execute
        .as_ref()
        .map(|r| r.required_params.clone())
        .unwrap_or_default();

    let next_step = if recommended.is_some() {
        "call gateway.execute with the recommended tool_id".to_string()
    } else {
        "no confident match; refine the query or browse gateway.adapters".to_string()
    };

    IntentResponse {
        recommended,
        ready_to_execute,
        missing_inputs,
        next_step,
        alternatives: results.into_iter().skip(1).map(|r| Recommendation {
            tool_id: r.tool_id,
            confidence: r.confidence,
            why: r.why,
        }).collect(),
    }
}

/// Synthesize a plausible example value per declared parameter name (§4.3.3).
fn synthesize_example(op: &Operation) -> Value {
    let mut example = serde_json::Map::new();
    for param in op.required_params.iter().chain(op.optional_params.iter()) {
        example.insert(param.clone(), synthesize_param_value(param));
    }
    Value::Object(example)
}

fn synthesize_param_value(param: &str) -> Value {
    let lower = param.to_lowercase();
    if lower.contains("email") {
        Value::String("customer@example.com".into())
    } else if lower.contains("amount") {
        Value::from(1000)
    } else if lower.contains("currency") {
        Value::String("NGN".into())
    } else if lower.contains("reference") {
        Value::String("ref_123456".into())
    } else if lower.contains("phone") {
        Value::String("+2348000000000".into())
    } else if lower.contains("url") {
        Value::String("https://example.com/callback".into())
    } else {
        Value::String(format!("example_{param}"))
    }
}

/// Outcome of `gateway.execute`'s policy gate (§4.3.3 step 1-5), separate
/// from the adapter call itself so `facade.rs` can dispatch after success.
pub enum ExecutionGate {
    Proceed { operation: Operation },
    DryRun { operation: Operation },
}

#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    pub idempotency_key: Option<String>,
    pub confirmed: bool,
    pub dry_run: bool,
}

/// Run the pre-dispatch policy checks for `gateway.execute` (§4.3.3).
pub fn execute_gate(
    registry: &OperationRegistry,
    tool_id: &str,
    params: &Value,
    options: &ExecuteOptions,
) -> Result<ExecutionGate, GatewayError> {
    if !tool_id_format_valid(tool_id) {
        return Err(GatewayError::InvalidToolIdFormat { tool_id: tool_id.to_string() });
    }
    let operation = registry
        .get(tool_id)
        .ok_or_else(|| GatewayError::ToolNotFound { tool_id: tool_id.to_string() })?
        .clone();

    if operation.risk_level.requires_idempotency() && options.idempotency_key.is_none() {
        return Err(GatewayError::IdempotencyRequired);
    }
    if operation.requires_confirmation() && !options.confirmed {
        return Err(GatewayError::ConfirmationRequired);
    }

    validate_params(&operation, params)?;

    if options.dry_run {
        return Ok(ExecutionGate::DryRun { operation });
    }
    Ok(ExecutionGate::Proceed { operation })
}

fn tool_id_format_valid(tool_id: &str) -> bool {
    let Some((adapter, tool)) = tool_id.split_once(':') else { return false };
    is_kebab_ascii(adapter) && is_kebab_ascii(tool)
}

fn is_kebab_ascii(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate_params(operation: &Operation, params: &Value) -> Result<(), GatewayError> {
    let schema = &operation.input_schema;
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    let params_obj = params.as_object().cloned().unwrap_or_default();

    for required in &operation.required_params {
        if !params_obj.contains_key(required) {
            return Err(GatewayError::MissingRequiredParam { param: required.clone() });
        }
    }

    for (key, value) in &params_obj {
        let Some(prop_schema) = properties.get(key) else { continue };
        if let Some(expected_type) = prop_schema.get("type").and_then(Value::as_str) {
            if !type_matches(expected_type, value) {
                return Err(GatewayError::InvalidParamType {
                    param: key.clone(),
                    expected: json_type_name(expected_type),
                    received: json_type_name(value_type_name(value)).to_string(),
                });
            }
        }
        if let Some(enum_values) = prop_schema.get("enum").and_then(Value::as_array) {
            if !enum_values.contains(value) {
                return Err(GatewayError::InvalidParamValue {
                    param: key.clone(),
                    reason: format!("must be one of {enum_values:?}"),
                });
            }
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::Null => "null",
    }
}

fn json_type_name(t: &str) -> &'static str {
    match t {
        "string" => "string",
        "boolean" => "boolean",
        "integer" => "integer",
        "number" => "number",
        "object" => "object",
        "array" => "array",
        _ => "unknown",
    }
}

/// `gateway.execute` response envelope after a successful (or dry-run) gate pass.
#[derive(Debug, serde::Serialize)]
pub struct ExecuteMeta {
    pub adapter: String,
    pub tool: String,
    pub request_id: String,
    pub timestamp: i64,
    pub operation: OperationMeta,
}

#[derive(Debug, serde::Serialize)]
pub struct OperationMeta {
    pub risk_level: RiskLevel,
    pub idempotent: bool,
    pub category: String,
}

/// Execute the resolved operation through the adapter registry, measuring
/// wall-clock latency (§4.3.3 "On execution").
pub async fn dispatch(
    adapters: &AdapterRegistry,
    operation: &Operation,
    params: Value,
    context: CallContext,
) -> Result<(Value, u128), GatewayError> {
    let started = Instant::now();
    let result = adapters.call_tool(&operation.tool_id, params, context).await;
    let elapsed = started.elapsed().as_millis();
    result.map(|v| (v, elapsed)).map_err(|e| match e {
        GatewayError::MockAdapter { adapter_id } => GatewayError::MockAdapter { adapter_id },
        other => GatewayError::ExecutionError {
            adapter: operation.adapter.clone(),
            tool: operation.name.clone(),
            message: other.to_string(),
        },
    })
}

/// `gateway.adapters` summary record (§4.3.3).
#[derive(Debug, serde::Serialize)]
pub struct AdapterSummary {
    pub id: String,
    pub name: String,
    pub category: String,
    pub capabilities: Vec<String>,
    pub tool_count: usize,
    pub tool_categories: Vec<String>,
    pub is_mock: bool,
    pub common_operations: Vec<String>,
}

pub fn adapters_catalog(
    adapters: &AdapterRegistry,
    category: Option<&str>,
    capability: Option<&str>,
) -> Vec<AdapterSummary> {
    adapters
        .adapter_ids()
        .into_iter()
        .filter_map(|id| adapters.adapter(&id))
        .filter(|a| category.map(|c| c == a.category()).unwrap_or(true))
        .filter(|a| capability.map(|cap| a.capabilities().iter().any(|c| c == cap)).unwrap_or(true))
        .map(|a| {
            let common: Vec<String> = a
                .tools()
                .iter()
                .filter(|t| {
                    let n = t.name.to_lowercase();
                    ["list", "get", "create", "initialize", "verify"].iter().any(|k| n.contains(k))
                })
                .map(|t| t.name.clone())
                .collect();
            AdapterSummary {
                id: a.id().to_string(),
                name: a.name().to_string(),
                category: a.category().to_string(),
                capabilities: a.capabilities().to_vec(),
                tool_count: a.tools().len(),
                tool_categories: vec![a.category().to_string()],
                is_mock: a.is_mock(),
                common_operations: common,
            }
        })
        .collect()
}

/// `gateway.tools` paginated listing (§4.3.3).
pub fn tools_for_adapter(
    adapters: &AdapterRegistry,
    adapter_id: &str,
    search: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<Vec<String>, GatewayError> {
    let adapter = adapters
        .adapter(adapter_id)
        .ok_or_else(|| GatewayError::AdapterNotFound { adapter_id: adapter_id.to_string() })?;

    let filtered: Vec<String> = adapter
        .tools()
        .iter()
        .filter(|t| search.map(|q| t.name.to_lowercase().contains(&q.to_lowercase())).unwrap_or(true))
        .map(|t| t.name.clone())
        .collect();

    Ok(filtered.into_iter().skip(offset).take(limit).collect())
}

/// `gateway.reference({topic, section})` — static, gateway-focused documentation (§4.3.3).
pub fn reference(topic: &str) -> Value {
    match topic {
        "authentication" => serde_json::json!({
            "overview": "services declare one of none|bearer|apikey|basic|hmac|oauth2; the gateway injects credentials before every outbound call",
            "examples": ["bearer: Authorization: Bearer <token>", "apikey: header or query param per service config"],
        }),
        "idempotency" => serde_json::json!({
            "overview": "high-risk operations require an idempotency_key in gateway.execute's options",
            "best_practices": ["generate one UUID per logical attempt, reuse it across retries"],
        }),
        "risk-levels" => serde_json::json!({
            "overview": "low|medium|high|destructive, derived from tool name and adapter category",
            "policy": "high requires idempotency_key; destructive requires confirmed:true",
        }),
        other => serde_json::json!({
            "overview": format!("no curated reference for \"{other}\"; consult gateway.adapters or gateway.tools"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockAdapter;
    use std::sync::Arc;

    async fn registry_with(id: &str, tool_count: usize, category: &str) -> (AdapterRegistry, OperationRegistry) {
        let adapters = AdapterRegistry::new();
        adapters.register(Arc::new(MockAdapter::new(id, tool_count, category))).await.unwrap();
        let ops = OperationRegistry::build(&adapters);
        (adapters, ops)
    }

    #[tokio::test]
    async fn search_finds_mock_operations_by_name() {
        let (_adapters, ops) = registry_with("mock-vendor", 3, "payments").await;
        let results = SearchEngine::search(&ops, "mock operation 0", None, 5);
        assert!(!results.is_empty());
        assert!(results[0].tool_id.contains("mock-vendor"));
    }

    #[tokio::test]
    async fn execute_gate_requires_idempotency_for_high_risk() {
        let adapters = AdapterRegistry::new();
        adapters.register(Arc::new(EchoAdapter::new("paystack", "initiate_payment", "payments"))).await.unwrap();
        let ops = OperationRegistry::build(&adapters);

        let options = ExecuteOptions::default();
        let err = execute_gate(&ops, "paystack:initiate-payment", &serde_json::json!({}), &options).unwrap_err();
        assert_eq!(err.code(), "IDEMPOTENCY_REQUIRED");
    }

    #[tokio::test]
    async fn execute_gate_requires_confirmation_for_destructive() {
        let adapters = AdapterRegistry::new();
        adapters.register(Arc::new(EchoAdapter::new("vendor", "delete_webhook", "infrastructure"))).await.unwrap();
        let ops = OperationRegistry::build(&adapters);

        let options = ExecuteOptions::default();
        let err = execute_gate(&ops, "vendor:delete-webhook", &serde_json::json!({}), &options).unwrap_err();
        assert_eq!(err.code(), "CONFIRMATION_REQUIRED");
    }

    #[tokio::test]
    async fn dry_run_returns_without_dispatch() {
        let adapters = AdapterRegistry::new();
        adapters.register(Arc::new(EchoAdapter::new("vendor", "list_items", "infrastructure"))).await.unwrap();
        let ops = OperationRegistry::build(&adapters);

        let options = ExecuteOptions { dry_run: true, ..Default::default() };
        let gate = execute_gate(&ops, "vendor:list-items", &serde_json::json!({}), &options).unwrap();
        assert!(matches!(gate, ExecutionGate::DryRun { .. }));
    }

    #[test]
    fn malformed_tool_id_is_invalid_format() {
        let adapters_empty = OperationRegistry { operations: HashMap::new() };
        let options = ExecuteOptions::default();
        let err = execute_gate(&adapters_empty, "NotValid", &serde_json::json!({}), &options).unwrap_err();
        assert_eq!(err.code(), "INVALID_TOOL_ID_FORMAT");
    }

    struct EchoAdapter {
        id: String,
        category: String,
        tools: Vec<crate::model::Tool>,
    }

    impl EchoAdapter {
        fn new(id: &str, tool_name: &str, category: &str) -> Self {
            Self {
                id: id.to_string(),
                category: category.to_string(),
                tools: vec![crate::model::Tool {
                    name: tool_name.to_string(),
                    description: String::new(),
                    input_schema: serde_json::json!({}),
                }],
            }
        }
    }

    #[async_trait::async_trait]
    impl crate::registry::Adapter for EchoAdapter {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn description(&self) -> &str {
            ""
        }
        fn category(&self) -> &str {
            &self.category
        }
        fn capabilities(&self) -> &[String] {
            &[]
        }
        fn tools(&self) -> &[crate::model::Tool] {
            &self.tools
        }
        async fn call_tool(
            &self,
            _tool_name: &str,
            _args: Value,
            _context: &CallContext,
        ) -> Result<Value, GatewayError> {
            Ok(Value::Null)
        }
    }
}
