//! Shared data model (§3): service descriptors, endpoints, tools, operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the five authentication schemes a service descriptor can declare (§3, §4.1).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Bearer,
    Apikey,
    Basic,
    Hmac,
    Oauth2,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ComplianceFlags {
    #[serde(default)]
    pub pci: bool,
    #[serde(default)]
    pub gdpr: bool,
    #[serde(default)]
    pub psd2: bool,
    #[serde(default)]
    pub sox: bool,
    #[serde(default)]
    pub hipaa: bool,
}

/// `{name, method, path, description, parameters, responses, tags}` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub method: String,
    /// May contain `{placeholder}` segments.
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub responses: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Immutable record describing one external service (§3).
///
/// Invariant: `base_url` is an absolute URL; enforced at construction so a
/// malformed catalog entry never makes it into the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub base_url: String,
    pub authentication: AuthConfig,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub compliance: ComplianceFlags,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: AuthType,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidServiceDescriptor(pub String);

impl std::fmt::Display for InvalidServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid service descriptor: {}", self.0)
    }
}
impl std::error::Error for InvalidServiceDescriptor {}

impl ServiceDescriptor {
    /// Validate the `base_url` invariant from §3.
    pub fn validate(&self) -> Result<(), InvalidServiceDescriptor> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(InvalidServiceDescriptor(format!(
                "baseUrl must be absolute: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// `{name, description, inputSchema}` (§3). `input_schema` is kept as a
/// generic JSON tree per the Design Notes (§9) rather than parsed into a
/// full JSON-Schema type — the five meta-tools only need `required`,
/// `type`, `enum`, and the integer/number distinction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// `{low, medium, high, destructive}` (§3, §4.3.1). Ordered so a `PartialOrd`
/// derive would match intuitive "more dangerous" ordering if ever needed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Destructive,
}

impl RiskLevel {
    /// Classify a tool name/category pair per §4.3.1.
    pub fn classify(tool_name: &str, category: &str) -> Self {
        let name = tool_name.to_lowercase();
        let category = category.to_lowercase();

        const LOW: &[&str] = &["list", "get", "fetch", "search", "health", "read", "view"];
        const HIGH_NAMES: &[&str] =
            &["pay", "transfer", "charge", "disburse", "payout", "authorize"];
        const HIGH_CATEGORIES: &[&str] = &["payments", "banking", "financial"];
        const DESTRUCTIVE: &[&str] = &["delete", "cancel", "remove", "revoke", "rotate"];

        // Name-based low-risk patterns (list/get/search/...) take precedence over
        // a high-risk category so read-only operations in a payments adapter
        // (e.g. "list_transactions") don't get swept into the idempotency gate.
        if LOW.iter().any(|k| name.contains(k)) {
            RiskLevel::Low
        } else if DESTRUCTIVE.iter().any(|k| name.contains(k)) {
            RiskLevel::Destructive
        } else if HIGH_NAMES.iter().any(|k| name.contains(k)) || HIGH_CATEGORIES.contains(&category.as_str()) {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        }
    }

    pub fn requires_idempotency(self) -> bool {
        matches!(self, RiskLevel::High)
    }
}

/// `{tool_id, adapter, name, description, category, method, risk_level,
/// required_params, optional_params, input_schema, tags}` (§3, §4.3.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub tool_id: String,
    pub adapter: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub method: String,
    pub risk_level: RiskLevel,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub input_schema: serde_json::Value,
    pub tags: Vec<String>,
}

impl Operation {
    /// A destructive-by-name operation always requires confirmation,
    /// independent of its classified risk level (§4.3.3 step 3).
    pub fn requires_confirmation(&self) -> bool {
        const DESTRUCTIVE: &[&str] = &["delete", "cancel", "remove", "revoke"];
        let name = self.name.to_lowercase();
        DESTRUCTIVE.iter().any(|k| name.contains(k))
    }
}

/// Canonicalize a tool name into kebab-case (§3 "canonical tool ID").
pub fn kebab_case(name: &str) -> String {
    name.replace('_', "-").to_lowercase()
}

/// Canonicalize a tool name into snake_case (the alias form).
pub fn snake_case(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// Build the canonical tool ID `"<adapter-id>:<kebab-case-tool-name>"`.
pub fn canonical_tool_id(adapter_id: &str, tool_name: &str) -> String {
    format!("{adapter_id}:{}", kebab_case(tool_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_and_snake_forms_of_same_name_agree_on_canonical_id() {
        let a = canonical_tool_id("paystack", "initialize_transaction");
        let b = canonical_tool_id("paystack", "initialize-transaction");
        assert_eq!(a, b);
        assert_eq!(a, "paystack:initialize-transaction");
    }

    #[test]
    fn risk_classification_matches_spec_examples() {
        assert_eq!(RiskLevel::classify("list_transactions", "payments"), RiskLevel::Low);
        assert_eq!(RiskLevel::classify("initialize_transaction", "payments"), RiskLevel::High);
        assert_eq!(RiskLevel::classify("revoke_api_key", "auth"), RiskLevel::Destructive);
        assert_eq!(RiskLevel::classify("create_webhook", "infrastructure"), RiskLevel::Medium);
    }

    #[test]
    fn base_url_must_be_absolute() {
        let mut svc = sample_descriptor();
        svc.base_url = "not-a-url".into();
        assert!(svc.validate().is_err());
        svc.base_url = "https://api.paystack.co".into();
        assert!(svc.validate().is_ok());
    }

    fn sample_descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "paystack".into(),
            base_url: "https://api.paystack.co".into(),
            authentication: AuthConfig { kind: AuthType::Bearer, config: HashMap::new() },
            endpoints: vec![],
            capabilities: vec![],
            metadata: HashMap::new(),
            compliance: ComplianceFlags::default(),
        }
    }
}
