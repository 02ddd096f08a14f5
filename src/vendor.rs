//! Vendor Abstraction Layer (§4.4): one stable client schema per category,
//! behind which interchangeable vendor-specific mappings live.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::gateway_error::GatewayError;
use crate::registry::{AdapterRegistry, CallContext};

/// `payment.initializeTransaction{amount:req:number, email:req:string, ...}` (§4.4).
#[derive(Clone, Debug)]
pub struct ClientSchema {
    pub category: String,
    pub operation: String,
    pub required: Vec<String>,
    pub optional_defaults: HashMap<String, Value>,
}

impl ClientSchema {
    pub fn new(category: impl Into<String>, operation: impl Into<String>, required: &[&str]) -> Self {
        Self {
            category: category.into(),
            operation: operation.into(),
            required: required.iter().map(|s| s.to_string()).collect(),
            optional_defaults: HashMap::new(),
        }
    }

    pub fn with_default(mut self, field: impl Into<String>, value: Value) -> Self {
        self.optional_defaults.insert(field.into(), value);
        self
    }

    fn validate(&self, input: &Value) -> Result<Value, GatewayError> {
        let mut object = input.as_object().cloned().unwrap_or_default();
        for field in &self.required {
            if !object.contains_key(field) {
                return Err(GatewayError::SchemaViolation {
                    reason: format!("missing required field {field}"),
                });
            }
        }
        for (field, default) in &self.optional_defaults {
            object.entry(field.clone()).or_insert_with(|| default.clone());
        }
        Ok(Value::Object(object))
    }
}

/// Transform from client-schema input to one vendor's tool input (§4.4).
pub struct VendorMapping {
    pub vendor: String,
    pub tool: String,
    pub transform: Box<dyn Fn(&Value) -> Value + Send + Sync>,
    pub deprecated_since: Option<i64>,
}

impl VendorMapping {
    pub fn new(vendor: impl Into<String>, tool: impl Into<String>, transform: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self { vendor: vendor.into(), tool: tool.into(), transform: Box::new(transform), deprecated_since: None }
    }

    pub fn deprecate(mut self, since_epoch_secs: i64) -> Self {
        self.deprecated_since = Some(since_epoch_secs);
        self
    }

    /// 30-day removal floor is data only (§4.4 "removal is forbidden within 30
    /// days of deprecation"); nothing in this type enforces it, it's left
    /// for an operator process to consult.
    pub fn can_remove(&self, now_epoch_secs: i64) -> bool {
        match self.deprecated_since {
            Some(since) => now_epoch_secs - since >= 30 * 24 * 60 * 60,
            None => false,
        }
    }
}

struct CategoryEntry {
    schema: ClientSchema,
    mappings: Vec<VendorMapping>,
}

/// Owns the category -> schema -> vendor-mapping tables (§4.4).
pub struct VendorAbstraction {
    categories: RwLock<HashMap<String, CategoryEntry>>,
}

impl Default for VendorAbstraction {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorAbstraction {
    pub fn new() -> Self {
        Self { categories: RwLock::new(HashMap::new()) }
    }

    pub fn declare(&self, schema: ClientSchema) {
        let key = format!("{}.{}", schema.category, schema.operation);
        self.categories.write().unwrap().insert(key, CategoryEntry { schema, mappings: Vec::new() });
    }

    pub fn add_mapping(&self, category: &str, operation: &str, mapping: VendorMapping) {
        let key = format!("{category}.{operation}");
        if let Some(entry) = self.categories.write().unwrap().get_mut(&key) {
            entry.mappings.push(mapping);
        }
    }

    /// `executeAbstractedCall(category, operation, input, vendorPreference?)` (§4.4).
    pub async fn execute_abstracted_call(
        &self,
        adapters: &AdapterRegistry,
        category: &str,
        operation: &str,
        input: &Value,
        vendor_preference: Option<&str>,
        context: CallContext,
        vendor_is_healthy: impl Fn(&str) -> bool,
    ) -> Result<Value, GatewayError> {
        let key = format!("{category}.{operation}");
        let validated = {
            let categories = self.categories.read().unwrap();
            let entry = categories
                .get(&key)
                .ok_or_else(|| GatewayError::AbstractionNotFound { category: category.into(), operation: operation.into() })?;
            entry.schema.validate(input)?
        };

        let (vendor_tool, vendor_input, vendor_id) = {
            let categories = self.categories.read().unwrap();
            let entry = categories.get(&key).expect("checked above");

            let chosen = if let Some(pref) = vendor_preference {
                entry
                    .mappings
                    .iter()
                    .find(|m| m.vendor == pref && m.deprecated_since.is_none() && vendor_is_healthy(&m.vendor))
            } else {
                entry.mappings.iter().find(|m| m.deprecated_since.is_none() && vendor_is_healthy(&m.vendor))
            };

            let chosen = chosen.ok_or_else(|| GatewayError::NoVendorAvailable { category: category.into() })?;
            let vendor_input = (chosen.transform)(&validated);
            (chosen.tool.clone(), vendor_input, chosen.vendor.clone())
        };

        let tool_id = format!("{vendor_id}:{vendor_tool}");
        adapters.call_tool(&tool_id, vendor_input, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockAdapter;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_category_is_abstraction_not_found() {
        let adapters = AdapterRegistry::new();
        let abstraction = VendorAbstraction::new();
        let err = abstraction
            .execute_abstracted_call(
                &adapters,
                "payment",
                "initializeTransaction",
                &serde_json::json!({}),
                None,
                CallContext::default(),
                |_| true,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ABSTRACTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn missing_required_field_is_schema_violation() {
        let adapters = AdapterRegistry::new();
        let abstraction = VendorAbstraction::new();
        abstraction.declare(ClientSchema::new("payment", "initializeTransaction", &["amount", "email"]));
        abstraction.add_mapping(
            "payment",
            "initializeTransaction",
            VendorMapping::new("paystack", "initialize_transaction", |v| v.clone()),
        );

        let err = abstraction
            .execute_abstracted_call(
                &adapters,
                "payment",
                "initializeTransaction",
                &serde_json::json!({"amount": 100}),
                None,
                CallContext::default(),
                |_| true,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VIOLATION");
    }

    #[tokio::test]
    async fn no_healthy_vendor_is_no_vendor_available() {
        let adapters = AdapterRegistry::new();
        let abstraction = VendorAbstraction::new();
        abstraction.declare(ClientSchema::new("payment", "initializeTransaction", &["amount", "email"]));
        abstraction.add_mapping(
            "payment",
            "initializeTransaction",
            VendorMapping::new("paystack", "initialize_transaction", |v| v.clone()),
        );

        let err = abstraction
            .execute_abstracted_call(
                &adapters,
                "payment",
                "initializeTransaction",
                &serde_json::json!({"amount": 100, "email": "a@b.com"}),
                None,
                CallContext::default(),
                |_| false,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_VENDOR_AVAILABLE");
    }

    #[tokio::test]
    async fn successful_call_routes_through_transform_and_mock_adapter() {
        let adapters = AdapterRegistry::new();
        adapters.register_mock("paystack", 1, "payments").await.unwrap();
        // register_mock synthesizes "mock_operation_0"; point the mapping at it
        // to exercise routing without asserting on unexecutable mock output.
        let abstraction = VendorAbstraction::new();
        abstraction.declare(ClientSchema::new("payment", "initializeTransaction", &["amount", "email"]));
        abstraction.add_mapping(
            "payment",
            "initializeTransaction",
            VendorMapping::new("paystack", "mock_operation_0", |v| v.clone()),
        );

        let err = abstraction
            .execute_abstracted_call(
                &adapters,
                "payment",
                "initializeTransaction",
                &serde_json::json!({"amount": 100, "email": "a@b.com"}),
                Some("paystack"),
                CallContext::default(),
                |_| true,
            )
            .await
            .unwrap_err();
        // mock adapters can't be executed; routing itself succeeded in reaching it.
        assert_eq!(err.code(), "MOCK_ADAPTER");
        let _ = Arc::new(MockAdapter::new("unused", 0, "unused"));
    }

    #[test]
    fn can_remove_only_after_30_days() {
        let mapping = VendorMapping::new("v", "t", |v| v.clone()).deprecate(1_000_000);
        assert!(!mapping.can_remove(1_000_000 + 10 * 24 * 60 * 60));
        assert!(mapping.can_remove(1_000_000 + 31 * 24 * 60 * 60));
    }
}
