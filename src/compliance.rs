//! Compliance Pipeline (§4.5): regulation validators, request/response data
//! filters, and the append-only audit log.
//!
//! The validator shape mirrors how the resilience primitives treat a policy
//! as a predicate over state (`circuit_breaker.rs`'s `execute` gating on
//! breaker state, `retry.rs`'s `should_retry` predicate) applied here to a
//! service descriptor instead of a call outcome. `AuditSink` is the
//! `TelemetrySink` pattern from `telemetry/sinks.rs` carried over to audit
//! entries rather than resilience events.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::gateway_error::GatewayError;
use crate::model::{ComplianceFlags, ServiceDescriptor};

/// One compliance validator's verdict (§4.5).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidatorResult {
    pub compliant: bool,
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidatorResult {
    fn ok() -> Self {
        Self { compliant: true, violations: vec![], recommendations: vec![] }
    }
}

/// PCI: card-processing services must declare the deletable prohibited fields
/// and a designated encryption key source.
pub fn validate_pci(service: &ServiceDescriptor) -> ValidatorResult {
    let mut result = ValidatorResult::ok();
    if !service.metadata.contains_key("pciSensitiveFields") {
        result.compliant = false;
        result.violations.push("no sensitive fields declared for masking/encryption".into());
        result.recommendations.push("set metadata.pciSensitiveFields to a comma-separated field list".into());
    }
    result
}

/// GDPR: services handling personal data must declare the identifier fields
/// to pseudonymize.
pub fn validate_gdpr(service: &ServiceDescriptor) -> ValidatorResult {
    let mut result = ValidatorResult::ok();
    if !service.metadata.contains_key("gdprPersonalFields") {
        result.compliant = false;
        result.violations.push("no personal identifier fields declared for pseudonymization".into());
        result.recommendations.push("set metadata.gdprPersonalFields to a comma-separated field list".into());
    }
    result
}

/// PSD2: payment/transfer services must declare an SCA threshold.
pub fn validate_psd2(service: &ServiceDescriptor) -> ValidatorResult {
    let mut result = ValidatorResult::ok();
    if service.metadata.get("psd2Threshold").and_then(|v| v.parse::<f64>().ok()).is_none() {
        result.recommendations.push("set metadata.psd2Threshold; defaults to 30 otherwise".into());
    }
    result
}

/// SOX: requires audit trail retention declared (no transformation on the
/// payload itself — SOX is about change/audit trails, not field redaction).
pub fn validate_sox(service: &ServiceDescriptor) -> ValidatorResult {
    let mut result = ValidatorResult::ok();
    if !service.metadata.contains_key("soxAuditRetentionDays") {
        result.compliant = false;
        result.violations.push("no audit retention period declared".into());
    }
    result
}

/// HIPAA: requires designated PHI fields for masking, same shape as GDPR.
pub fn validate_hipaa(service: &ServiceDescriptor) -> ValidatorResult {
    let mut result = ValidatorResult::ok();
    if !service.metadata.contains_key("hipaaPhiFields") {
        result.compliant = false;
        result.violations.push("no PHI fields declared for masking".into());
    }
    result
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregatedCompliance {
    pub status: ComplianceStatus,
    pub results: HashMap<&'static str, ValidatorResult>,
    pub checked_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
}

/// Per-service cache of the last aggregated compliance check, keyed by
/// service name with a timestamp (§4.5 "cached per service with a timestamp").
#[derive(Default)]
pub struct ComplianceCache {
    entries: RwLock<HashMap<String, AggregatedCompliance>>,
}

impl ComplianceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every validator enabled by `service.compliance` and cache the result.
    pub fn check(&self, service: &ServiceDescriptor, now_epoch_secs: i64) -> AggregatedCompliance {
        let flags: &ComplianceFlags = &service.compliance;
        let mut results = HashMap::new();
        if flags.pci {
            results.insert("pci", validate_pci(service));
        }
        if flags.gdpr {
            results.insert("gdpr", validate_gdpr(service));
        }
        if flags.psd2 {
            results.insert("psd2", validate_psd2(service));
        }
        if flags.sox {
            results.insert("sox", validate_sox(service));
        }
        if flags.hipaa {
            results.insert("hipaa", validate_hipaa(service));
        }

        let status = if results.values().all(|r| r.compliant) {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        };

        let aggregated = AggregatedCompliance { status, results, checked_at: now_epoch_secs };
        self.entries.write().unwrap().insert(service.name.clone(), aggregated.clone());
        aggregated
    }

    pub fn cached(&self, service_name: &str) -> Option<AggregatedCompliance> {
        self.entries.read().unwrap().get(service_name).cloned()
    }
}

const PCI_PROHIBITED_FIELDS: &[&str] =
    &["cvv2", "cvc2", "cid", "cav2", "track1", "track2", "magneticStripe", "pin", "pinBlock"];

/// Mask a card number to `first6 + '*'*(n-10) + last4` (§4.5 PCI).
pub fn mask_card_number(card_number: &str) -> String {
    let digits: String = card_number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return "*".repeat(digits.len());
    }
    let first6 = &digits[..6];
    let last4 = &digits[digits.len() - 4..];
    let masked_len = digits.len() - 10;
    format!("{first6}{}{last4}", "*".repeat(masked_len))
}

/// Encrypt a field with AES-256-GCM using a process-wide key (§4.5 PCI).
/// Output is `nonce || ciphertext`, base64-encoded.
pub fn encrypt_field(key: &[u8; 32], plaintext: &str) -> Result<String, GatewayError> {
    use base64::Engine;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce_bytes: [u8; 12] = rand_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| GatewayError::ComplianceViolation { regulation: "PCI", details: format!("encryption failed: {e}") })?;
    let mut payload = nonce_bytes.to_vec();
    payload.extend(ciphertext);
    Ok(base64::engine::general_purpose::STANDARD.encode(payload))
}

fn rand_nonce() -> [u8; 12] {
    use rand::RngCore;
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Delete PCI-prohibited fields from a JSON payload in place; returns the
/// removed field names for the audit entry.
pub fn strip_prohibited_fields(payload: &mut Value) -> Vec<String> {
    let mut removed = Vec::new();
    if let Some(obj) = payload.as_object_mut() {
        for field in PCI_PROHIBITED_FIELDS {
            if obj.remove(*field).is_some() {
                removed.push(field.to_string());
            }
        }
    }
    removed
}

/// Pseudonymize listed fields via keyed HMAC-SHA256 (§4.5 GDPR).
pub fn pseudonymize_fields(payload: &mut Value, fields: &[String], salt: &str) -> Vec<String> {
    let mut touched = Vec::new();
    if let Some(obj) = payload.as_object_mut() {
        for field in fields {
            if let Some(Value::String(s)) = obj.get(field) {
                let digest = hmac_hex(salt.as_bytes(), s.as_bytes());
                obj.insert(field.clone(), Value::String(digest));
                touched.push(field.clone());
            }
        }
    }
    touched
}

fn hmac_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// Minimize an analytics payload to an allow-list (§4.5 GDPR).
pub fn minimize_payload(payload: &Value, allow_list: &[String]) -> Value {
    let Some(obj) = payload.as_object() else { return payload.clone() };
    let minimized: serde_json::Map<String, Value> =
        obj.iter().filter(|(k, _)| allow_list.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect();
    Value::Object(minimized)
}

/// Check a consent-requiring field is accompanied by a `consentId` (§4.5 GDPR).
pub fn check_consent(payload: &Value, consent_requiring_fields: &[String]) -> Result<(), GatewayError> {
    let Some(obj) = payload.as_object() else { return Ok(()) };
    for field in consent_requiring_fields {
        if obj.contains_key(field) && !obj.contains_key("consentId") {
            return Err(GatewayError::GdprConsentRequired { field: field.clone() });
        }
    }
    Ok(())
}

/// One factor from {knowledge, possession, inherence} (§4.5 PSD2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaFactor {
    Knowledge,
    Possession,
    Inherence,
}

/// Strong Customer Authentication check: payment/transfer/account-access
/// operations above the threshold need ≥2 distinct factors (§4.5 PSD2).
///
/// Threshold check is per-call, not a cumulative rolling window.
pub fn check_sca(
    operation_category: &str,
    amount: f64,
    threshold: f64,
    factors: &[ScaFactor],
) -> Result<(), GatewayError> {
    let applies = matches!(operation_category, "payment" | "transfer" | "account-access");
    if !applies || amount <= threshold {
        return Ok(());
    }
    let distinct: std::collections::HashSet<_> = factors.iter().collect();
    if distinct.len() >= 2 {
        Ok(())
    } else {
        Err(GatewayError::ScaRequired { amount, threshold })
    }
}

pub const DEFAULT_PSD2_THRESHOLD: f64 = 30.0;

/// One append-only audit entry (§4.5).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: i64,
    pub action: String,
    pub details: Value,
}

/// Pluggable durable sink for audit entries, the `AuditSink` analogue of
/// `telemetry::sinks::TelemetrySink`.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<(), GatewayError>;
}

/// No-op sink, same role as `telemetry::sinks::NullSink`.
#[derive(Default)]
pub struct NullAuditSink;
impl AuditSink for NullAuditSink {
    fn record(&self, _entry: &AuditEntry) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// In-memory ring buffer, secondary to a durable sink (§4.5 "in-memory ring
/// is secondary"). Never drops entries by updating or deleting — eviction
/// only removes the oldest when at capacity.
pub struct AuditRing {
    entries: Mutex<Vec<AuditEntry>>,
    capacity: usize,
}

impl AuditRing {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Mutex::new(Vec::new()), capacity: capacity.max(1) }
    }

    pub fn push(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.remove(0);
        }
        entries.push(entry);
    }

    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

/// Durable sink plus secondary ring, append-only (§4.5).
pub struct AuditLog {
    durable: Box<dyn AuditSink>,
    ring: AuditRing,
    sequence: Mutex<u64>,
}

impl AuditLog {
    pub fn new(durable: Box<dyn AuditSink>) -> Self {
        Self { durable, ring: AuditRing::new(10_000), sequence: Mutex::new(0) }
    }

    pub fn append(&self, action: &str, details: Value, now_epoch_secs: i64) -> Result<AuditEntry, GatewayError> {
        let mut seq = self.sequence.lock().unwrap();
        *seq += 1;
        let entry = AuditEntry {
            id: format!("audit_{:020}", *seq),
            timestamp: now_epoch_secs,
            action: action.to_string(),
            details,
        };
        self.durable.record(&entry)?;
        self.ring.push(entry.clone());
        Ok(entry)
    }

    pub fn recent(&self) -> Vec<AuditEntry> {
        self.ring.snapshot()
    }
}

/// Scrypt-stretch a passphrase into a 32-byte AES key (§4.5.1, §9).
pub fn stretch_passphrase(passphrase: &str, salt: &[u8]) -> Result<[u8; 32], GatewayError> {
    let mut key = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), salt, &scrypt::Params::recommended(), &mut key)
        .map_err(|e| GatewayError::Config(format!("key derivation failed: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(compliance: ComplianceFlags, metadata: &[(&str, &str)]) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "paystack".into(),
            base_url: "https://api.paystack.co".into(),
            authentication: crate::model::AuthConfig { kind: crate::model::AuthType::Bearer, config: HashMap::new() },
            endpoints: vec![],
            capabilities: vec![],
            metadata: metadata.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            compliance,
        }
    }

    #[test]
    fn mask_card_number_preserves_first6_and_last4() {
        let masked = mask_card_number("4242424242424242");
        assert_eq!(masked, "424242******4242");
    }

    #[test]
    fn pci_missing_sensitive_fields_declaration_is_non_compliant() {
        let result = validate_pci(&descriptor(ComplianceFlags::default(), &[]));
        assert!(!result.compliant);
    }

    #[test]
    fn prohibited_fields_are_stripped() {
        let mut payload = serde_json::json!({"cvv2": "123", "amount": 500});
        let removed = strip_prohibited_fields(&mut payload);
        assert_eq!(removed, vec!["cvv2".to_string()]);
        assert!(payload.get("cvv2").is_none());
        assert_eq!(payload["amount"], 500);
    }

    #[test]
    fn pseudonymize_replaces_value_deterministically() {
        let mut a = serde_json::json!({"email": "x@example.com"});
        let mut b = serde_json::json!({"email": "x@example.com"});
        pseudonymize_fields(&mut a, &["email".to_string()], "salt1");
        pseudonymize_fields(&mut b, &["email".to_string()], "salt1");
        assert_eq!(a["email"], b["email"]);
        assert_ne!(a["email"], Value::String("x@example.com".into()));
    }

    #[test]
    fn consent_required_field_without_consent_id_fails() {
        let payload = serde_json::json!({"healthRecord": "data"});
        let err = check_consent(&payload, &["healthRecord".to_string()]).unwrap_err();
        assert_eq!(err.code(), "GDPR_CONSENT_REQUIRED");
    }

    #[test]
    fn sca_requires_two_distinct_factors_above_threshold() {
        let err = check_sca("payment", 100.0, DEFAULT_PSD2_THRESHOLD, &[ScaFactor::Knowledge]).unwrap_err();
        assert_eq!(err.code(), "SCA_REQUIRED");

        check_sca("payment", 100.0, DEFAULT_PSD2_THRESHOLD, &[ScaFactor::Knowledge, ScaFactor::Possession]).unwrap();
    }

    #[test]
    fn sca_not_required_below_threshold() {
        check_sca("payment", 10.0, DEFAULT_PSD2_THRESHOLD, &[]).unwrap();
    }

    #[test]
    fn audit_log_entries_are_append_only_and_ordered() {
        let log = AuditLog::new(Box::new(NullAuditSink));
        log.append("mask", serde_json::json!({"field": "card"}), 1_700_000_000).unwrap();
        log.append("strip", serde_json::json!({"field": "cvv2"}), 1_700_000_001).unwrap();
        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "mask");
        assert_eq!(recent[1].action, "strip");
    }

    #[test]
    fn aggregated_status_is_non_compliant_if_any_validator_fails() {
        let cache = ComplianceCache::new();
        let service = descriptor(ComplianceFlags { pci: true, gdpr: true, ..Default::default() }, &[("gdprPersonalFields", "email")]);
        let result = cache.check(&service, 1_700_000_000);
        assert_eq!(result.status, ComplianceStatus::NonCompliant);
        assert!(!result.results["pci"].compliant);
        assert!(result.results["gdpr"].compliant);
    }
}
