//! Startup configuration (§6 Environment variables).
//!
//! Layered the way the rest of this codebase treats startup state: parsed
//! once into an immutable snapshot and shared via `Arc`, never mutated except
//! through an explicit managed reload.

use std::collections::HashMap;
use std::env;

use crate::gateway_error::GatewayError;

/// Parsed `ENCRYPTION_KEY` — either a hex-encoded 32-byte key or a passphrase
/// that must be stretched with `scrypt` at the call site (§9, §4.5.1).
#[derive(Clone)]
pub enum EncryptionKeySource {
    Hex32([u8; 32]),
    Passphrase(String),
}

impl std::fmt::Debug for EncryptionKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hex32(_) => write!(f, "EncryptionKeySource::Hex32(<redacted>)"),
            Self::Passphrase(_) => write!(f, "EncryptionKeySource::Passphrase(<redacted>)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_secs: 60, max_requests: 120 }
    }
}

/// Immutable process-wide configuration, built once at startup.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub encryption_key: Option<EncryptionKeySourceDebugOnly>,
    pub pseudonym_salt: String,
    pub auth_gateway_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub service_base_url_overrides: HashMap<String, String>,
}

/// Wrapper so `GatewayConfig` can derive `Debug` without the key ever
/// printing; the real enum lives in [`EncryptionKeySource`].
#[derive(Clone)]
pub struct EncryptionKeySourceDebugOnly(pub EncryptionKeySource);

impl std::fmt::Debug for EncryptionKeySourceDebugOnly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl GatewayConfig {
    /// Load configuration from process environment variables.
    ///
    /// Missing optional variables fall back to documented defaults; a
    /// malformed `ENCRYPTION_KEY` hex string is treated as a passphrase
    /// rather than rejected, matching §6's "hex 32B or passphrase" contract.
    pub fn from_env() -> Result<Self, GatewayError> {
        let port = env::var("PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .map_err(|e| GatewayError::Config(format!("invalid PORT: {e}")))?
            .unwrap_or(8080);

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let encryption_key = env::var("ENCRYPTION_KEY").ok().map(|raw| {
            EncryptionKeySourceDebugOnly(parse_encryption_key(&raw))
        });

        let pseudonym_salt = env::var("PSEUDONYM_SALT").unwrap_or_else(|_| "default-pseudonym-salt".into());

        let auth_gateway_url = env::var("AUTH_GATEWAY_URL").ok();

        let rate_limit = RateLimitConfig {
            window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        };

        let service_base_url_overrides = env::vars()
            .filter_map(|(k, v)| {
                k.strip_suffix("_BASE_URL_OVERRIDE").map(|svc| (svc.to_lowercase(), v))
            })
            .collect();

        Ok(Self {
            port,
            allowed_origins,
            encryption_key,
            pseudonym_salt,
            auth_gateway_url,
            rate_limit,
            service_base_url_overrides,
        })
    }
}

fn parse_encryption_key(raw: &str) -> EncryptionKeySource {
    if raw.len() == 64 {
        if let Ok(bytes) = hex_decode(raw) {
            if bytes.len() == 32 {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                return EncryptionKeySource::Hex32(arr);
            }
        }
    }
    EncryptionKeySource::Passphrase(raw.to_string())
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

/// One entry in `catalog.json`'s `services[]` array (§6).
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name: String,
    pub directory: String,
    pub config_file: String,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct ServiceCatalog {
    pub services: Vec<CatalogEntry>,
}

impl ServiceCatalog {
    /// Parse `catalog.json`'s contents. Does not touch the filesystem itself —
    /// callers read the file and hand over the bytes, so tests can exercise
    /// this without a real directory tree.
    pub fn parse(bytes: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_key_of_right_length_parses_as_hex32() {
        let hex = "a".repeat(64);
        match parse_encryption_key(&hex) {
            EncryptionKeySource::Hex32(bytes) => assert_eq!(bytes.len(), 32),
            EncryptionKeySource::Passphrase(_) => panic!("expected Hex32"),
        }
    }

    #[test]
    fn non_hex_string_falls_back_to_passphrase() {
        match parse_encryption_key("correct horse battery staple") {
            EncryptionKeySource::Passphrase(p) => assert_eq!(p, "correct horse battery staple"),
            EncryptionKeySource::Hex32(_) => panic!("expected Passphrase"),
        }
    }

    #[test]
    fn short_hex_like_string_falls_back_to_passphrase() {
        match parse_encryption_key("deadbeef") {
            EncryptionKeySource::Passphrase(_) => {}
            EncryptionKeySource::Hex32(_) => panic!("8-byte string should not parse as a 32-byte key"),
        }
    }

    #[test]
    fn catalog_parses_services_array() {
        let json = br#"{"services":[{"name":"paystack","directory":"paystack","configFile":"paystack.json"}]}"#;
        let catalog = ServiceCatalog::parse(json).unwrap();
        assert_eq!(catalog.services.len(), 1);
        assert_eq!(catalog.services[0].name, "paystack");
    }
}
