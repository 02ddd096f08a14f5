//! Per-scheme credential injection for outbound adapter calls (§4.1, §3 "AuthConfig").
//!
//! OAuth2 token refresh is serialized the same way the control-channel
//! transport serializes one in-flight reply per request: the first caller
//! to observe an expired token starts a refresh and hands every other
//! waiter a `oneshot::Receiver` clone point via a shared `watch` channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::Mutex;

use crate::gateway_error::GatewayError;
use crate::model::AuthConfig;

/// A prepared outbound request, mutated in place by [`inject`].
#[derive(Debug, Default)]
pub struct OutboundRequest {
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Exchanges a client secret for a bearer token (§3 "oauth2").
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, config: &HashMap<String, String>) -> Result<CachedToken, GatewayError>;
}

#[derive(Clone, Debug)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    fn is_expired(&self, skew: Duration) -> bool {
        Instant::now() + skew >= self.expires_at
    }
}

enum RefreshState {
    Idle,
    /// A refresh is in flight; waiters subscribe to this channel's next value.
    InProgress(tokio::sync::watch::Receiver<Option<Result<CachedToken, String>>>),
}

/// One entry per service name (§3 "TokenCache: per-client token cache keyed by service").
struct CacheEntry {
    token: Option<CachedToken>,
    state: RefreshState,
}

/// Caches OAuth2 tokens per service and serializes concurrent refreshes.
pub struct TokenCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    skew: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), skew: Duration::from_secs(30) }
    }

    /// Return a valid token for `service`, refreshing via `exchanger` if absent or
    /// near expiry. Concurrent callers for the same service share one refresh.
    pub async fn get_or_refresh(
        &self,
        service: &str,
        config: &HashMap<String, String>,
        exchanger: &dyn TokenExchanger,
    ) -> Result<CachedToken, GatewayError> {
        loop {
            let mut subscribe_to = None;
            {
                let mut entries = self.entries.lock().await;
                let entry = entries
                    .entry(service.to_string())
                    .or_insert_with(|| CacheEntry { token: None, state: RefreshState::Idle });

                if let Some(token) = &entry.token {
                    if !token.is_expired(self.skew) {
                        return Ok(token.clone());
                    }
                }

                match &entry.state {
                    RefreshState::InProgress(rx) => {
                        subscribe_to = Some(rx.clone());
                    }
                    RefreshState::Idle => {
                        let (tx, rx) = tokio::sync::watch::channel(None);
                        entry.state = RefreshState::InProgress(rx);
                        drop(entries);
                        let result = exchanger.exchange(config).await;
                        let mut entries = self.entries.lock().await;
                        let entry = entries.get_mut(service).expect("entry inserted above");
                        entry.state = RefreshState::Idle;
                        match &result {
                            Ok(token) => entry.token = Some(token.clone()),
                            Err(e) => {
                                let _ = tx.send(Some(Err(e.to_string())));
                                return result;
                            }
                        }
                        let _ = tx.send(Some(result.clone().map_err(|e| e.to_string())));
                        return result;
                    }
                }
            }

            if let Some(mut rx) = subscribe_to {
                if rx.changed().await.is_err() {
                    continue;
                }
                match &*rx.borrow() {
                    Some(Ok(token)) => return Ok(token.clone()),
                    Some(Err(message)) => {
                        return Err(GatewayError::AuthFailed { reason: message.clone() })
                    }
                    None => continue,
                }
            }
        }
    }
}

impl Clone for CachedToken {
    fn clone(&self) -> Self {
        Self { access_token: self.access_token.clone(), expires_at: self.expires_at }
    }
}

/// Apply `auth` to `request` per its declared scheme (§3, §4.1 "Authentication injection").
pub async fn inject(
    auth: &AuthConfig,
    request: &mut OutboundRequest,
    cache: &TokenCache,
    exchanger: Option<&dyn TokenExchanger>,
) -> Result<(), GatewayError> {
    use crate::model::AuthType::*;
    match auth.kind {
        None => Ok(()),
        Bearer => {
            let token = require(&auth.config, "token")?;
            request.headers.insert("Authorization".into(), format!("Bearer {token}"));
            Ok(())
        }
        Apikey => {
            let key = require(&auth.config, "apiKey")?;
            let header = auth.config.get("header").map(String::as_str).unwrap_or("X-API-Key");
            request.headers.insert(header.to_string(), key.clone());
            Ok(())
        }
        Basic => {
            let username = require(&auth.config, "username")?;
            let password = require(&auth.config, "password")?;
            let raw = format!("{username}:{password}");
            let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
            request.headers.insert("Authorization".into(), format!("Basic {encoded}"));
            Ok(())
        }
        Hmac => {
            let secret = require(&auth.config, "secret")?;
            let signature = sign_hmac(secret, request)?;
            let header = auth.config.get("header").map(String::as_str).unwrap_or("X-Signature");
            request.headers.insert(header.to_string(), signature);
            Ok(())
        }
        Oauth2 => {
            let exchanger = exchanger.ok_or_else(|| GatewayError::AuthFailed {
                reason: "oauth2 scheme configured without a token exchanger".into(),
            })?;
            let service = auth.config.get("service").cloned().unwrap_or_default();
            let token = cache.get_or_refresh(&service, &auth.config, exchanger).await?;
            request.headers.insert("Authorization".into(), format!("Bearer {}", token.access_token));
            Ok(())
        }
    }
}

fn require<'a>(config: &'a HashMap<String, String>, key: &str) -> Result<&'a String, GatewayError> {
    config.get(key).ok_or_else(|| GatewayError::AuthFailed {
        reason: format!("auth config missing required field: {key}"),
    })
}

fn sign_hmac(secret: &str, request: &OutboundRequest) -> Result<String, GatewayError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::AuthFailed { reason: format!("invalid hmac secret: {e}") })?;
    mac.update(request.method.as_bytes());
    mac.update(request.path.as_bytes());
    mac.update(&request.body);
    let digest = mac.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}
