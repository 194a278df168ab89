//! OAuth token acquisition and caching
//!
//! Tokens are scoped per merchant account and held only in memory; a process
//! restart simply refetches lazily. Concurrent misses for the same account
//! may each fetch a token — last writer wins, which costs at most one
//! redundant OAuth round trip.

use crate::pix::error::{PixError, PixResult};
use crate::pix::transport::Transport;
use crate::pix::types::MerchantAccount;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Fixed client-credentials scope covering recurrence, location and charge
/// read/write.
pub const OAUTH_SCOPE: &str = "rec.write rec.read payloadlocationrec.write \
payloadlocationrec.read cobr.write cobr.read cob.write cob.read";

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

const AUTH_REMEDIATION: &str = "Verify the merchant's Basic credential and that the \
client certificate pair registered with the gateway is present in the certificate store";

/// Time source, injectable so tests can drive expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
}

/// Issues one OAuth client-credentials call. Behind a trait so the cache can
/// be tested without a live gateway.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self, account: &MerchantAccount) -> PixResult<TokenResponse>;
}

/// Fetcher backed by the shared mutual-TLS transport. A handshake rejection
/// walks the transport's fallback ladder before surfacing an auth error —
/// this is the only call allowed to do so.
pub struct OAuthTokenFetcher {
    transport: Arc<Transport>,
}

impl OAuthTokenFetcher {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    async fn post_grant(
        &self,
        client: &reqwest::Client,
        account: &MerchantAccount,
    ) -> Result<PixResult<TokenResponse>, reqwest::Error> {
        let response = client
            .post(&account.oauth_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", account.basic_auth),
            )
            .form(&[("grant_type", "client_credentials"), ("scope", OAUTH_SCOPE)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = extract_gateway_message(&body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Ok(Err(PixError::auth(
                format!("OAuth token request failed: {message}"),
                AUTH_REMEDIATION,
            )));
        }

        Ok(serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
            PixError::auth(
                format!("OAuth response was not valid JSON: {e}"),
                AUTH_REMEDIATION,
            )
        }))
    }
}

#[async_trait]
impl TokenFetcher for OAuthTokenFetcher {
    async fn fetch(&self, account: &MerchantAccount) -> PixResult<TokenResponse> {
        match self.post_grant(self.transport.client(), account).await {
            Ok(result) => result,
            Err(send_err) if Transport::is_handshake_failure(&send_err) => {
                warn!(
                    account = %account.id,
                    error = %send_err,
                    "TLS handshake rejected on the OAuth call; trying fallback profiles"
                );
                for (profile, client) in self.transport.fallback_clients() {
                    match self.post_grant(&client, account).await {
                        Ok(Ok(token)) => {
                            info!(account = %account.id, profile, "OAuth succeeded on fallback profile");
                            return Ok(token);
                        }
                        Ok(Err(e)) => {
                            debug!(account = %account.id, profile, error = %e, "fallback profile rejected");
                        }
                        Err(e) => {
                            debug!(account = %account.id, profile, error = %e, "fallback profile failed to connect");
                        }
                    }
                }
                Err(PixError::auth(
                    format!("gateway rejected the TLS handshake: {send_err}"),
                    AUTH_REMEDIATION,
                ))
            }
            Err(send_err) => Err(PixError::auth(
                format!("OAuth endpoint unreachable: {send_err}"),
                AUTH_REMEDIATION,
            )),
        }
    }
}

fn extract_gateway_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "mensagem", "message", "error"]
        .iter()
        .find_map(|key| value.get(key)?.as_str().map(str::to_string))
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Per-account bearer-token cache with a trailing safety margin.
pub struct TokenCache {
    entries: RwLock<HashMap<String, CachedToken>>,
    fetcher: Arc<dyn TokenFetcher>,
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
}

impl TokenCache {
    pub fn new(fetcher: Arc<dyn TokenFetcher>, clock: Arc<dyn Clock>, safety_margin: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fetcher,
            clock,
            safety_margin,
        }
    }

    pub async fn get_token(&self, account: &MerchantAccount) -> PixResult<String> {
        let now = self.clock.now();
        if let Some(cached) = self
            .entries
            .read()
            .expect("token cache lock poisoned")
            .get(&account.id)
        {
            if cached.expires_at > now {
                debug!(account = %account.id, "token cache hit");
                return Ok(cached.value.clone());
            }
        }

        let response = self.fetcher.fetch(account).await?;
        let ttl = Duration::seconds(response.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));
        let cached = CachedToken {
            value: response.access_token,
            expires_at: now + ttl - self.safety_margin,
        };
        debug!(account = %account.id, expires_at = %cached.expires_at, "token cached");
        self.entries
            .write()
            .expect("token cache lock poisoned")
            .insert(account.id.clone(), cached.clone());
        Ok(cached.value)
    }

    pub fn invalidate(&self, account_id: &str) {
        self.entries
            .write()
            .expect("token cache lock poisoned")
            .remove(account_id);
    }
}
