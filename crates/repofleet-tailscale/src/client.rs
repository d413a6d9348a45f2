//! Tailscale API client (reqwest-based).

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{TailscaleError, TailscaleResult};

/// Production API base URL.
pub const API_BASE_URL: &str = "https://api.tailscale.com/api/v2";

/// Default auth-key lifetime.
pub const DEFAULT_KEY_EXPIRY_DAYS: u32 = 90;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed pause after every successful mutating call.
const MUTATION_PACING: Duration = Duration::from_millis(500);

/// Options for issuing a single auth key.
#[derive(Debug, Clone)]
pub struct AuthKeyOptions {
    /// Days until the key expires.
    pub expiry_days: u32,
    /// Allow the key to enroll more than one device.
    pub reusable: bool,
    /// Devices enrolled with the key are ephemeral.
    pub ephemeral: bool,
    /// Devices are pre-authorized into the tailnet.
    pub preauthorized: bool,
    /// ACL tags applied to enrolled devices.
    pub tags: Vec<String>,
}

impl Default for AuthKeyOptions {
    fn default() -> Self {
        Self {
            expiry_days: DEFAULT_KEY_EXPIRY_DAYS,
            reusable: true,
            ephemeral: false,
            preauthorized: true,
            tags: Vec::new(),
        }
    }
}

/// Outcome of bulk key issuance.
#[derive(Debug, Clone, Default)]
pub struct KeyBatch {
    /// Successfully issued keys, in issuance order.
    pub keys: Vec<String>,
    /// Number of attempts that failed.
    pub failed: usize,
}

/// An existing auth key as returned by the list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyInfo {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyListResponse {
    #[serde(default)]
    keys: Vec<KeyInfo>,
}

/// Tailscale API client scoped to one tailnet.
#[derive(Debug, Clone)]
pub struct TailscaleClient {
    base_url: String,
    api_key: String,
    tailnet: String,
    http: Client,
    pacing: Duration,
}

impl TailscaleClient {
    /// Create a new client for the given API key and tailnet.
    pub fn new(api_key: impl Into<String>, tailnet: impl Into<String>) -> TailscaleResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TailscaleError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: API_BASE_URL.to_string(),
            api_key: api_key.into(),
            tailnet: tailnet.into(),
            http,
            pacing: MUTATION_PACING,
        })
    }

    /// Point the client at a different base URL (for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the post-mutation pacing delay (for testing).
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Issue a single auth key and return the opaque key string.
    pub async fn create_auth_key(&self, options: &AuthKeyOptions) -> TailscaleResult<String> {
        debug!(
            tailnet = %self.tailnet,
            expiry_days = options.expiry_days,
            reusable = options.reusable,
            "Issuing auth key"
        );

        let mut create = json!({
            "reusable": options.reusable,
            "ephemeral": options.ephemeral,
            "preauthorized": options.preauthorized,
        });
        if !options.tags.is_empty() {
            create["tags"] = json!(options.tags);
        }
        let payload = json!({
            "capabilities": { "devices": { "create": create } },
            "expirySeconds": u64::from(options.expiry_days) * 24 * 3600,
        });

        let response = self
            .request(Method::POST, self.keys_url())
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: Value = Self::read_json(response).await?;
        let key = body
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| TailscaleError::Parse("response carries no key field".to_string()))?;

        info!(tailnet = %self.tailnet, "Auth key issued");
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        Ok(key.to_string())
    }

    /// Issue `count` auth keys, reporting progress after each attempt.
    ///
    /// Individual failures are collected, not propagated; the call fails
    /// only when not a single key could be issued.
    pub async fn create_auth_keys<F>(
        &self,
        count: usize,
        options: &AuthKeyOptions,
        mut progress: F,
    ) -> TailscaleResult<KeyBatch>
    where
        F: FnMut(usize, usize, &str),
    {
        info!(tailnet = %self.tailnet, count, "Issuing auth keys");
        let mut batch = KeyBatch::default();

        for i in 0..count {
            progress(i + 1, count, &format!("Issuing key {} of {count}", i + 1));
            match self.create_auth_key(options).await {
                Ok(key) => batch.keys.push(key),
                Err(e) => {
                    batch.failed += 1;
                    warn!(attempt = i + 1, error = %e, "Auth key issuance failed");
                }
            }
        }

        if batch.keys.is_empty() {
            return Err(TailscaleError::NoKeysIssued { attempted: count });
        }

        info!(
            issued = batch.keys.len(),
            failed = batch.failed,
            "Auth key issuance finished"
        );
        Ok(batch)
    }

    /// List existing auth keys.
    pub async fn list_keys(&self) -> TailscaleResult<Vec<KeyInfo>> {
        let response = self.request(Method::GET, self.keys_url()).send().await?;
        if response.status().is_success() {
            let list: KeyListResponse = Self::read_json(response).await?;
            Ok(list.keys)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Delete an auth key by ID.
    pub async fn delete_key(&self, key_id: &str) -> TailscaleResult<()> {
        let url = format!("{}/{key_id}", self.keys_url());
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status().is_success() {
            info!(key_id, "Auth key deleted");
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Read-only connectivity and credential check.
    pub async fn test_connection(&self) -> TailscaleResult<()> {
        debug!(tailnet = %self.tailnet, "Testing Tailscale API connection");
        self.list_keys().await.map(|_| ())
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn keys_url(&self) -> String {
        format!("{}/tailnet/{}/keys", self.base_url, self.tailnet)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.api_key)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> TailscaleResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TailscaleError::Parse(e.to_string()))
    }

    async fn error_from(response: Response) -> TailscaleError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                }
            });

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Tailscale API rate limited");
        }
        TailscaleError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
