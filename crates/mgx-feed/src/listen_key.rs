//! Listen-key lifecycle for the private user-data stream.
//!
//! MEXC authenticates the private WebSocket with a listen key obtained over
//! signed REST and appended to the connection URL. Keys expire after 60
//! minutes unless refreshed with a keepalive PUT.
//!
//! | Operation   | Method | Path              |
//! |-------------|--------|-------------------|
//! | Create key  | POST   | `/userDataStream` |
//! | Keepalive   | PUT    | `/userDataStream` |

use anyhow::{Context, Result, anyhow};
use hmac::{Hmac, Mac};
use mgx_core::time_util;
use sha2::Sha256;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// Signed REST client for listen-key management.
pub struct ListenKeyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl ListenKeyClient {
    pub fn new(base_url: &str, api_key: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
        }
    }

    fn signed_url(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}/userDataStream?{query}&signature={signature}", self.base_url)
    }

    /// Create a fresh listen key.
    pub async fn create(&self) -> Result<String> {
        let url = self.signed_url(&format!("timestamp={}", time_util::now_ms()));

        let body: serde_json::Value = self
            .http
            .post(&url)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await
            .context("create listen key request failed")?
            .error_for_status()
            .context("create listen key HTTP error")?
            .json()
            .await?;

        let key = body
            .get("listenKey")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("listenKey not found in response: {body}"))?
            .to_string();

        info!("[feed] listen key created ({}…)", &key[..key.len().min(10)]);
        Ok(key)
    }

    /// Extend the lifetime of an existing listen key.
    pub async fn keepalive(&self, key: &str) -> Result<()> {
        let url = self.signed_url(&format!(
            "listenKey={key}&timestamp={}",
            time_util::now_ms()
        ));

        self.http
            .put(&url)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await
            .context("listen key keepalive request failed")?
            .error_for_status()
            .context("listen key keepalive HTTP error")?;

        info!("[feed] listen key refreshed");
        Ok(())
    }
}
