//! HTTP client for the remote audit sink.

use async_trait::async_trait;
use custos_types::{AuditEntry, RemoteSink, RemoteSinkError};

/// Remote sink that upserts entries over HTTP: `PUT {base}/audit/entries/{id}`.
///
/// Keying the request by entry id makes concurrent retries from multiple
/// instances safe; the sink stores at most one record per id.
pub struct HttpRemoteSink {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteSink {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("CUSTOS_SINK_URL")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let api_key = std::env::var("CUSTOS_SINK_API_KEY").ok();
        Self::new(base_url, api_key)
    }
}

#[async_trait]
impl RemoteSink for HttpRemoteSink {
    async fn send(&self, entry: &AuditEntry) -> Result<(), RemoteSinkError> {
        let url = format!("{}/audit/entries/{}", self.base_url, entry.id);
        let mut req = self.client.put(&url).json(entry);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req
            .send()
            .await
            .map_err(|e| RemoteSinkError::Unavailable(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RemoteSinkError::Other(format!(
                "sink rejected entry {}: {} {}",
                entry.id, status, body
            )));
        }
        Ok(())
    }
}
