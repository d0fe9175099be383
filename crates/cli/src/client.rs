//! API client for the balance extender

use anyhow::{Context, Result};
use balance_lib::models::{HostScore, WorkloadInstance};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// HTTP client for the extender endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid extender URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request whose body is meaningful even on 503
    ///
    /// Returns whether the status was a success along with the decoded body.
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(bool, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let ok = response.status().is_success();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((ok, body))
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("Extender error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn prioritize(&self, request: &PrioritizeRequest) -> Result<Vec<HostScore>> {
        self.post("prioritize", request).await
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrioritizeRequest {
    pub instance: WorkloadInstance,
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
