//! HTTP client for the Cinegate API server.

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Envelope used by every `/api/v1` route.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// Error body rendered by the server for failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    code: String,
    message: String,
}

/// A response whose status is interesting to the caller.
pub struct Reply<T> {
    pub status: StatusCode,
    /// `X-Cache` header, on catalog routes
    pub cache_status: Option<String>,
    pub body: ApiResponse<T>,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode the envelope regardless of status.
    ///
    /// Statuses whose body is not an envelope (429, validation errors) are
    /// turned into an error carrying the server's message.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Reply<T>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .request(method.clone(), &url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = resp.status();
        let cache_status = resp
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await.unwrap_or_default();

        if let Ok(body) = serde_json::from_str::<ApiResponse<T>>(&text) {
            if body.success || body.data.is_some() {
                return Ok(Reply { status, cache_status, body });
            }
        }

        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(err) => match retry_after {
                Some(secs) => anyhow::bail!("{} ({}), retry after {}s", err.error.message, err.error.code, secs),
                None => anyhow::bail!("{} ({})", err.error.message, err.error.code),
            },
            Err(_) => anyhow::bail!("API error ({}): {}", status, text),
        }
    }

    /// GET and return the envelope's data.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        data(self.send(Method::GET, path, query).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        data(self.send(Method::DELETE, path, query).await?)
    }

    /// GET a non-envelope JSON document, such as `/health`.
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        // 503 still carries the health report.
        let status = resp.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

fn data<T>(reply: Reply<T>) -> Result<T> {
    let body = reply.body;
    if !body.success {
        let message = body.error.unwrap_or_else(|| "Unknown error".into());
        match body.error_code {
            Some(code) => anyhow::bail!("API error: {} ({})", message, code),
            None => anyhow::bail!("API error: {}", message),
        }
    }
    body.data
        .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
}
