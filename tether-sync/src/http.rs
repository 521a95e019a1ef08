//! HTTP transport backed by reqwest.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::request::Method;
use crate::transport::{Transport, TransportRequest, TransportResponse};
use async_trait::async_trait;
use reqwest::Client;
use tether_core::CancelToken;
use tracing::debug;

/// Sends requests over HTTP. Canceling the token drops the in-flight request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn exchange(&self, request: TransportRequest) -> SyncResult<TransportResponse> {
        let mut builder = self.client.request(to_reqwest(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("{} {} failed: {e}", request.method, request.url)))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Transport(format!("failed to read response body: {e}")))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: TransportRequest,
        token: &CancelToken,
    ) -> SyncResult<TransportResponse> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("HTTP request aborted by cancel token");
                Err(SyncError::Canceled)
            }
            result = self.exchange(request) => result,
        }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}
