use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use shared::settings::ClientSettings;
use shared::GatewayError;
use url::Url;

use crate::{ByteStream, Gateway, Operation};

/// reqwest-backed gateway addressing every operation at one backend origin.
#[derive(Clone)]
pub struct HttpGateway {
    http: Client,
    origin: Url,
    request_timeout: Duration,
}

impl HttpGateway {
    pub fn new(settings: &ClientSettings) -> Result<Self, GatewayError> {
        let mut origin = Url::parse(settings.backend_url.trim()).map_err(|e| {
            GatewayError::Transport(format!(
                "invalid backend url {:?}: {}",
                settings.backend_url, e
            ))
        })?;
        if origin.cannot_be_a_base() {
            return Err(GatewayError::Transport(format!(
                "backend url {:?} cannot be used as an origin",
                settings.backend_url
            )));
        }
        // endpoints are joined relative to the origin, so a path prefix needs
        // its trailing slash or the last segment would be replaced
        if !origin.path().ends_with('/') {
            let path = format!("{}/", origin.path());
            origin.set_path(&path);
        }

        // No client-wide timeout: it would also cut off long chat streams.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            origin,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn endpoint(&self, operation: Operation) -> Result<Url, GatewayError> {
        self.origin
            .join(operation.as_str())
            .map_err(|e| GatewayError::Transport(format!("invalid endpoint for {}: {}", operation, e)))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn call(&self, operation: Operation, payload: Value) -> Result<Value, GatewayError> {
        let url = self.endpoint(operation)?;
        tracing::debug!(%operation, %url, "calling backend");

        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let err = server_error(operation, status, &body);
            tracing::warn!(%operation, status = status.as_u16(), "backend call failed");
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::Transport(format!("malformed {} response: {}", operation, e))
        })
    }

    async fn stream(&self, operation: Operation, payload: Value) -> Result<ByteStream, GatewayError> {
        let url = self.endpoint(operation)?;
        tracing::debug!(%operation, %url, "opening stream");

        let resp = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(read_server_error(operation, resp).await);
        }

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport_error));
        Ok(body.boxed())
    }
}

async fn read_server_error(operation: Operation, resp: Response) -> GatewayError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(%operation, status = status.as_u16(), "backend refused stream");
    server_error(operation, status, &body)
}

/// Non-success reply: prefer the backend's `error` field, else the
/// operation's generic message.
fn server_error(operation: Operation, status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| operation.fallback_message().to_string());
    GatewayError::Server {
        status: status.as_u16(),
        message,
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    let description = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "could not connect to backend".to_string()
    } else if e.is_body() || e.is_decode() {
        format!("response body interrupted: {}", e)
    } else {
        e.to_string()
    };
    GatewayError::Transport(description)
}
