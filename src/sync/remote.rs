//! Remote backend interface for dispatching mutations and fetching
//! canonical entity state.
//!
//! The backend is a relational store exposing per-entity-type
//! fetch/upsert/delete keyed by id, each row carrying a server-assigned
//! `updated_at`. The trait keeps the dispatcher and reconciler testable
//! against an in-memory mock; `HttpBackend` is the production
//! implementation.

use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::mutation::EntityKind;
use crate::config::SyncConfig;

/// Default per-request timeout when the config does not set one.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors from remote backend operations.
///
/// Transient transport problems and server-side rejections are kept
/// apart so callers can log and retry them differently.
#[derive(Debug)]
pub enum RemoteError {
    /// Sync is not configured
    NotConfigured,
    /// Could not reach the backend
    Transport(String),
    /// The request did not complete in time
    Timeout,
    /// The backend refused the request (4xx)
    Rejected { status: u16, message: String },
    /// The backend failed to process the request (5xx)
    Server { status: u16 },
    /// The response body could not be decoded
    Decode(String),
}

impl RemoteError {
    /// Whether a retry without changing the request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport(_) | RemoteError::Timeout | RemoteError::Server { .. }
        )
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::NotConfigured => {
                write!(f, "Sync not configured. Add server_url and api_key to config.")
            }
            RemoteError::Transport(e) => write!(f, "Connection error: {}", e),
            RemoteError::Timeout => write!(f, "Request timed out"),
            RemoteError::Rejected { status, message } => {
                write!(f, "Server rejected the request ({}): {}", status, message)
            }
            RemoteError::Server { status } => write!(f, "Server error (status {})", status),
            RemoteError::Decode(e) => write!(f, "Invalid server response: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Per-entity operations against the remote backend.
///
/// `upsert` must be idempotent by id: dispatch is at-least-once and a
/// retry can re-send a record whose prior attempt partially succeeded.
#[allow(async_fn_in_trait)]
pub trait RemoteBackend {
    /// Fetches the canonical state of an entity; `None` means absent.
    async fn fetch(&self, entity: EntityKind, id: Uuid) -> Result<Option<Value>, RemoteError>;

    /// Creates or replaces an entity by id.
    async fn upsert(&self, entity: EntityKind, id: Uuid, payload: &Value)
        -> Result<(), RemoteError>;

    /// Deletes an entity by id.
    async fn delete(&self, entity: EntityKind, id: Uuid) -> Result<(), RemoteError>;
}

/// HTTP implementation of [`RemoteBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    server_url: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::build(Some(server_url.into()), Some(api_key.into()), timeout)
    }

    /// Builds a backend from config. An unconfigured backend still
    /// constructs; every request then fails with `NotConfigured`, so
    /// enqueueing keeps working offline-only.
    pub fn from_config(config: &SyncConfig) -> Self {
        let timeout = Duration::from_secs(
            config
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        Self::build(config.server_url.clone(), config.api_key.clone(), timeout)
    }

    fn build(server_url: Option<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            server_url,
            api_key,
            client,
        }
    }

    /// Builds an HTTP URL for a given path.
    fn build_http_url(&self, path: &str) -> Result<String, RemoteError> {
        let server_url = self.server_url.as_ref().ok_or(RemoteError::NotConfigured)?;

        // Convert ws(s) to http(s) if needed
        let base_url = if server_url.starts_with("ws://") {
            server_url.replace("ws://", "http://")
        } else if server_url.starts_with("wss://") {
            server_url.replace("wss://", "https://")
        } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            format!("http://{}", server_url)
        } else {
            server_url.clone()
        };

        Ok(format!("{}{}", base_url.trim_end_matches('/'), path))
    }

    fn entity_url(&self, entity: EntityKind, id: Uuid) -> Result<String, RemoteError> {
        self.build_http_url(&format!("/api/{}/{}", entity.table(), id))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Err(RemoteError::Server {
            status: status.as_u16(),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e.to_string())
    }
}

impl RemoteBackend for HttpBackend {
    async fn fetch(&self, entity: EntityKind, id: Uuid) -> Result<Option<Value>, RemoteError> {
        let url = self.entity_url(entity, id)?;
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;
        let payload = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Some(payload))
    }

    async fn upsert(
        &self,
        entity: EntityKind,
        id: Uuid,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        let url = self.entity_url(entity, id)?;
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, entity: EntityKind, id: Uuid) -> Result<(), RemoteError> {
        let url = self.entity_url(entity, id)?;
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}
