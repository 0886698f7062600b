//! Change-feed client: server-pushed row-level notifications.
//!
//! Feed frames carry only identifying information (entity kind, id,
//! parent trip id) — never full entity state, since joined relations in
//! a push payload may be stale. The reconciler re-fetches the canonical
//! row for every upsert notification.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use super::mutation::EntityKind;

/// A row-level notification from the backend feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeEvent {
    Insert {
        entity: EntityKind,
        id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trip_id: Option<Uuid>,
    },
    Update {
        entity: EntityKind,
        id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trip_id: Option<Uuid>,
    },
    Delete {
        entity: EntityKind,
        id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trip_id: Option<Uuid>,
    },
}

impl ChangeEvent {
    pub fn entity(&self) -> EntityKind {
        match self {
            ChangeEvent::Insert { entity, .. }
            | ChangeEvent::Update { entity, .. }
            | ChangeEvent::Delete { entity, .. } => *entity,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert { id, .. }
            | ChangeEvent::Update { id, .. }
            | ChangeEvent::Delete { id, .. } => *id,
        }
    }
}

/// Errors that can occur while consuming the change feed.
#[derive(Debug)]
pub enum FeedError {
    /// Sync is not configured
    NotConfigured,
    /// Failed to connect to server
    ConnectionError(String),
    /// WebSocket error
    WebSocketError(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::NotConfigured => {
                write!(f, "Sync not configured. Add server_url and api_key to config.")
            }
            FeedError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            FeedError::WebSocketError(e) => write!(f, "WebSocket error: {}", e),
        }
    }
}

impl std::error::Error for FeedError {}

/// WebSocket client for the backend change feed.
pub struct FeedClient {
    server_url: String,
    api_key: String,
}

impl FeedClient {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Builds the WebSocket URL for the feed endpoint.
    pub fn build_ws_url(&self) -> String {
        // Convert http(s) to ws(s) if needed
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replace("http://", "ws://")
        } else if self.server_url.starts_with("https://") {
            self.server_url.replace("https://", "wss://")
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/feed?key={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(&self.api_key)
        )
    }

    /// Connects and forwards feed events into `events` until the server
    /// closes the connection or the receiver is dropped.
    ///
    /// Malformed frames are logged and skipped; the feed keeps running.
    pub async fn run(&self, events: mpsc::Sender<ChangeEvent>) -> Result<(), FeedError> {
        let ws_url = self.build_ws_url();
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| FeedError::ConnectionError(e.to_string()))?;

        let (mut sender, mut receiver) = ws_stream.split();
        tracing::info!("change feed connected");

        while let Some(msg_result) = receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ChangeEvent>(&text) {
                    Ok(event) => {
                        tracing::debug!(?event, "feed event");
                        if events.send(event).await.is_err() {
                            // Receiver gone; nothing left to notify.
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring malformed feed frame");
                    }
                },
                Ok(Message::Ping(data)) => {
                    sender
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::WebSocketError(e.to_string()))?;
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("change feed closed by server");
                    break;
                }
                Ok(_) => {
                    // Ignore other message types
                }
                Err(e) => {
                    return Err(FeedError::WebSocketError(e.to_string()));
                }
            }
        }

        Ok(())
    }
}
