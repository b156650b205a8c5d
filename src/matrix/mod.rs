//! Matrix transport layer.
//!
//! The engine talks to Matrix only through the [`Transport`] trait: download
//! and upload media, fetch and send events, redact, publish state, and pull
//! the next sync batch. [`MatrixClient`] implements it over the client-server
//! HTTP API; tests substitute in-memory mocks.

mod client;
mod events;
mod media;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use client::{server_name_of_user, MatrixClient};
pub use events::{extract_image_data, parse_event, InboundEvent};
pub use media::{detect_mime_type, hash_image, image_info, is_image_mime_type, ImageInfo, MxcUri};

/// One response from the sync endpoint: the events to act on plus the
/// checkpoint token to resume from next time.
#[derive(Debug, Clone, Default)]
pub struct SyncBatch {
    pub next_batch: String,
    pub events: Vec<InboundEvent>,
}

/// The Matrix operations the engine consumes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Download media bytes plus the server-reported MIME type, if any.
    async fn download(&self, uri: &MxcUri) -> Result<(Vec<u8>, Option<String>)>;

    /// Upload bytes to the bot's own homeserver; returns the new MXC URI.
    async fn upload(&self, data: &[u8], mime_type: &str) -> Result<MxcUri>;

    /// Fetch a single event as raw JSON.
    async fn get_event(&self, room_id: &str, event_id: &str) -> Result<Value>;

    /// Send a plain-text message; returns the new event ID.
    async fn send_message(&self, room_id: &str, body: &str) -> Result<String>;

    /// Replace an earlier message's body via an `m.replace` edit.
    async fn edit_message(&self, room_id: &str, event_id: &str, new_body: &str) -> Result<String>;

    /// Redact an event.
    async fn redact(&self, room_id: &str, event_id: &str) -> Result<()>;

    /// Send a state event with the given type and state key.
    async fn send_state(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<()>;

    /// Long-poll the next batch of timeline events.
    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> Result<SyncBatch>;
}
