//! Inbound event model.
//!
//! Sync responses are parsed once, at the transport boundary, into the
//! tagged [`InboundEvent`] shape so nothing downstream ever branches on raw
//! JSON. Sticker and image events sometimes arrive with sparse content from
//! older clients, so extraction falls back to the minimal `url`/`body` pair.

use serde_json::Value;

use crate::error::{Result, StickerbookError};

/// One event from the sync stream, reduced to the shapes the bot acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `m.room.message` with `msgtype: m.text`
    Text {
        room_id: String,
        event_id: String,
        sender: String,
        body: String,
        /// True when the message is an edit (`m.replace` relation)
        is_edit: bool,
    },
    /// `m.room.message` with `msgtype: m.image`
    Image {
        room_id: String,
        event_id: String,
        sender: String,
        url: String,
        body: String,
    },
    /// `m.sticker`
    Sticker {
        room_id: String,
        event_id: String,
        sender: String,
        url: String,
        body: String,
    },
    /// `m.reaction` (annotation on another event)
    Reaction {
        room_id: String,
        event_id: String,
        sender: String,
        /// Event the reaction annotates
        target_event_id: String,
        key: String,
    },
    /// Anything the bot does not act on
    Other,
}

/// Parse one raw timeline event into the tagged shape.
pub fn parse_event(room_id: &str, raw: &Value) -> InboundEvent {
    let event_id = raw["event_id"].as_str().unwrap_or_default().to_string();
    let sender = raw["sender"].as_str().unwrap_or_default().to_string();
    let content = &raw["content"];

    match raw["type"].as_str() {
        Some("m.room.message") => match content["msgtype"].as_str() {
            Some("m.text") => {
                let is_edit = content["m.relates_to"]["rel_type"].as_str() == Some("m.replace");
                InboundEvent::Text {
                    room_id: room_id.to_string(),
                    event_id,
                    sender,
                    body: content["body"].as_str().unwrap_or_default().to_string(),
                    is_edit,
                }
            }
            Some("m.image") => match content["url"].as_str() {
                Some(url) => InboundEvent::Image {
                    room_id: room_id.to_string(),
                    event_id,
                    sender,
                    url: url.to_string(),
                    body: content["body"].as_str().unwrap_or_default().to_string(),
                },
                None => InboundEvent::Other,
            },
            _ => InboundEvent::Other,
        },
        Some("m.sticker") => match content["url"].as_str() {
            Some(url) => InboundEvent::Sticker {
                room_id: room_id.to_string(),
                event_id,
                sender,
                url: url.to_string(),
                body: content["body"].as_str().unwrap_or_default().to_string(),
            },
            None => InboundEvent::Other,
        },
        Some("m.reaction") => {
            let relates = &content["m.relates_to"];
            if relates["rel_type"].as_str() != Some("m.annotation") {
                return InboundEvent::Other;
            }
            match (relates["event_id"].as_str(), relates["key"].as_str()) {
                (Some(target), Some(key)) => InboundEvent::Reaction {
                    room_id: room_id.to_string(),
                    event_id,
                    sender,
                    target_event_id: target.to_string(),
                    key: key.to_string(),
                },
                _ => InboundEvent::Other,
            }
        }
        _ => InboundEvent::Other,
    }
}

/// Extract the MXC URI and body text from a fetched image or sticker event.
/// Fails when the event is neither.
pub fn extract_image_data(raw: &Value) -> Result<(String, String)> {
    let content = &raw["content"];
    let body = content["body"].as_str().unwrap_or_default().to_string();

    match raw["type"].as_str() {
        Some("m.sticker") => {
            let url = content["url"].as_str().ok_or_else(|| {
                StickerbookError::external("image extraction", "sticker missing url field")
            })?;
            Ok((url.to_string(), body))
        }
        Some("m.room.message") => {
            let msgtype = content["msgtype"].as_str().unwrap_or_default();
            if msgtype != "m.image" {
                return Err(StickerbookError::external(
                    "image extraction",
                    format!("message is not an image (msgtype={msgtype})"),
                ));
            }
            let url = content["url"].as_str().ok_or_else(|| {
                StickerbookError::external("image extraction", "message missing url field")
            })?;
            Ok((url.to_string(), body))
        }
        other => Err(StickerbookError::external(
            "image extraction",
            format!("unsupported event type: {}", other.unwrap_or("(none)")),
        )),
    }
}
