//! Persisted record types for the sticker collection and pack definitions.
//!
//! Field names are stable: `collection.json` and `packs.json` written by an
//! older deployment must round-trip through these types unchanged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::usage::UsageKind;

/// A collected sticker. Identity is the lowercase hex SHA-256 of the raw
/// image bytes; re-collecting identical bytes overwrites this record rather
/// than creating a second one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sticker {
    /// SHA-256 content hash (internal ID)
    pub id: String,
    /// Shortcode name for emoji use (defaults to the content hash)
    pub name: String,
    /// When the sticker was collected
    pub collected_at: DateTime<Utc>,
    /// Room ID where the sticker was found
    pub source_room: String,
    /// Event ID of the original message
    pub source_event: String,
    /// Original MXC URI
    pub source_mxc: String,
    /// Rehosted MXC URI (same as source when no rehost was needed)
    pub local_mxc: String,
    /// Image MIME type
    pub mime_type: String,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// File size in bytes
    pub size_bytes: u64,
    /// Original description/alt-text from the source event
    pub original_body: String,
    /// Generated alt-text
    pub generated_alt_text: String,
    /// Names of packs containing this sticker
    pub in_packs: Vec<String>,
    /// Per-sticker usage override; empty means inherit from pack
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<UsageKind>,
}

/// The whole collection as persisted in `collection.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub stickers: Vec<Sticker>,
}

/// A curated sticker pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pack {
    /// Normalized internal pack name
    pub name: String,
    /// User-facing display name
    pub display_name: String,
    /// Pack icon MXC URI
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
    /// Pack author (Matrix ID)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub attribution: String,
    /// Member sticker IDs, in curation order
    pub sticker_ids: Vec<String>,
    /// Publish ledger: room ID -> state key last used there
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub published_rooms: HashMap<String, String>,
    /// Default usage for the pack; empty means "both" at publish time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<UsageKind>,
}

impl Pack {
    pub fn new(name: String, display_name: String, attribution: String) -> Self {
        Self {
            name,
            display_name,
            avatar_url: String::new(),
            attribution,
            sticker_ids: Vec::new(),
            published_rooms: HashMap::new(),
            usage: Vec::new(),
        }
    }
}

/// All pack definitions as persisted in `packs.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacksData {
    pub packs: Vec<Pack>,
}
