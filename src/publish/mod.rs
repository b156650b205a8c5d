//! Translates local pack state into MSC2545 `im.ponies.room_emotes` state
//! events and tracks which rooms have received each pack.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StickerbookError};
use crate::matrix::Transport;
use crate::storage::{CollectionStore, PackStore, UsageKind};

pub const PACK_EVENT_TYPE: &str = "im.ponies.room_emotes";

/// Pack metadata inside the state event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackInfo {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<UsageKind>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub attribution: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMeta {
    pub w: u32,
    pub h: u32,
    pub size: u64,
    pub mimetype: String,
}

/// One image entry, keyed in the payload by its shortcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickerData {
    pub url: String,
    pub body: String,
    /// Present only when the sticker overrides the pack default; omission
    /// tells clients to inherit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<UsageKind>,
    pub info: ImageMeta,
}

/// The full MSC2545 state event content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackContent {
    pub pack: PackInfo,
    pub images: HashMap<String, StickerData>,
}

/// Outcome of a republish-to-all-rooms run.
#[derive(Debug, Clone)]
pub struct RepublishReport {
    pub succeeded: usize,
    pub total: usize,
    /// (room ID, error message) per failed room
    pub errors: Vec<(String, String)>,
}

pub struct Publisher {
    transport: Arc<dyn Transport>,
    collection: CollectionStore,
    packs: PackStore,
}

impl Publisher {
    pub fn new(
        transport: Arc<dyn Transport>,
        collection: CollectionStore,
        packs: PackStore,
    ) -> Self {
        Self {
            transport,
            collection,
            packs,
        }
    }

    /// Build the state event content for a pack from current store state.
    async fn build_content(&self, pack_name: &str) -> Result<PackContent> {
        let pack = self.packs.get(pack_name).await?;
        let stickers = self.collection.list().await?;

        let mut images = HashMap::new();
        for id in &pack.sticker_ids {
            let sticker = stickers
                .iter()
                .find(|s| &s.id == id)
                .ok_or_else(|| StickerbookError::StickerNotFound(id.clone()))?;

            let body = if !sticker.generated_alt_text.is_empty() {
                sticker.generated_alt_text.clone()
            } else {
                sticker.original_body.clone()
            };

            let shortcode = if sticker.name.is_empty() {
                sticker.id.clone()
            } else {
                sticker.name.clone()
            };

            images.insert(
                shortcode,
                StickerData {
                    url: sticker.local_mxc.clone(),
                    body,
                    usage: sticker.usage.clone(),
                    info: ImageMeta {
                        w: sticker.width,
                        h: sticker.height,
                        size: sticker.size_bytes,
                        mimetype: sticker.mime_type.clone(),
                    },
                },
            );
        }

        let usage = if pack.usage.is_empty() {
            vec![UsageKind::Sticker, UsageKind::Emoticon]
        } else {
            pack.usage.clone()
        };

        Ok(PackContent {
            pack: PackInfo {
                display_name: pack.display_name,
                avatar_url: pack.avatar_url,
                usage,
                attribution: pack.attribution,
            },
            images,
        })
    }

    /// Publish a pack to a room and record the delivery in the pack's
    /// publish ledger. A room that already received the pack keeps its
    /// previously used state key, so republication replaces the old event.
    pub async fn publish(&self, pack_name: &str, room_id: &str) -> Result<()> {
        let pack = self.packs.get(pack_name).await?;
        let state_key = pack
            .published_rooms
            .get(room_id)
            .cloned()
            .unwrap_or_else(|| pack.name.clone());

        let content = self.build_content(pack_name).await?;
        self.transport
            .send_state(
                room_id,
                PACK_EVENT_TYPE,
                &state_key,
                serde_json::to_value(&content)?,
            )
            .await?;

        self.packs
            .record_publish(pack_name, room_id, &state_key)
            .await?;

        tracing::info!(pack = pack_name, room = room_id, "Published pack");
        Ok(())
    }

    /// Republish a pack to every room in its ledger, sequentially. A failing
    /// room never blocks the others; failures are collected per room.
    pub async fn republish_all(&self, pack_name: &str) -> Result<RepublishReport> {
        let pack = self.packs.get(pack_name).await?;

        let mut rooms: Vec<String> = pack.published_rooms.keys().cloned().collect();
        rooms.sort();

        let mut report = RepublishReport {
            succeeded: 0,
            total: rooms.len(),
            errors: Vec::new(),
        };

        for room_id in rooms {
            match self.publish(pack_name, &room_id).await {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    tracing::warn!(pack = pack_name, room = %room_id, error = %err, "Republish failed");
                    report.errors.push((room_id, err.to_string()));
                }
            }
        }

        Ok(report)
    }
}
