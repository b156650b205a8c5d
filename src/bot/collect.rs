//! The collection workflow: download, deduplicate, rehost, caption, persist.
//!
//! Single pass, no retries: the first failing step fails the whole attempt.
//! A rehosted copy left behind by a later failure is not rolled back.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Result, StickerbookError};
use crate::matrix::{hash_image, image_info, MxcUri, Transport};
use crate::storage::{CollectionStore, Sticker};
use crate::vision::Captioner;

pub struct Collector {
    transport: Arc<dyn Transport>,
    captioner: Arc<dyn Captioner>,
    collection: CollectionStore,
    /// Server name of the bot's own media origin; media elsewhere gets
    /// rehosted.
    own_server: String,
}

impl Collector {
    pub fn new(
        transport: Arc<dyn Transport>,
        captioner: Arc<dyn Captioner>,
        collection: CollectionStore,
        own_server: String,
    ) -> Self {
        Self {
            transport,
            captioner,
            collection,
            own_server,
        }
    }

    /// Run the full workflow for one image event. Returns the persisted
    /// sticker; re-collecting identical bytes updates the existing record
    /// in place, keeping its shortcode, pack membership, and usage override.
    pub async fn collect(
        &self,
        room_id: &str,
        event_id: &str,
        mxc_uri: &str,
        original_body: &str,
    ) -> Result<Sticker> {
        let source = MxcUri::parse(mxc_uri)?;

        let (data, reported_mime) = self.transport.download(&source).await?;
        if data.is_empty() {
            return Err(StickerbookError::external(
                "media download",
                format!("empty image data for {source}"),
            ));
        }

        // Content ID comes from the raw bytes, before any rehost, so the
        // same image collected from different servers collapses to one
        // record.
        let id = hash_image(&data);

        let mut info = image_info(&data);
        if info.mime_type == "application/octet-stream" {
            if let Some(mime) = reported_mime {
                info.mime_type = mime;
            }
        }

        tracing::info!(
            id = %id,
            width = info.width,
            height = info.height,
            mime = %info.mime_type,
            bytes = info.size_bytes,
            "Collecting sticker"
        );

        let local_mxc = if source.server == self.own_server {
            tracing::debug!(uri = %source, "Already on own homeserver, no rehost");
            source.clone()
        } else {
            let rehosted = self.transport.upload(&data, &info.mime_type).await?;
            tracing::info!(from = %source, to = %rehosted, "Rehosted media");
            rehosted
        };

        let alt_text = normalize_alt_text(&self.captioner.describe(&data, &info.mime_type).await?);
        tracing::info!(alt_text = %alt_text, "Generated alt-text");

        let mut sticker = Sticker {
            name: id.clone(),
            id,
            collected_at: Utc::now(),
            source_room: room_id.to_string(),
            source_event: event_id.to_string(),
            source_mxc: source.to_string(),
            local_mxc: local_mxc.to_string(),
            mime_type: info.mime_type,
            width: info.width,
            height: info.height,
            size_bytes: info.size_bytes,
            original_body: original_body.to_string(),
            generated_alt_text: alt_text,
            in_packs: Vec::new(),
            usage: Vec::new(),
        };

        // Upsert: newest provenance and caption win, but curation state on
        // an existing record survives re-collection.
        if let Ok(existing) = self.collection.get(&sticker.id).await {
            sticker.name = existing.name;
            sticker.in_packs = existing.in_packs;
            sticker.usage = existing.usage;
        }

        self.collection.add(sticker.clone()).await?;
        tracing::info!(id = %sticker.id, "Sticker collected");

        Ok(sticker)
    }
}

/// Collapse all line breaks in generated alt-text to single spaces and trim.
fn normalize_alt_text(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
