//! The collection store: every sticker the bot has collected, persisted as
//! `collection.json` in the data directory.
//!
//! Every operation is a full load-modify-save cycle. There is no in-memory
//! cache between calls, so a restarted process always sees current state.
//! Callers must not interleave mutating calls without external serialization.

use std::path::{Path, PathBuf};

use crate::error::{Result, StickerbookError};

use super::types::{Collection, Sticker};
use super::usage::UsageKind;

pub(super) async fn load_collection(data_dir: &Path) -> Result<Collection> {
    let path = data_dir.join("collection.json");
    if !path.exists() {
        return Ok(Collection::default());
    }

    let contents = tokio::fs::read_to_string(&path).await?;
    let collection = serde_json::from_str(&contents)?;
    Ok(collection)
}

pub(super) async fn save_collection(data_dir: &Path, collection: &Collection) -> Result<()> {
    tokio::fs::create_dir_all(data_dir).await?;

    let json = serde_json::to_string_pretty(collection)?;
    tokio::fs::write(data_dir.join("collection.json"), json).await?;

    tracing::debug!("Saved collection ({} stickers)", collection.stickers.len());
    Ok(())
}

/// Store handle for the sticker collection.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    data_dir: PathBuf,
}

impl CollectionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Upsert a sticker by content ID. An existing record with the same ID
    /// is overwritten in place; otherwise the sticker is appended.
    pub async fn add(&self, sticker: Sticker) -> Result<()> {
        let mut collection = load_collection(&self.data_dir).await?;

        if let Some(existing) = collection.stickers.iter_mut().find(|s| s.id == sticker.id) {
            *existing = sticker;
        } else {
            collection.stickers.push(sticker);
        }

        save_collection(&self.data_dir, &collection).await
    }

    pub async fn get(&self, id: &str) -> Result<Sticker> {
        let collection = load_collection(&self.data_dir).await?;
        collection
            .stickers
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StickerbookError::StickerNotFound(id.to_string()))
    }

    /// All collected stickers, in backing-store insertion order.
    pub async fn list(&self) -> Result<Vec<Sticker>> {
        let collection = load_collection(&self.data_dir).await?;
        Ok(collection.stickers)
    }

    pub async fn update_alt_text(&self, id: &str, alt_text: &str) -> Result<()> {
        self.modify(id, |s| s.generated_alt_text = alt_text.to_string())
            .await
    }

    /// Set or clear the per-sticker usage override (`None` resets it).
    pub async fn set_usage(&self, id: &str, usage: Option<Vec<UsageKind>>) -> Result<()> {
        self.modify(id, |s| s.usage = usage.unwrap_or_default())
            .await
    }

    pub async fn set_name(&self, id: &str, name: &str) -> Result<()> {
        self.modify(id, |s| s.name = name.to_string()).await
    }

    /// Remove a sticker. Returns the names of the packs it belonged to so
    /// the caller can cascade membership cleanup.
    pub async fn delete(&self, id: &str) -> Result<Vec<String>> {
        let mut collection = load_collection(&self.data_dir).await?;

        let index = collection
            .stickers
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| StickerbookError::StickerNotFound(id.to_string()))?;

        let removed = collection.stickers.remove(index);
        save_collection(&self.data_dir, &collection).await?;

        Ok(removed.in_packs)
    }

    async fn modify(&self, id: &str, apply: impl FnOnce(&mut Sticker)) -> Result<()> {
        let mut collection = load_collection(&self.data_dir).await?;

        let sticker = collection
            .stickers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StickerbookError::StickerNotFound(id.to_string()))?;
        apply(sticker);

        save_collection(&self.data_dir, &collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_sticker(id: &str) -> Sticker {
        Sticker {
            id: id.to_string(),
            name: id.to_string(),
            collected_at: Utc::now(),
            source_room: "!room:example.org".to_string(),
            source_event: "$event".to_string(),
            source_mxc: "mxc://example.org/abc".to_string(),
            local_mxc: "mxc://local.example/abc".to_string(),
            mime_type: "image/png".to_string(),
            width: 128,
            height: 128,
            size_bytes: 1024,
            original_body: "a sticker".to_string(),
            generated_alt_text: "A happy cat".to_string(),
            in_packs: Vec::new(),
            usage: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());

        let sticker = sample_sticker("aaa");
        store.add(sticker.clone()).await.unwrap();

        let loaded = store.get("aaa").await.unwrap();
        assert_eq!(loaded, sticker);
    }

    #[tokio::test]
    async fn test_add_same_id_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());

        store.add(sample_sticker("aaa")).await.unwrap();

        let mut updated = sample_sticker("aaa");
        updated.generated_alt_text = "New alt-text".to_string();
        store.add(updated).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].generated_alt_text, "New alt-text");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());

        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(
            err,
            StickerbookError::StickerNotFound(ref id) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());

        store.add(sample_sticker("one")).await.unwrap();
        store.add(sample_sticker("two")).await.unwrap();
        store.add(sample_sticker("three")).await.unwrap();

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_mutators_require_existing_sticker() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());

        assert!(store.update_alt_text("x", "alt").await.is_err());
        assert!(store.set_usage("x", None).await.is_err());
        assert!(store.set_name("x", "name").await.is_err());
        assert!(store.delete("x").await.is_err());
    }

    #[tokio::test]
    async fn test_set_and_reset_usage() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());
        store.add(sample_sticker("aaa")).await.unwrap();

        store
            .set_usage("aaa", Some(vec![UsageKind::Emoticon]))
            .await
            .unwrap();
        assert_eq!(
            store.get("aaa").await.unwrap().usage,
            vec![UsageKind::Emoticon]
        );

        store.set_usage("aaa", None).await.unwrap();
        assert!(store.get("aaa").await.unwrap().usage.is_empty());
    }

    #[tokio::test]
    async fn test_delete_returns_pack_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());

        let mut sticker = sample_sticker("aaa");
        sticker.in_packs = vec!["cats".to_string(), "memes".to_string()];
        store.add(sticker).await.unwrap();

        let packs = store.delete("aaa").await.unwrap();
        assert_eq!(packs, vec!["cats", "memes"]);
        assert!(store.get("aaa").await.is_err());
    }
}
