//! The pack store: named, ordered curation groups persisted as `packs.json`.
//!
//! Membership is bidirectional: a sticker ID sits in `Pack.sticker_ids` iff
//! the pack name sits in that sticker's `in_packs`. Every membership mutation
//! rewrites both `packs.json` and `collection.json` in the same operation so
//! the two never observably disagree.

use std::path::{Path, PathBuf};

use crate::error::{Result, StickerbookError};

use super::collection::{load_collection, save_collection};
use super::types::{Pack, PacksData};
use super::usage::UsageKind;

/// Reserved name denoting the virtual set of stickers not in any pack.
pub const UNSORTED: &str = "unsorted";

/// Normalize a user-supplied pack name: case-folded, spaces to hyphens.
pub fn normalize_pack_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

async fn load_packs(data_dir: &Path) -> Result<PacksData> {
    let path = data_dir.join("packs.json");
    if !path.exists() {
        return Ok(PacksData::default());
    }

    let contents = tokio::fs::read_to_string(&path).await?;
    let packs = serde_json::from_str(&contents)?;
    Ok(packs)
}

async fn save_packs(data_dir: &Path, packs: &PacksData) -> Result<()> {
    tokio::fs::create_dir_all(data_dir).await?;

    let json = serde_json::to_string_pretty(packs)?;
    tokio::fs::write(data_dir.join("packs.json"), json).await?;

    tracing::debug!("Saved packs ({} packs)", packs.packs.len());
    Ok(())
}

/// Store handle for pack definitions.
#[derive(Debug, Clone)]
pub struct PackStore {
    data_dir: PathBuf,
}

impl PackStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Create a new empty pack. The name is normalized before storage;
    /// duplicates and the reserved "unsorted" name are rejected.
    pub async fn create(
        &self,
        name: &str,
        display_name: &str,
        attribution: &str,
    ) -> Result<Pack> {
        let normalized = normalize_pack_name(name);
        if normalized == UNSORTED {
            return Err(StickerbookError::ReservedName);
        }

        let mut data = load_packs(&self.data_dir).await?;
        if data.packs.iter().any(|p| p.name == normalized) {
            return Err(StickerbookError::PackExists(normalized));
        }

        let pack = Pack::new(
            normalized,
            display_name.to_string(),
            attribution.to_string(),
        );
        data.packs.push(pack.clone());
        save_packs(&self.data_dir, &data).await?;

        Ok(pack)
    }

    pub async fn get(&self, name: &str) -> Result<Pack> {
        let data = load_packs(&self.data_dir).await?;
        data.packs
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StickerbookError::PackNotFound(name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Pack>> {
        let data = load_packs(&self.data_dir).await?;
        Ok(data.packs)
    }

    /// Add stickers to a pack, updating both sides of the membership link.
    ///
    /// IDs are validated and applied one at a time in caller order: when an
    /// ID is missing from the collection, updates for earlier IDs in the same
    /// call are persisted before the error is returned. Adding an ID that is
    /// already a member is a no-op for that ID.
    pub async fn add_members(&self, pack_name: &str, sticker_ids: &[String]) -> Result<()> {
        let mut data = load_packs(&self.data_dir).await?;
        let mut collection = load_collection(&self.data_dir).await?;

        let pack = data
            .packs
            .iter_mut()
            .find(|p| p.name == pack_name)
            .ok_or_else(|| StickerbookError::PackNotFound(pack_name.to_string()))?;

        let mut failed = None;
        for id in sticker_ids {
            let Some(sticker) = collection.stickers.iter_mut().find(|s| &s.id == id) else {
                failed = Some(StickerbookError::StickerNotFound(id.clone()));
                break;
            };

            if !pack.sticker_ids.contains(id) {
                pack.sticker_ids.push(id.clone());
            }
            if !sticker.in_packs.contains(&pack.name) {
                sticker.in_packs.push(pack.name.clone());
            }
        }

        save_collection(&self.data_dir, &collection).await?;
        save_packs(&self.data_dir, &data).await?;

        match failed {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove stickers from a pack. Removing an ID that is not a member is
    /// silently a no-op; only a missing pack is an error.
    pub async fn remove_members(&self, pack_name: &str, sticker_ids: &[String]) -> Result<()> {
        let mut data = load_packs(&self.data_dir).await?;
        let mut collection = load_collection(&self.data_dir).await?;

        let pack = data
            .packs
            .iter_mut()
            .find(|p| p.name == pack_name)
            .ok_or_else(|| StickerbookError::PackNotFound(pack_name.to_string()))?;

        pack.sticker_ids.retain(|id| !sticker_ids.contains(id));

        for sticker in collection
            .stickers
            .iter_mut()
            .filter(|s| sticker_ids.contains(&s.id))
        {
            sticker.in_packs.retain(|p| p != pack_name);
        }

        save_collection(&self.data_dir, &collection).await?;
        save_packs(&self.data_dir, &data).await
    }

    pub async fn set_avatar(&self, pack_name: &str, avatar_url: &str) -> Result<()> {
        self.modify(pack_name, |p| p.avatar_url = avatar_url.to_string())
            .await
    }

    /// Set or clear the pack-wide default usage (`None` resets it).
    pub async fn set_default_usage(
        &self,
        pack_name: &str,
        usage: Option<Vec<UsageKind>>,
    ) -> Result<()> {
        self.modify(pack_name, |p| p.usage = usage.unwrap_or_default())
            .await
    }

    /// Record that a pack was published to a room under the given state key.
    pub async fn record_publish(
        &self,
        pack_name: &str,
        room_id: &str,
        state_key: &str,
    ) -> Result<()> {
        self.modify(pack_name, |p| {
            p.published_rooms
                .insert(room_id.to_string(), state_key.to_string());
        })
        .await
    }

    async fn modify(&self, pack_name: &str, apply: impl FnOnce(&mut Pack)) -> Result<()> {
        let mut data = load_packs(&self.data_dir).await?;

        let pack = data
            .packs
            .iter_mut()
            .find(|p| p.name == pack_name)
            .ok_or_else(|| StickerbookError::PackNotFound(pack_name.to_string()))?;
        apply(pack);

        save_packs(&self.data_dir, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::collection::CollectionStore;
    use chrono::Utc;

    fn sample_sticker(id: &str) -> crate::storage::types::Sticker {
        crate::storage::types::Sticker {
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
            original_body: String::new(),
            generated_alt_text: String::new(),
            in_packs: Vec::new(),
            usage: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_pack_name() {
        assert_eq!(normalize_pack_name("Funny Memes"), "funny-memes");
        assert_eq!(normalize_pack_name("  Cats  "), "cats");
        assert_eq!(normalize_pack_name("already-fine"), "already-fine");
    }

    #[tokio::test]
    async fn test_create_normalizes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackStore::new(dir.path());

        let pack = store
            .create("Funny Memes", "Funny Memes", "@me:example.org")
            .await
            .unwrap();
        assert_eq!(pack.name, "funny-memes");

        let loaded = store.get("funny-memes").await.unwrap();
        assert_eq!(loaded, pack);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackStore::new(dir.path());

        store.create("cats", "Cats", "").await.unwrap();
        let err = store.create("Cats", "Cats", "").await.unwrap_err();
        assert!(matches!(err, StickerbookError::PackExists(_)));
    }

    #[tokio::test]
    async fn test_create_unsorted_is_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackStore::new(dir.path());

        let err = store.create("Unsorted", "Unsorted", "").await.unwrap_err();
        assert!(matches!(err, StickerbookError::ReservedName));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_members_updates_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());
        let collection = CollectionStore::new(dir.path());

        collection.add(sample_sticker("abc")).await.unwrap();
        packs.create("favourites", "Favourites", "").await.unwrap();

        packs
            .add_members("favourites", &["abc".to_string()])
            .await
            .unwrap();

        assert_eq!(
            packs.get("favourites").await.unwrap().sticker_ids,
            vec!["abc"]
        );
        assert_eq!(
            collection.get("abc").await.unwrap().in_packs,
            vec!["favourites"]
        );
    }

    #[tokio::test]
    async fn test_add_members_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());
        let collection = CollectionStore::new(dir.path());

        collection.add(sample_sticker("abc")).await.unwrap();
        packs.create("cats", "Cats", "").await.unwrap();

        packs.add_members("cats", &["abc".to_string()]).await.unwrap();
        packs.add_members("cats", &["abc".to_string()]).await.unwrap();

        assert_eq!(packs.get("cats").await.unwrap().sticker_ids.len(), 1);
        assert_eq!(collection.get("abc").await.unwrap().in_packs.len(), 1);
    }

    #[tokio::test]
    async fn test_add_members_missing_sticker_keeps_earlier_adds() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());
        let collection = CollectionStore::new(dir.path());

        collection.add(sample_sticker("abc")).await.unwrap();
        packs.create("cats", "Cats", "").await.unwrap();

        let err = packs
            .add_members("cats", &["abc".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StickerbookError::StickerNotFound(_)));

        // The valid ID before the failure was still applied and persisted.
        assert_eq!(packs.get("cats").await.unwrap().sticker_ids, vec!["abc"]);
        assert_eq!(collection.get("abc").await.unwrap().in_packs, vec!["cats"]);
    }

    #[tokio::test]
    async fn test_add_members_missing_pack() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());

        let err = packs
            .add_members("nope", &["abc".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StickerbookError::PackNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_members_and_nonmember_noop() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());
        let collection = CollectionStore::new(dir.path());

        collection.add(sample_sticker("abc")).await.unwrap();
        packs.create("cats", "Cats", "").await.unwrap();
        packs.add_members("cats", &["abc".to_string()]).await.unwrap();

        // Removing an ID that was never added is not an error.
        packs
            .remove_members("cats", &["never-added".to_string()])
            .await
            .unwrap();
        assert_eq!(packs.get("cats").await.unwrap().sticker_ids, vec!["abc"]);

        packs
            .remove_members("cats", &["abc".to_string()])
            .await
            .unwrap();
        assert!(packs.get("cats").await.unwrap().sticker_ids.is_empty());
        assert!(collection.get("abc").await.unwrap().in_packs.is_empty());
    }

    #[tokio::test]
    async fn test_record_publish_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());

        packs.create("cats", "Cats", "").await.unwrap();
        packs
            .record_publish("cats", "!room:example.org", "cats")
            .await
            .unwrap();

        let pack = packs.get("cats").await.unwrap();
        assert_eq!(
            pack.published_rooms.get("!room:example.org"),
            Some(&"cats".to_string())
        );
    }

    #[tokio::test]
    async fn test_set_avatar_and_default_usage() {
        let dir = tempfile::tempdir().unwrap();
        let packs = PackStore::new(dir.path());

        packs.create("cats", "Cats", "").await.unwrap();
        packs
            .set_avatar("cats", "mxc://example.org/icon")
            .await
            .unwrap();
        packs
            .set_default_usage("cats", Some(vec![UsageKind::Sticker]))
            .await
            .unwrap();

        let pack = packs.get("cats").await.unwrap();
        assert_eq!(pack.avatar_url, "mxc://example.org/icon");
        assert_eq!(pack.usage, vec![UsageKind::Sticker]);

        packs.set_default_usage("cats", None).await.unwrap();
        assert!(packs.get("cats").await.unwrap().usage.is_empty());
    }
}
