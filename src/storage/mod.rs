//! Persistent storage for collected stickers and curated packs.
//!
//! Two JSON files live in the data directory: `collection.json` (every
//! collected sticker) and `packs.json` (pack definitions plus their publish
//! ledgers).

mod collection;
mod packs;
mod types;
mod usage;

pub use collection::CollectionStore;
pub use packs::{normalize_pack_name, PackStore, UNSORTED};
pub use types::{Collection, Pack, PacksData, Sticker};
pub use usage::{format_usage, parse_usage, resolve_usage, validate_shortcode, UsageKind};
