//! Usage-token parsing and resolution.
//!
//! A usage set says where a sticker may be offered: as a sticker, as an
//! emoticon, or both. Stickers may override their pack's default; "reset"
//! clears an override so the pack default applies again.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StickerbookError};

use super::types::{Pack, Sticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Sticker,
    Emoticon,
}

/// Parse a user-supplied usage token into a canonical usage set.
///
/// Accepts `sticker`, `emoticon`, `emoji` (synonym for emoticon), `both`,
/// and `reset`. Returns `None` for `reset`, which clears an override.
pub fn parse_usage(input: &str) -> Result<Option<Vec<UsageKind>>> {
    match input.trim().to_lowercase().as_str() {
        "sticker" => Ok(Some(vec![UsageKind::Sticker])),
        "emoticon" | "emoji" => Ok(Some(vec![UsageKind::Emoticon])),
        "both" => Ok(Some(vec![UsageKind::Sticker, UsageKind::Emoticon])),
        "reset" => Ok(None),
        other => Err(StickerbookError::InvalidUsage(other.to_string())),
    }
}

/// Render a usage set for user display.
pub fn format_usage(usage: &[UsageKind]) -> String {
    if usage.is_empty() {
        return "(not set)".to_string();
    }

    let has_sticker = usage.contains(&UsageKind::Sticker);
    let has_emoticon = usage.contains(&UsageKind::Emoticon);

    match (has_sticker, has_emoticon) {
        (true, true) => "both".to_string(),
        (true, false) => "sticker".to_string(),
        (false, true) => "emoticon".to_string(),
        // Unreachable with a non-empty set, but keep the match total.
        (false, false) => "(not set)".to_string(),
    }
}

/// Resolve the effective usage for a sticker in the context of a pack:
/// sticker override, else pack default, else both.
pub fn resolve_usage(sticker: &Sticker, pack: &Pack) -> Vec<UsageKind> {
    if !sticker.usage.is_empty() {
        return sticker.usage.clone();
    }
    if !pack.usage.is_empty() {
        return pack.usage.clone();
    }
    vec![UsageKind::Sticker, UsageKind::Emoticon]
}

/// Check that a shortcode name is usable as an emoji key: 1-64 characters
/// from `[A-Za-z0-9_-]`.
pub fn validate_shortcode(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StickerbookError::InvalidShortcode(
            "shortcode cannot be empty".to_string(),
        ));
    }
    if name.len() > 64 {
        return Err(StickerbookError::InvalidShortcode(
            "shortcode too long (max 64 characters)".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StickerbookError::InvalidShortcode(
            "shortcode must contain only letters, numbers, underscores, and hyphens".to_string(),
        ));
    }
    Ok(())
}
