use thiserror::Error;

#[derive(Debug, Error)]
pub enum StickerbookError {
    #[error("sticker not found: {0}")]
    StickerNotFound(String),

    #[error("pack not found: {0}")]
    PackNotFound(String),

    #[error("pack already exists: {0}")]
    PackExists(String),

    #[error("cannot create pack named 'unsorted' - this is a reserved name for stickers not in any pack")]
    ReservedName,

    #[error("invalid usage type: {0} (valid: sticker, emoticon, emoji, both, reset)")]
    InvalidUsage(String),

    #[error("invalid shortcode: {0}")]
    InvalidShortcode(String),

    #[error("invalid MXC URI: {0}")]
    InvalidAddress(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A transport or captioning collaborator failed; `step` names the
    /// operation that was in flight when it did.
    #[error("{step} failed: {message}")]
    External { step: &'static str, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StickerbookError {
    /// Wrap a collaborator error with the name of the failed step.
    pub fn external(step: &'static str, err: impl std::fmt::Display) -> Self {
        Self::External {
            step,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StickerbookError>;
