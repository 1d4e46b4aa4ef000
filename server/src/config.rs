//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the extension table JSON (bundled table when unset)
    pub types_path: Option<PathBuf>,

    /// Edge length of square listing thumbnails (default: 32)
    pub thumbnail_size: u32,

    /// Height of gallery and upload previews (default: 240)
    pub preview_height: u32,

    /// Upper bound for the single-image viewer preview (default: 1280)
    pub max_preview_height: u32,

    /// Largest payload the codec will attempt to decode (default: 50MB)
    pub max_processable_size: usize,

    /// Maximum decoded width or height, guards against decompression bombs
    pub max_image_dimension: u32,

    /// Per-record derivation timeout inside a batch (default: 30s)
    pub derive_timeout: Duration,

    /// Number of derivations a batch runs at once
    pub batch_concurrency: usize,

    /// Thumbnail source used for non-image files and failed derivations
    pub file_icon_src: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default_for_test();

        Ok(Self {
            types_path: env::var("TYPES_PATH").ok().map(PathBuf::from),
            thumbnail_size: parse_var("THUMBNAIL_SIZE")?.unwrap_or(defaults.thumbnail_size),
            preview_height: parse_var("PREVIEW_HEIGHT")?.unwrap_or(defaults.preview_height),
            max_preview_height: parse_var("MAX_PREVIEW_HEIGHT")?
                .unwrap_or(defaults.max_preview_height),
            max_processable_size: parse_var("MAX_PROCESSABLE_SIZE")?
                .unwrap_or(defaults.max_processable_size),
            max_image_dimension: parse_var("MAX_IMAGE_DIMENSION")?
                .unwrap_or(defaults.max_image_dimension),
            derive_timeout: parse_var("DERIVE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.derive_timeout),
            batch_concurrency: parse_var::<usize>("BATCH_CONCURRENCY")?
                .map(|n| n.max(1))
                .unwrap_or(defaults.batch_concurrency),
            file_icon_src: env::var("FILE_ICON_SRC").unwrap_or(defaults.file_icon_src),
        })
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            types_path: None,
            thumbnail_size: 32,
            preview_height: 240,
            max_preview_height: 1280,
            max_processable_size: 50 * 1024 * 1024,
            max_image_dimension: 16384,
            derive_timeout: Duration::from_secs(30),
            batch_concurrency: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
            file_icon_src: "static/icons/file64.png".into(),
        }
    }
}

/// Parse an optional numeric variable. Unset is `None`; set but invalid is an error.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        Err(_) => Ok(None),
    }
}
