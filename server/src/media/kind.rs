//! Content Sniffing
//!
//! Classifies a stored blob into a [`FileKind`]: magic bytes first, the
//! filename suffix second. The result can disagree with the literal suffix
//! (a `.png` whose bytes are JPEG classifies as JPEG).

use std::fmt;
use std::sync::Arc;

use image::ImageFormat;

use super::types::TypesTable;

/// Suffixes previewed as source code.
const CODE_SUFFIXES: &[&str] = &[
    "PY", "JS", "CSS", "HTML", "C", "CPP", "CS", "LUA", "VB", "VBA", "JSON", "AHK",
];

/// Fixed byte sequences at the start and end of a blob.
struct Signature {
    prefix: &'static [u8],
    suffix: &'static [u8],
}

impl Signature {
    fn matches(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.prefix.len() + self.suffix.len()
            && bytes.starts_with(self.prefix)
            && bytes.ends_with(self.suffix)
    }
}

/// Raster formats the codec can decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
}

impl ImageKind {
    pub const ALL: [Self; 3] = [Self::Png, Self::Jpeg, Self::Gif];

    /// Magic bytes identifying the format. GIF is recognised by suffix only.
    const fn signature(self) -> Option<Signature> {
        match self {
            Self::Png => Some(Signature {
                prefix: b"\x89PNG",
                suffix: b"\xaeB\x60\x82",
            }),
            Self::Jpeg => Some(Signature {
                prefix: b"\xff\xd8",
                suffix: b"",
            }),
            Self::Gif => None,
        }
    }

    /// Canonical uppercase suffix.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Gif => "GIF",
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }

    /// Codec binding in the `image` crate.
    pub const fn format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Gif => ImageFormat::Gif,
        }
    }

    /// Match an uppercase filename suffix, including the `JPG` alias.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "PNG" => Some(Self::Png),
            "JPEG" | "JPG" => Some(Self::Jpeg),
            "GIF" => Some(Self::Gif),
            _ => None,
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.signature()
                .is_some_and(|signature| signature.matches(bytes))
        })
    }

    pub const fn is_animated(self) -> bool {
        matches!(self, Self::Gif)
    }
}

/// Content category of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A raster format with a codec.
    Image(ImageKind),
    /// A suffix listed in the extension table (uppercase, no dot).
    Listed(String),
    /// Nothing matched.
    Other,
}

impl FileKind {
    /// Uppercase suffix without the dot; `None` for [`FileKind::Other`].
    pub fn suffix(&self) -> Option<&str> {
        match self {
            Self::Image(kind) => Some(kind.suffix()),
            Self::Listed(suffix) => Some(suffix),
            Self::Other => None,
        }
    }

    /// Label in the `.PNG` / `.TXT` style, `None` when nothing matched.
    pub fn label(&self) -> Option<String> {
        self.suffix().map(|suffix| format!(".{suffix}"))
    }

    pub const fn image(&self) -> Option<ImageKind> {
        match self {
            Self::Image(kind) => Some(*kind),
            _ => None,
        }
    }

    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    pub fn is_code(&self) -> bool {
        self.code_language().is_some()
    }

    /// Language name for syntax highlighting, e.g. `PY`.
    pub fn code_language(&self) -> Option<&str> {
        match self {
            Self::Listed(suffix) if CODE_SUFFIXES.contains(&suffix.as_str()) => Some(suffix),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix() {
            Some(suffix) => write!(f, ".{suffix}"),
            None => f.write_str("other"),
        }
    }
}

/// Extract the final dot-suffix of a filename, whitespace removed, uppercased.
pub fn filename_suffix(filename: &str) -> Option<String> {
    let (_, suffix) = filename.rsplit_once('.')?;
    let suffix: String = suffix
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    (!suffix.is_empty()).then_some(suffix)
}

/// Classifies blobs using magic bytes and the injected extension table.
#[derive(Debug, Clone)]
pub struct ContentSniffer {
    types: Arc<TypesTable>,
}

impl ContentSniffer {
    pub fn new(types: TypesTable) -> Self {
        Self {
            types: Arc::new(types),
        }
    }

    pub fn types(&self) -> &TypesTable {
        &self.types
    }

    /// Classify a blob. Magic bytes win over the filename.
    pub fn classify(&self, bytes: &[u8], filename: &str) -> FileKind {
        if let Some(kind) = ImageKind::sniff(bytes) {
            return FileKind::Image(kind);
        }

        match filename_suffix(filename) {
            Some(suffix) if self.types.contains(&suffix) => ImageKind::from_suffix(&suffix)
                .map_or(FileKind::Listed(suffix), FileKind::Image),
            _ => FileKind::Other,
        }
    }

    /// Display type name, e.g. "PNG Image", or the table's `other` name.
    pub fn display_name(&self, kind: &FileKind) -> &str {
        self.types.display_name(kind.suffix())
    }
}
