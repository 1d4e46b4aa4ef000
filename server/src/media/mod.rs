//! Media Pipeline
//!
//! Content sniffing, raster decode/encode and derived image variants.

pub mod codec;
pub mod data_uri;
pub mod derive;
mod error;
pub mod kind;
pub mod types;

pub use codec::{CodecLimits, ExifMap, Surface};
pub use derive::Derived;
pub use error::MediaError;
pub use kind::{ContentSniffer, FileKind, ImageKind};
pub use types::{TypesError, TypesTable};
