//! Per-user File Storage
//!
//! Records, persistence, the per-owner name index, property metadata and the
//! owner-scoped operations built on them.

mod error;
pub mod index;
pub mod loader;
pub mod metadata;
pub mod models;
pub mod service;
pub mod store;

pub use error::FileError;
pub use index::FileIndex;
pub use loader::{ArchivedFilter, FileLoader, KindFilter, ThumbnailDescriptor};
pub use metadata::MetadataStore;
pub use models::{CachedMetadata, FileRecord, NewFile, OwnerId, Properties};
pub use service::{
    FilePayload, FileService, ImageUpload, ImageView, PayloadKind, UploadRequest, UploadedImage,
};
pub use store::{FileStore, MemoryStore, StoreError};
