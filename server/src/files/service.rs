//! File Service
//!
//! Owner-scoped file operations: upload, retrieval, copy, rename and the bulk
//! archive/restore/delete actions. Image work runs on the blocking pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::try_join_all;
use serde::Serialize;

use super::error::FileError;
use super::index::{self, FileIndex};
use super::loader::{ArchivedFilter, FileLoader, KindFilter, ThumbnailDescriptor};
use super::metadata::MetadataStore;
use super::models::{
    CachedMetadata, FileRecord, NewFile, OwnerId, ARCHIVED, DATE_FORMAT, DATE_UPLOADED,
};
use super::store::FileStore;
use crate::config::Config;
use crate::media::codec::{decode, ORIENTATION_ROTATED_LEFT};
use crate::media::derive::{preview, resize, rotate90, ANIMATED_PREVIEW_FRAME};
use crate::media::{data_uri, CodecLimits, ContentSniffer, ExifMap, ImageKind, MediaError};

/// Returned for non-image files whose bytes are not UTF-8.
pub const UNDECODABLE_TEXT: &str = "File format is not supported for decoding.";

const FALLBACK_MIME: &str = "application/octet-stream";

/// A single file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub data: Bytes,
    /// Replace an existing file of the same name.
    pub overwrite: bool,
    /// Accept image kinds. The plain file view uploads with this unset.
    pub allow_images: bool,
}

/// One entry of a gallery batch upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub name: String,
    pub data: Bytes,
}

/// Result of a gallery upload entry.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub name: String,
    pub size: usize,
    pub dims: (u32, u32),
    /// Preview data URI.
    pub downsized: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Gif,
    Image,
    Text,
    Code,
}

/// Content of a file for the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct FilePayload {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    /// Highlighting language for code files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Full image, its preview and EXIF tags.
#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    pub base64: String,
    pub downsized: String,
    pub metadata: ExifMap,
}

/// An image ready to store: orientation corrected, with its preview.
struct PreparedImage {
    bytes: Bytes,
    cached_metadata: CachedMetadata,
    dims: (u32, u32),
    downsized: Option<String>,
}

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn FileStore>,
    sniffer: ContentSniffer,
    metadata: MetadataStore,
    loader: FileLoader,
    config: Arc<Config>,
}

impl FileService {
    pub fn new(store: Arc<dyn FileStore>, sniffer: ContentSniffer, config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            metadata: MetadataStore::new(store.clone()),
            loader: FileLoader::new(store.clone(), sniffer.clone(), config.clone()),
            store,
            sniffer,
            config,
        }
    }

    pub const fn loader(&self) -> &FileLoader {
        &self.loader
    }

    pub const fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn sniffer(&self) -> &ContentSniffer {
        &self.sniffer
    }

    fn limits(&self) -> CodecLimits {
        CodecLimits::from(self.config.as_ref())
    }

    fn find(&self, owner: OwnerId, name: &str) -> Result<FileRecord, FileError> {
        index::search(self.store.as_ref(), owner, name)?
            .ok_or_else(|| FileError::NotFound(name.to_string()))
    }

    /// Store one file and return its listing descriptor.
    ///
    /// Images are decoded first; an orientation-8 JPEG is stored rotated.
    #[tracing::instrument(skip(self, request), fields(name = %request.name, size = request.data.len()))]
    pub async fn upload(
        &self,
        owner: OwnerId,
        request: UploadRequest,
    ) -> Result<ThumbnailDescriptor, FileError> {
        let start = Instant::now();
        let existing = index::search(self.store.as_ref(), owner, &request.name)?;
        if existing.is_some() && !request.overwrite {
            return Err(FileError::DuplicateName(request.name));
        }

        let kind = self.sniffer.classify(&request.data, &request.name);
        if kind.is_image() && !request.allow_images {
            return Err(FileError::ImagesNotAllowed(request.name));
        }

        let mut file = NewFile::new(owner, request.name, request.data);
        if let Some(image_kind) = kind.image() {
            let prepared = self.prepare(file.bytes.clone(), image_kind, false).await?;
            file.bytes = prepared.bytes;
            file.cached_metadata = prepared.cached_metadata;
        }
        file.properties.insert(DATE_UPLOADED, now());

        if let Some(existing) = existing {
            self.store.delete(&existing)?;
            tracing::debug!(file_id = existing.id, "Overwriting existing file");
        }
        let record = self.store.insert(file)?;
        self.store.commit()?;

        tracing::info!(
            file_id = record.id,
            kind = %kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "File uploaded"
        );

        let loader = self.loader.clone();
        Ok(tokio::task::spawn_blocking(move || loader.describe(&record, &kind)).await?)
    }

    /// Gallery batch upload. Names get an uppercase extension; every entry
    /// must be an image. Conflicts and decode failures reject the whole batch
    /// before anything is written.
    #[tracing::instrument(skip(self, files), fields(count = files.len()))]
    pub async fn upload_images(
        &self,
        owner: OwnerId,
        files: Vec<ImageUpload>,
        overwrite: bool,
    ) -> Result<Vec<UploadedImage>, FileError> {
        let start = Instant::now();
        let mut entries = Vec::with_capacity(files.len());
        let mut seen = HashSet::with_capacity(files.len());
        let mut conflicts = Vec::new();
        for file in files {
            let name = uppercase_extension(&file.name);
            let kind = self.sniffer.classify(&file.data, &name);
            let image_kind = kind
                .image()
                .ok_or_else(|| FileError::UnsupportedKind(name.clone()))?;

            // Overwrite cannot choose between two entries of the same batch.
            if !seen.insert(name.clone()) {
                if !conflicts.contains(&name) {
                    conflicts.push(name);
                }
                continue;
            }

            let existing = index::search(self.store.as_ref(), owner, &name)?;
            if existing.is_some() && !overwrite {
                conflicts.push(name.clone());
            }
            entries.push((name, file.data, image_kind, existing));
        }

        if !conflicts.is_empty() {
            return Err(FileError::DuplicateNames(conflicts));
        }

        let prepared = try_join_all(
            entries
                .iter()
                .map(|(_, data, kind, _)| self.prepare(data.clone(), *kind, true)),
        )
        .await?;

        let date_uploaded = now();
        let mut uploaded = Vec::with_capacity(entries.len());
        for ((name, _, _, existing), image) in entries.into_iter().zip(prepared) {
            if let Some(existing) = existing {
                self.store.delete(&existing)?;
            }

            let mut file = NewFile::new(owner, name.clone(), image.bytes);
            file.cached_metadata = image.cached_metadata;
            file.properties.insert(DATE_UPLOADED, date_uploaded.clone());
            let record = self.store.insert(file)?;

            uploaded.push(UploadedImage {
                name,
                size: record.size(),
                dims: image.dims,
                downsized: image.downsized.unwrap_or_default(),
            });
        }
        self.store.commit()?;

        tracing::info!(
            count = uploaded.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Images uploaded"
        );
        Ok(uploaded)
    }

    /// Decode, correct orientation and optionally derive the gallery preview.
    async fn prepare(
        &self,
        data: Bytes,
        kind: ImageKind,
        with_preview: bool,
    ) -> Result<PreparedImage, FileError> {
        let limits = self.limits();
        let preview_height = self.config.preview_height;

        let prepared = tokio::task::spawn_blocking(move || {
            prepare_image(data, kind, limits, with_preview.then_some(preview_height))
        })
        .await??;

        Ok(prepared)
    }

    /// Content of a file for the viewer.
    ///
    /// Images come back as data URIs. Other files are text, or a base64 data
    /// URI of the whole file when `whole` is set.
    #[tracing::instrument(skip(self))]
    pub async fn get_file(
        &self,
        owner: OwnerId,
        name: &str,
        whole: bool,
    ) -> Result<FilePayload, FileError> {
        let record = self.find(owner, name)?;
        let kind = self.sniffer.classify(&record.bytes, &record.name);

        if let Some(image_kind) = kind.image() {
            return Ok(FilePayload {
                value: data_uri::encode(image_kind.mime_type(), &record.bytes),
                kind: if image_kind.is_animated() {
                    PayloadKind::Gif
                } else {
                    PayloadKind::Image
                },
                language: None,
            });
        }

        let value = if whole {
            data_uri::encode(&whole_file_mime(&record), &record.bytes)
        } else {
            std::str::from_utf8(&record.bytes)
                .map_or_else(|_| UNDECODABLE_TEXT.to_string(), str::to_string)
        };

        let language = kind.code_language().map(str::to_string);
        Ok(FilePayload {
            value,
            kind: if language.is_some() {
                PayloadKind::Code
            } else {
                PayloadKind::Text
            },
            language,
        })
    }

    /// Full image, a preview at half height (capped) and its EXIF tags.
    #[tracing::instrument(skip(self))]
    pub async fn get_image(&self, owner: OwnerId, name: &str) -> Result<ImageView, FileError> {
        let record = self.find(owner, name)?;
        let kind = self.sniffer.classify(&record.bytes, &record.name);
        let image_kind = kind
            .image()
            .ok_or_else(|| FileError::UnsupportedKind(record.name.clone()))?;

        let limits = self.limits();
        let max_height = self.config.max_preview_height;
        let bytes = record.bytes.clone();
        let downsized = tokio::task::spawn_blocking(move || {
            let surface = decode(&bytes, image_kind, limits)?;
            let (_, height) = surface.dimensions();
            let target = max_height.min(height / 2).max(1);
            if image_kind.is_animated() {
                let index = ANIMATED_PREVIEW_FRAME.min(surface.frame_count() - 1);
                resize(&surface.seek_frame(index)?, target)
            } else {
                resize(&surface, target)
            }
        })
        .await??;

        Ok(ImageView {
            base64: data_uri::encode(image_kind.mime_type(), &record.bytes),
            downsized: downsized.to_data_uri(),
            metadata: self.metadata.exif(&record)?,
        })
    }

    /// Duplicate a file as `"<stem> - Copy.<ext>"` and return the new entry.
    #[tracing::instrument(skip(self))]
    pub async fn copy_file(
        &self,
        owner: OwnerId,
        name: &str,
        overwrite: bool,
    ) -> Result<ThumbnailDescriptor, FileError> {
        let record = self.find(owner, name)?;
        let copy_name = copy_name(&record.name);

        if let Some(existing) = index::search(self.store.as_ref(), owner, &copy_name)? {
            if !overwrite {
                return Err(FileError::DuplicateName(copy_name));
            }
            self.store.delete(&existing)?;
        }

        let copy = self.store.insert(record.duplicate_as(copy_name))?;
        self.store.commit()?;
        tracing::info!(from = record.id, file_id = copy.id, "File copied");

        let kind = self.sniffer.classify(&copy.bytes, &copy.name);
        let loader = self.loader.clone();
        Ok(tokio::task::spawn_blocking(move || loader.describe(&copy, &kind)).await?)
    }

    #[tracing::instrument(skip(self))]
    pub fn rename_file(&self, owner: OwnerId, from: &str, to: &str) -> Result<(), FileError> {
        let mut record = self.find(owner, from)?;
        if from == to {
            return Ok(());
        }
        if index::search(self.store.as_ref(), owner, to)?.is_some() {
            return Err(FileError::DuplicateName(to.to_string()));
        }

        record.name = to.to_string();
        self.store.update(&record)?;
        self.store.commit()?;

        tracing::info!(file_id = record.id, "File renamed");
        Ok(())
    }

    /// Resolve every name before anything is changed.
    fn resolve_all(&self, owner: OwnerId, names: &[String]) -> Result<Vec<FileRecord>, FileError> {
        let index = FileIndex::load(self.store.as_ref(), owner)?;
        names
            .iter()
            .map(|name| {
                index
                    .search(name)
                    .cloned()
                    .ok_or_else(|| FileError::NotFound(name.clone()))
            })
            .collect()
    }

    #[tracing::instrument(skip(self, names), fields(count = names.len()))]
    pub fn archive_files(&self, owner: OwnerId, names: &[String]) -> Result<(), FileError> {
        for mut record in self.resolve_all(owner, names)? {
            self.metadata.set(&mut record, ARCHIVED, 1)?;
        }
        self.store.commit()?;
        Ok(())
    }

    #[tracing::instrument(skip(self, names), fields(count = names.len()))]
    pub fn restore_files(&self, owner: OwnerId, names: &[String]) -> Result<(), FileError> {
        for mut record in self.resolve_all(owner, names)? {
            self.metadata.remove(&mut record, ARCHIVED)?;
        }
        self.store.commit()?;
        Ok(())
    }

    /// Permanently delete files.
    #[tracing::instrument(skip(self, names), fields(count = names.len()))]
    pub fn delete_files(&self, owner: OwnerId, names: &[String]) -> Result<(), FileError> {
        for record in self.resolve_all(owner, names)? {
            self.store.delete(&record)?;
        }
        self.store.commit()?;
        tracing::info!(count = names.len(), "Files deleted");
        Ok(())
    }

    /// Total payload bytes stored for `owner`.
    pub fn storage_used(&self, owner: OwnerId) -> Result<usize, FileError> {
        Ok(self
            .store
            .list_by_owner(owner)?
            .iter()
            .map(FileRecord::size)
            .sum())
    }

    /// Uploadable extensions, uppercase and sorted.
    pub fn valid_extensions(&self) -> Vec<String> {
        self.sniffer.types().extensions()
    }

    pub async fn load_thumbnails(
        &self,
        owner: OwnerId,
        kinds: KindFilter,
        archived: ArchivedFilter,
    ) -> Result<Vec<ThumbnailDescriptor>, FileError> {
        self.loader.load_thumbnails(owner, kinds, archived).await
    }

    pub async fn load_previews(
        &self,
        owner: OwnerId,
        archived: ArchivedFilter,
    ) -> Result<HashMap<String, String>, FileError> {
        self.loader.load_previews(owner, archived).await
    }
}

/// Decode `data`, rotate an orientation-8 image upright and derive the
/// preview. Blocking.
///
/// A rotated image is re-encoded without EXIF, so its tags are cached with
/// the orientation reset to normal.
fn prepare_image(
    data: Bytes,
    kind: ImageKind,
    limits: CodecLimits,
    preview_height: Option<u32>,
) -> Result<PreparedImage, MediaError> {
    let mut surface = decode(&data, kind, limits)?;
    let mut bytes = data;
    let mut cached_metadata = CachedMetadata::Unknown;

    if surface.orientation() == Some(ORIENTATION_ROTATED_LEFT) {
        let rotated = rotate90(&surface)?;
        let mut exif = surface.exif().clone();
        exif.insert("Orientation".into(), 1.into());
        cached_metadata = CachedMetadata::Cached(exif);

        surface = decode(&rotated.data, kind, limits)?;
        bytes = Bytes::from(rotated.data);
        tracing::debug!("Corrected EXIF orientation");
    }

    let downsized = preview_height
        .map(|height| preview(&surface, height).map(|derived| derived.to_data_uri()))
        .transpose()?;

    Ok(PreparedImage {
        bytes,
        cached_metadata,
        dims: surface.dimensions(),
        downsized,
    })
}

fn now() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

/// `photo.jpg` becomes `photo.JPG`.
fn uppercase_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}.{}", extension.to_uppercase()),
        None => name.to_string(),
    }
}

/// `report.txt` becomes `report - Copy.txt`.
fn copy_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem} - Copy.{extension}"),
        None => format!("{name} - Copy"),
    }
}

/// MIME for a whole-file transfer: sniffed from content, else guessed from
/// the name.
fn whole_file_mime(record: &FileRecord) -> String {
    infer::get(&record.bytes)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| mime_guess::from_path(&record.name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}
