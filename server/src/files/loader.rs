//! Thumbnail Batch
//!
//! Builds listing descriptors and gallery previews for one owner. Each record
//! is derived on the blocking pool under a timeout. At most
//! `batch_concurrency` derivations run at once per loader, counting ones that
//! already timed out but are still running. A record whose derivation fails,
//! panics or times out still appears once, with the generic file icon.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;

use super::error::FileError;
use super::metadata::MetadataStore;
use super::models::{FileRecord, OwnerId, Properties, DATE_FORMAT};
use super::store::{FileStore, StoreError};
use crate::config::Config;
use crate::media::codec::{date_time_of, decode};
use crate::media::derive::{preview, thumbnail};
use crate::media::{CodecLimits, ContentSniffer, Derived, FileKind, MediaError};

/// Timestamp format of the EXIF `DateTime` tag.
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Which kinds a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    Images,
    /// Everything that is not an image.
    Files,
    #[default]
    All,
}

impl KindFilter {
    pub fn accepts(self, kind: &FileKind) -> bool {
        match self {
            Self::Images => kind.is_image(),
            Self::Files => !kind.is_image(),
            Self::All => true,
        }
    }
}

/// Which archive state a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchivedFilter {
    #[default]
    Active,
    Archived,
    Any,
}

impl ArchivedFilter {
    pub fn accepts(self, properties: &Properties) -> bool {
        match self {
            Self::Active => !properties.is_archived(),
            Self::Archived => properties.is_archived(),
            Self::Any => true,
        }
    }
}

/// One listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailDescriptor {
    pub name: String,
    pub date_uploaded: Option<String>,
    /// Display type name, e.g. "PNG File".
    #[serde(rename = "type")]
    pub type_name: String,
    pub size: usize,
    /// Thumbnail data URI, or the file icon path.
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<String>,
}

/// Concurrent listing and preview builder.
#[derive(Clone)]
pub struct FileLoader {
    store: Arc<dyn FileStore>,
    sniffer: ContentSniffer,
    metadata: MetadataStore,
    config: Arc<Config>,
    /// One permit per running derivation, shared by clones.
    permits: Arc<Semaphore>,
}

impl FileLoader {
    pub fn new(store: Arc<dyn FileStore>, sniffer: ContentSniffer, config: Arc<Config>) -> Self {
        Self {
            metadata: MetadataStore::new(store.clone()),
            permits: Arc::new(Semaphore::new(config.batch_concurrency.max(1))),
            store,
            sniffer,
            config,
        }
    }

    fn limits(&self) -> CodecLimits {
        CodecLimits::from(self.config.as_ref())
    }

    /// The owner's records passing both filters, in name order.
    fn select(
        &self,
        owner: OwnerId,
        kinds: KindFilter,
        archived: ArchivedFilter,
    ) -> Result<Vec<(FileRecord, FileKind)>, StoreError> {
        Ok(self
            .store
            .list_by_owner(owner)?
            .into_iter()
            .filter(|record| archived.accepts(&record.properties))
            .map(|record| {
                let kind = self.sniffer.classify(&record.bytes, &record.name);
                (record, kind)
            })
            .filter(|(_, kind)| kinds.accepts(kind))
            .collect())
    }

    /// Descriptor with the file icon and no decode work.
    pub fn fallback(&self, record: &FileRecord, kind: &FileKind) -> ThumbnailDescriptor {
        ThumbnailDescriptor {
            name: record.name.clone(),
            date_uploaded: record.properties.date_uploaded().map(str::to_string),
            type_name: self.sniffer.display_name(kind).to_string(),
            size: record.size(),
            src: self.config.file_icon_src.clone(),
            date_taken: None,
        }
    }

    /// Full descriptor for one record. Blocking: decodes images.
    ///
    /// Images that fail to decode keep the file icon.
    pub fn describe(&self, record: &FileRecord, kind: &FileKind) -> ThumbnailDescriptor {
        let mut descriptor = self.fallback(record, kind);
        let Some(image_kind) = kind.image() else {
            return descriptor;
        };

        match decode(&record.bytes, image_kind, self.limits())
            .and_then(|surface| thumbnail(&surface, self.config.thumbnail_size))
        {
            Ok(thumb) => descriptor.src = thumb.to_data_uri(),
            Err(e) => {
                tracing::warn!(file = %record.name, error = %e, "Thumbnail derivation failed");
            }
        }

        match self.metadata.exif(record) {
            Ok(exif) => descriptor.date_taken = date_time_of(&exif).and_then(reformat_exif_date),
            Err(e) => {
                tracing::warn!(file = %record.name, error = %e, "Failed to cache EXIF metadata");
            }
        }

        descriptor
    }

    /// Listing descriptors for `owner`. Every selected record appears exactly
    /// once; order is unspecified.
    #[tracing::instrument(skip(self))]
    pub async fn load_thumbnails(
        &self,
        owner: OwnerId,
        kinds: KindFilter,
        archived: ArchivedFilter,
    ) -> Result<Vec<ThumbnailDescriptor>, FileError> {
        let start = Instant::now();
        let selected = self.select(owner, kinds, archived)?;
        let count = selected.len();

        let descriptors: Vec<ThumbnailDescriptor> = stream::iter(selected)
            .map(|(record, kind)| {
                let fallback = self.fallback(&record, &kind);
                let loader = self.clone();
                async move {
                    let described = self
                        .bounded(&fallback.name, move || loader.describe(&record, &kind))
                        .await;
                    described.unwrap_or(fallback)
                }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        tracing::debug!(
            count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded thumbnails"
        );

        Ok(descriptors)
    }

    /// Gallery previews keyed `"<id>:<name>"`. Images only; a record whose
    /// preview cannot be derived is left out.
    #[tracing::instrument(skip(self))]
    pub async fn load_previews(
        &self,
        owner: OwnerId,
        archived: ArchivedFilter,
    ) -> Result<HashMap<String, String>, FileError> {
        let start = Instant::now();
        let selected = self.select(owner, KindFilter::Images, archived)?;

        let previews: HashMap<String, String> = stream::iter(selected)
            .map(|(record, kind)| {
                let key = format!("{}:{}", record.id, record.name);
                let loader = self.clone();
                async move {
                    let derived = self
                        .bounded(&key, move || loader.preview(&record, &kind))
                        .await?;
                    match derived {
                        Ok(derived) => Some((key, derived.to_data_uri())),
                        Err(e) => {
                            tracing::warn!(file = %key, error = %e, "Preview derivation failed");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .filter_map(futures::future::ready)
            .collect()
            .await;

        tracing::debug!(
            count = previews.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded previews"
        );

        Ok(previews)
    }

    /// Gallery preview of one image record. Blocking.
    pub fn preview(&self, record: &FileRecord, kind: &FileKind) -> Result<Derived, MediaError> {
        let image_kind = kind
            .image()
            .ok_or_else(|| MediaError::UnsupportedKind(kind.to_string()))?;
        let surface = decode(&record.bytes, image_kind, self.limits())?;
        preview(&surface, self.config.preview_height)
    }

    /// Run `job` on the blocking pool under the derivation timeout.
    ///
    /// The job holds a permit until it returns, so a stuck job keeps its slot
    /// after timing out and `batch_concurrency` bounds the blocking threads in
    /// use. The timeout includes the wait for a permit. `None` when the task
    /// panicked or timed out; a timed out task is not cancelled and its result
    /// is discarded.
    async fn bounded<T, F>(&self, name: &str, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let permits = self.permits.clone();
        let run = async move {
            let permit = permits.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>(
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    job()
                })
                .await,
            )
        };

        match tokio::time::timeout(self.config.derive_timeout, run).await {
            Ok(Ok(Ok(value))) => Some(value),
            Ok(Ok(Err(e))) => {
                tracing::warn!(file = %name, error = %e, "Derivation task panicked");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(file = %name, error = %e, "Derivation permits closed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    file = %name,
                    timeout_ms = self.config.derive_timeout.as_millis() as u64,
                    "Derivation timed out"
                );
                None
            }
        }
    }
}

/// `2023:07:26 10:53:00` to `2023/07/26 10:53:00`. Unparseable dates are dropped.
fn reformat_exif_date(raw: &str) -> Option<String> {
    chrono::NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATE_FORMAT)
        .ok()
        .map(|date| date.format(DATE_FORMAT).to_string())
}
