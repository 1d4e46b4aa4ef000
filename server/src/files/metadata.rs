//! Metadata Store
//!
//! Property bag access and the lazily filled EXIF cache. Every mutation is
//! written through to the store immediately, one round trip per call.

use std::sync::Arc;

use super::models::FileRecord;
use super::store::{FileStore, StoreError};
use crate::media::codec::read_exif;
use crate::media::ExifMap;

#[derive(Clone)]
pub struct MetadataStore {
    store: Arc<dyn FileStore>,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    pub fn get<'a>(&self, record: &'a FileRecord, key: &str) -> Option<&'a serde_json::Value> {
        record.properties.get(key)
    }

    /// Set `key` and persist.
    pub fn set(
        &self,
        record: &mut FileRecord,
        key: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), StoreError> {
        record.properties.insert(key, value);
        self.store.update(record)
    }

    /// Remove `key` and persist. Removing an absent key writes nothing.
    pub fn remove(&self, record: &mut FileRecord, key: &str) -> Result<(), StoreError> {
        if record.properties.remove(key).is_none() {
            return Ok(());
        }
        self.store.update(record)
    }

    /// EXIF tags of the record, read from the cache or derived and cached.
    ///
    /// Concurrent fills for the same record derive the same map, so the last
    /// writer wins without changing the result.
    pub fn exif(&self, record: &FileRecord) -> Result<ExifMap, StoreError> {
        if let Some(cached) = record.cached_metadata.get() {
            return Ok(cached.clone());
        }

        let exif = read_exif(&record.bytes);
        self.store.cache_metadata(record, &exif)?;
        tracing::debug!(file_id = record.id, tags = exif.len(), "Cached EXIF metadata");

        Ok(exif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::models::{CachedMetadata, NewFile, OwnerId, ARCHIVED};
    use crate::files::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, MetadataStore, FileRecord) {
        let store = Arc::new(MemoryStore::new());
        let metadata = MetadataStore::new(store.clone());
        let record = store
            .insert(NewFile::new(OwnerId::new(), "a.txt", b"hello".to_vec()))
            .unwrap();
        (store, metadata, record)
    }

    #[test]
    fn test_archived_round_trip() {
        let (store, metadata, mut record) = setup();

        assert!(metadata.get(&record, ARCHIVED).is_none());

        metadata.set(&mut record, ARCHIVED, 1).unwrap();
        assert_eq!(metadata.get(&record, ARCHIVED), Some(&serde_json::json!(1)));

        let stored = store.find_by_owner_and_name(record.owner, "a.txt").unwrap().unwrap();
        assert!(stored.properties.is_archived(), "set persists immediately");

        metadata.remove(&mut record, ARCHIVED).unwrap();
        assert!(metadata.get(&record, ARCHIVED).is_none());
    }

    #[test]
    fn test_one_write_per_mutation() {
        let (store, metadata, mut record) = setup();
        let before = store.write_count();

        metadata.set(&mut record, "a", 1).unwrap();
        metadata.set(&mut record, "b", 2).unwrap();
        metadata.remove(&mut record, "a").unwrap();
        metadata.remove(&mut record, "missing").unwrap();

        assert_eq!(store.write_count() - before, 3);
    }

    #[test]
    fn test_exif_fills_cache_once() {
        let (store, metadata, record) = setup();

        let exif = metadata.exif(&record).unwrap();
        assert!(exif.is_empty());

        let stored = store.find_by_owner_and_name(record.owner, "a.txt").unwrap().unwrap();
        assert_eq!(stored.cached_metadata, CachedMetadata::Cached(ExifMap::new()));

        let writes = store.write_count();
        metadata.exif(&stored).unwrap();
        assert_eq!(store.write_count(), writes, "cached read does not write");
    }

    #[test]
    fn test_concurrent_exif_fill() {
        let (store, metadata, record) = setup();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let metadata = metadata.clone();
                let record = record.clone();
                std::thread::spawn(move || metadata.exif(&record))
            })
            .collect();

        let results: Vec<ExifMap> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert_eq!(results[0], results[1]);

        let stored = store.find_by_owner_and_name(record.owner, "a.txt").unwrap().unwrap();
        assert_eq!(stored.cached_metadata, CachedMetadata::Cached(results[0].clone()));
    }
}
