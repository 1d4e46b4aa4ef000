//! File Persistence
//!
//! The [`FileStore`] trait is the seam to the relational store. Records come
//! back per owner sorted by name, which is what [`super::index`] relies on.
//!
//! [`MemoryStore`] keeps each owner's files in a name-sorted vector inside a
//! `DashMap`, so concurrent requests for different owners never contend.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use super::models::{CachedMetadata, FileId, FileRecord, NewFile, OwnerId};
use crate::media::ExifMap;

/// Errors raised by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record was removed or never stored.
    #[error("File record {0} does not exist")]
    MissingRecord(FileId),

    /// Backend could not be reached or rejected the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator for file records.
pub trait FileStore: Send + Sync {
    /// Exact-name lookup for one owner.
    fn find_by_owner_and_name(
        &self,
        owner: OwnerId,
        name: &str,
    ) -> Result<Option<FileRecord>, StoreError>;

    /// Every file of `owner`, sorted ascending by name (byte order).
    fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<FileRecord>, StoreError>;

    /// Store a new file and assign its id.
    fn insert(&self, file: NewFile) -> Result<FileRecord, StoreError>;

    /// Replace name, properties and cached metadata of an existing record.
    fn update(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Write the EXIF cache of a record without touching anything else.
    fn cache_metadata(&self, record: &FileRecord, metadata: &ExifMap) -> Result<(), StoreError>;

    fn delete(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Flush pending writes.
    fn commit(&self) -> Result<(), StoreError>;
}

/// In-memory [`FileStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: DashMap<OwnerId, Vec<FileRecord>>,
    next_id: AtomicI64,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Insert keeping the vector sorted by name.
    fn insert_sorted(files: &mut Vec<FileRecord>, record: FileRecord) {
        let at = files.partition_point(|f| f.name.as_str() <= record.name.as_str());
        files.insert(at, record);
    }

    fn position(files: &[FileRecord], id: FileId) -> Result<usize, StoreError> {
        files
            .iter()
            .position(|f| f.id == id)
            .ok_or(StoreError::MissingRecord(id))
    }
}

impl FileStore for MemoryStore {
    fn find_by_owner_and_name(
        &self,
        owner: OwnerId,
        name: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        Ok(self
            .files
            .get(&owner)
            .and_then(|files| files.iter().find(|f| f.name == name).cloned()))
    }

    fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self
            .files
            .get(&owner)
            .map(|files| files.value().clone())
            .unwrap_or_default())
    }

    fn insert(&self, file: NewFile) -> Result<FileRecord, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = file.into_record(id);

        let mut files = self.files.entry(record.owner).or_default();
        Self::insert_sorted(&mut files, record.clone());
        self.record_write();

        Ok(record)
    }

    fn update(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut files = self
            .files
            .get_mut(&record.owner)
            .ok_or(StoreError::MissingRecord(record.id))?;
        let at = Self::position(&files, record.id)?;

        let mut updated = files.remove(at);
        updated.name.clone_from(&record.name);
        updated.properties = record.properties.clone();
        updated.cached_metadata = record.cached_metadata.clone();
        Self::insert_sorted(&mut files, updated);
        self.record_write();

        Ok(())
    }

    fn cache_metadata(&self, record: &FileRecord, metadata: &ExifMap) -> Result<(), StoreError> {
        let mut files = self
            .files
            .get_mut(&record.owner)
            .ok_or(StoreError::MissingRecord(record.id))?;
        let at = Self::position(&files, record.id)?;

        files[at].cached_metadata = CachedMetadata::Cached(metadata.clone());
        self.record_write();

        Ok(())
    }

    fn delete(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut files = self
            .files
            .get_mut(&record.owner)
            .ok_or(StoreError::MissingRecord(record.id))?;
        let at = Self::position(&files, record.id)?;

        files.remove(at);
        self.record_write();

        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::models::ARCHIVED;

    fn names(store: &MemoryStore, owner: OwnerId) -> Vec<String> {
        store
            .list_by_owner(owner)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect()
    }

    #[test]
    fn test_insert_assigns_ids_and_sorts() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();

        let b = store.insert(NewFile::new(owner, "b.txt", b"b".to_vec())).unwrap();
        let a = store.insert(NewFile::new(owner, "a.txt", b"a".to_vec())).unwrap();
        store.insert(NewFile::new(owner, "C.txt", b"c".to_vec())).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(names(&store, owner), vec!["C.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_owners_are_isolated() {
        let store = MemoryStore::new();
        let alice = OwnerId::new();
        let bob = OwnerId::new();

        store.insert(NewFile::new(alice, "same.txt", b"a".to_vec())).unwrap();
        store.insert(NewFile::new(bob, "same.txt", b"b".to_vec())).unwrap();

        let found = store.find_by_owner_and_name(bob, "same.txt").unwrap().unwrap();
        assert_eq!(&found.bytes[..], b"b");
        assert!(store.list_by_owner(OwnerId::new()).unwrap().is_empty());
    }

    #[test]
    fn test_rename_keeps_order() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let mut first = store.insert(NewFile::new(owner, "a.txt", b"".to_vec())).unwrap();
        store.insert(NewFile::new(owner, "m.txt", b"".to_vec())).unwrap();

        first.name = "z.txt".into();
        store.update(&first).unwrap();

        assert_eq!(names(&store, owner), vec!["m.txt", "z.txt"]);
    }

    #[test]
    fn test_update_and_delete_missing_record() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let record = store.insert(NewFile::new(owner, "a.txt", b"".to_vec())).unwrap();

        store.delete(&record).unwrap();
        assert!(matches!(
            store.update(&record),
            Err(StoreError::MissingRecord(id)) if id == record.id
        ));
        assert!(matches!(store.delete(&record), Err(StoreError::MissingRecord(_))));
    }

    #[test]
    fn test_cache_metadata_leaves_properties() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let mut file = NewFile::new(owner, "a.jpg", b"".to_vec());
        file.properties.insert(ARCHIVED, 1);
        let record = store.insert(file).unwrap();

        let mut exif = ExifMap::new();
        exif.insert("Orientation".into(), 1.into());
        store.cache_metadata(&record, &exif).unwrap();

        let stored = store.find_by_owner_and_name(owner, "a.jpg").unwrap().unwrap();
        assert_eq!(stored.cached_metadata, CachedMetadata::Cached(exif));
        assert!(stored.properties.is_archived());
    }

    #[test]
    fn test_write_count() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let record = store.insert(NewFile::new(owner, "a", b"".to_vec())).unwrap();
        store.update(&record).unwrap();
        store.commit().unwrap();

        assert_eq!(store.write_count(), 2);
    }
}
