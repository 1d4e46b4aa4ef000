//! Per-Owner File Index
//!
//! Resolves a filename to a record by binary search over the owner's
//! name-sorted file list. Comparison is exact and case-sensitive.

use super::models::{FileRecord, OwnerId};
use super::store::{FileStore, StoreError};

/// Index of `target` in ascending `names`, or `None`.
///
/// With duplicate names any one matching index may be returned.
pub fn binary_search<S: AsRef<str>>(names: &[S], target: &str) -> Option<usize> {
    binary_search_by_name(names, target, |name| name.as_ref())
}

/// Index of the item whose `name` is `target`, for items sorted ascending by
/// that name.
pub fn binary_search_by_name<T>(
    items: &[T],
    target: &str,
    name: impl Fn(&T) -> &str,
) -> Option<usize> {
    // Half-open window [low, high)
    let mut low = 0;
    let mut high = items.len();

    while low < high {
        let mid = low + (high - low) / 2;
        match target.cmp(name(&items[mid])) {
            std::cmp::Ordering::Equal => return Some(mid),
            std::cmp::Ordering::Greater => low = mid + 1,
            std::cmp::Ordering::Less => high = mid,
        }
    }

    None
}

/// Name-sorted view over one owner's files.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    records: Vec<FileRecord>,
}

impl FileIndex {
    /// Load the owner's files from the store.
    pub fn load(store: &dyn FileStore, owner: OwnerId) -> Result<Self, StoreError> {
        Ok(Self::from_sorted(store.list_by_owner(owner)?))
    }

    /// Wrap records already sorted by name.
    pub fn from_sorted(records: Vec<FileRecord>) -> Self {
        debug_assert!(
            records.windows(2).all(|w| w[0].name <= w[1].name),
            "file index requires name-sorted records"
        );
        Self { records }
    }

    pub fn search(&self, name: &str) -> Option<&FileRecord> {
        binary_search_by_name(&self.records, name, |r| r.name.as_str()).map(|i| &self.records[i])
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FileRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Resolve `name` for `owner`. Not found is `Ok(None)`, never an error.
pub fn search(
    store: &dyn FileStore,
    owner: OwnerId,
    name: &str,
) -> Result<Option<FileRecord>, StoreError> {
    let mut records = FileIndex::load(store, owner)?.into_records();
    let position = binary_search_by_name(&records, name, |r| r.name.as_str());
    Ok(position.map(|i| records.swap_remove(i)))
}
