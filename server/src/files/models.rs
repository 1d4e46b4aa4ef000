//! File Models

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::ExifMap;

/// Timestamp format for `date_uploaded` and display dates.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Property key holding the upload timestamp.
pub const DATE_UPLOADED: &str = "date_uploaded";

/// Property key whose presence marks a file as archived.
pub const ARCHIVED: &str = "archived";

/// Store-assigned record identity.
pub type FileId = i64;

/// Identity of the owning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// String-keyed property bag attached to a file.
///
/// Held as a map in memory; serialized to a JSON object only at the
/// persistence boundary. A missing column and `"{}"` are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, serde_json::Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Present with a truthy value. An explicit falsy value counts as active.
    pub fn is_archived(&self) -> bool {
        self.get(ARCHIVED).is_some_and(is_truthy)
    }

    pub fn date_uploaded(&self) -> Option<&str> {
        self.get(DATE_UPLOADED).and_then(serde_json::Value::as_str)
    }

    /// Parse the persisted column. `None` and blank mean no properties.
    pub fn from_column(column: Option<&str>) -> Result<Self, serde_json::Error> {
        match column.map(str::trim) {
            None | Some("") => Ok(Self::new()),
            Some(raw) => serde_json::from_str(raw),
        }
    }

    /// Serialize for the persisted column; always a JSON object.
    pub fn to_column(&self) -> String {
        serde_json::Value::Object(self.0.clone().into_iter().collect()).to_string()
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// Lazily filled EXIF cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CachedMetadata {
    /// Not derived yet.
    #[default]
    Unknown,
    /// Derived once; valid until the record is replaced.
    Cached(ExifMap),
}

impl CachedMetadata {
    pub const fn get(&self) -> Option<&ExifMap> {
        match self {
            Self::Unknown => None,
            Self::Cached(map) => Some(map),
        }
    }

    /// Parse the persisted column; `None` is [`CachedMetadata::Unknown`].
    pub fn from_column(column: Option<&str>) -> Result<Self, serde_json::Error> {
        column
            .map(serde_json::from_str)
            .transpose()
            .map(|map| map.map_or(Self::Unknown, Self::Cached))
    }

    pub fn to_column(&self) -> Option<String> {
        self.get()
            .map(|map| serde_json::Value::Object(map.clone().into_iter().collect()).to_string())
    }
}

/// A stored file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: FileId,
    pub owner: OwnerId,
    pub name: String,
    pub bytes: Bytes,
    pub cached_metadata: CachedMetadata,
    pub properties: Properties,
}

impl FileRecord {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Same content under a new name, not yet stored.
    pub fn duplicate_as(&self, name: impl Into<String>) -> NewFile {
        NewFile {
            owner: self.owner,
            name: name.into(),
            bytes: self.bytes.clone(),
            cached_metadata: self.cached_metadata.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// A file not yet assigned an id by the store.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner: OwnerId,
    pub name: String,
    pub bytes: Bytes,
    pub cached_metadata: CachedMetadata,
    pub properties: Properties,
}

impl NewFile {
    pub fn new(owner: OwnerId, name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            owner,
            name: name.into(),
            bytes: bytes.into(),
            cached_metadata: CachedMetadata::Unknown,
            properties: Properties::new(),
        }
    }

    pub fn into_record(self, id: FileId) -> FileRecord {
        FileRecord {
            id,
            owner: self.owner,
            name: self.name,
            bytes: self.bytes,
            cached_metadata: self.cached_metadata,
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_column_is_empty_properties() {
        assert!(Properties::from_column(None).unwrap().is_empty());
        assert!(Properties::from_column(Some("")).unwrap().is_empty());
        assert!(Properties::from_column(Some("{}")).unwrap().is_empty());
    }

    #[test]
    fn test_column_round_trip() {
        let mut props = Properties::new();
        props.insert(DATE_UPLOADED, "2023/08/02 14:44:00");
        props.insert(ARCHIVED, 1);

        let column = props.to_column();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&column).unwrap(),
            json!({"archived": 1, "date_uploaded": "2023/08/02 14:44:00"})
        );
        assert_eq!(Properties::from_column(Some(&column)).unwrap(), props);
    }

    #[test]
    fn test_non_object_column_rejected() {
        assert!(Properties::from_column(Some("[1, 2]")).is_err());
    }

    #[test]
    fn test_archived_is_key_presence_with_truthy_value() {
        let mut props = Properties::new();
        assert!(!props.is_archived());

        props.insert(ARCHIVED, 1);
        assert!(props.is_archived());

        props.insert(ARCHIVED, false);
        assert!(!props.is_archived(), "explicit false is tolerated");

        props.insert(ARCHIVED, 0);
        assert!(!props.is_archived());

        props.remove(ARCHIVED);
        assert!(!props.is_archived());
    }

    #[test]
    fn test_cached_metadata_column() {
        assert_eq!(
            CachedMetadata::from_column(None).unwrap(),
            CachedMetadata::Unknown
        );
        assert_eq!(CachedMetadata::Unknown.to_column(), None);

        let mut map = ExifMap::new();
        map.insert("Orientation".into(), json!(1));
        let cached = CachedMetadata::Cached(map);
        let column = cached.to_column().unwrap();
        assert_eq!(CachedMetadata::from_column(Some(&column)).unwrap(), cached);
    }

    #[test]
    fn test_duplicate_keeps_everything_but_name() {
        let mut record = NewFile::new(OwnerId::new(), "a.txt", b"abc".to_vec()).into_record(7);
        record.properties.insert(ARCHIVED, 1);

        let copy = record.duplicate_as("a - Copy.txt");
        assert_eq!(copy.name, "a - Copy.txt");
        assert_eq!(copy.owner, record.owner);
        assert_eq!(copy.bytes, record.bytes);
        assert!(copy.properties.is_archived());
    }
}
