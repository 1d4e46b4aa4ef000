//! Extension Table
//!
//! Maps uppercase file suffixes to display names (`{"PNG": "PNG Image", ...}`).
//! The `other` entry names everything the table does not list.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Key of the fallback display name.
pub const OTHER_KEY: &str = "other";

const BUNDLED_TYPES: &str = include_str!("../../types.json");

#[derive(Error, Debug)]
pub enum TypesError {
    #[error("Failed to read extension table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Extension table is not a JSON object of strings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Extension table has no \"other\" entry")]
    MissingOther,
}

/// Extension to display-name table, injected into the sniffer at startup.
#[derive(Debug, Clone)]
pub struct TypesTable {
    entries: HashMap<String, String>,
    other: String,
}

impl TypesTable {
    /// Parse a table from JSON. Keys are normalized to uppercase.
    pub fn from_json(raw: &str) -> Result<Self, TypesError> {
        let parsed: HashMap<String, String> = serde_json::from_str(raw)?;

        let mut entries = HashMap::with_capacity(parsed.len());
        let mut other = None;
        for (key, name) in parsed {
            if key == OTHER_KEY {
                other = Some(name);
            } else {
                entries.insert(key.trim().to_uppercase(), name);
            }
        }

        Ok(Self {
            entries,
            other: other.ok_or(TypesError::MissingOther)?,
        })
    }

    /// Load a table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TypesError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Table shipped with the crate.
    pub fn bundled() -> Self {
        // The bundled file is validated by `test_bundled_table_parses`.
        Self::from_json(BUNDLED_TYPES).unwrap_or_else(|_| Self {
            entries: HashMap::new(),
            other: "File".into(),
        })
    }

    /// Whether `suffix` (uppercase, no dot) is a listed extension.
    pub fn contains(&self, suffix: &str) -> bool {
        self.entries.contains_key(suffix)
    }

    /// Display name for a suffix, or the `other` name when unlisted.
    pub fn display_name(&self, suffix: Option<&str>) -> &str {
        suffix
            .and_then(|s| self.entries.get(s))
            .map_or(self.other.as_str(), String::as_str)
    }

    /// Every listed extension, sorted, without the `other` entry.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.entries.keys().cloned().collect();
        extensions.sort_unstable();
        extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_table_parses() {
        let table = TypesTable::from_json(BUNDLED_TYPES).unwrap();
        assert!(table.contains("PNG"));
        assert!(table.contains("JPG"));
        assert!(table.contains("AHK"));
        assert!(!table.contains(OTHER_KEY));
    }

    #[test]
    fn test_keys_are_uppercased() {
        let table = TypesTable::from_json(r#"{"txt": "Text", "other": "File"}"#).unwrap();
        assert!(table.contains("TXT"));
        assert_eq!(table.display_name(Some("TXT")), "Text");
    }

    #[test]
    fn test_unlisted_suffix_uses_other() {
        let table = TypesTable::from_json(r#"{"PNG": "PNG File", "other": "File"}"#).unwrap();
        assert_eq!(table.display_name(Some("EXE")), "File");
        assert_eq!(table.display_name(None), "File");
    }

    #[test]
    fn test_missing_other_rejected() {
        let err = TypesTable::from_json(r#"{"PNG": "PNG File"}"#);
        assert!(matches!(err, Err(TypesError::MissingOther)));
    }

    #[test]
    fn test_extensions_sorted_without_other() {
        let table =
            TypesTable::from_json(r#"{"TXT": "Text", "GIF": "Gif", "other": "File"}"#).unwrap();
        assert_eq!(table.extensions(), vec!["GIF".to_string(), "TXT".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(&path, r#"{"LOG": "Log File", "other": "Thing"}"#).unwrap();

        let table = TypesTable::load(&path).unwrap();
        assert_eq!(table.display_name(Some("LOG")), "Log File");
        assert_eq!(table.display_name(Some("PNG")), "Thing");
    }
}
