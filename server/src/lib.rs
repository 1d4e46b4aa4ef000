//! `StorageSaver` Core
//!
//! Personal file and photo storage: content classification, image
//! derivation, per-user name-sorted file index and concurrent thumbnail
//! listings.

pub mod config;
pub mod files;
pub mod media;
