//! `StorageSaver` - Main Entry Point
//!
//! Uploads the files given on the command line for a fresh owner and prints
//! the resulting listing as JSON.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use storagesaver::config::Config;
use storagesaver::files::{
    ArchivedFilter, FileError, FileService, KindFilter, MemoryStore, OwnerId, UploadRequest,
};
use storagesaver::media::{ContentSniffer, TypesTable};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storagesaver=debug".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let types = match &config.types_path {
        Some(path) => TypesTable::load(path)
            .with_context(|| format!("loading extension table {}", path.display()))?,
        None => TypesTable::bundled(),
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        extensions = types.extensions().len(),
        "Starting StorageSaver"
    );

    let service = FileService::new(
        Arc::new(MemoryStore::new()),
        ContentSniffer::new(types),
        config,
    );
    let owner = OwnerId::new();

    for arg in std::env::args().skip(1) {
        upload_path(&service, owner, Path::new(&arg)).await?;
    }

    let listing = service
        .load_thumbnails(owner, KindFilter::All, ArchivedFilter::Any)
        .await?;
    println!("{}", serde_json::to_string_pretty(&listing)?);

    info!(
        files = listing.len(),
        bytes = service.storage_used(owner)?,
        "Done"
    );

    Ok(())
}

async fn upload_path(service: &FileService, owner: OwnerId, path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("not a file path: {}", path.display()))?
        .to_string();
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let request = UploadRequest {
        name: name.clone(),
        data: data.into(),
        overwrite: false,
        allow_images: true,
    };

    match service.upload(owner, request).await {
        Ok(_) => Ok(()),
        Err(FileError::DuplicateName(_)) => {
            tracing::warn!(file = %name, "Skipping duplicate name");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("uploading {name}")),
    }
}
