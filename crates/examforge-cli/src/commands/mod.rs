//! Subcommand implementations and the wiring they share.

pub mod ai_info;
pub mod create;
pub mod evaluate;
pub mod init;
pub mod list_models;
pub mod manage;
pub mod patterns;
pub mod results;
pub mod session;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use examforge_core::engine::ExamEngine;
use examforge_core::traits::{BlobStore, ExamStore};
use examforge_providers::{create_backend, load_config_from, ExamforgeConfig};
use examforge_store::{FsBlobStore, MemoryStore, SqliteStore};

/// Build an engine from the config file, its backend and its stores.
pub async fn engine(config_path: Option<&Path>) -> Result<ExamEngine> {
    let config = load_config_from(config_path)?;
    engine_from(&config).await
}

pub async fn engine_from(config: &ExamforgeConfig) -> Result<ExamEngine> {
    let backend = create_backend(config)?;
    let store: Arc<dyn ExamStore> = match &config.store.database {
        Some(path) => Arc::new(
            SqliteStore::open(path)
                .await
                .with_context(|| format!("failed to open exam store {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.uploads.dir));
    let catalog = config.pattern_catalog()?;
    Ok(ExamEngine::new(
        catalog,
        backend,
        store,
        blobs,
        config.engine_config(),
    ))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render seconds as `h:mm:ss`.
pub fn clock(seconds: u32) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
