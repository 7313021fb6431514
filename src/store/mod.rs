//! Durable collection storage.
//!
//! The live collection is one JSON document that is replaced wholesale on
//! every persist. Archive and error snapshots are timestamped siblings that
//! are never overwritten.

use crate::models::{Author, Collection};
use anyhow::{Context, Result};
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a stored collection could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no collection file at {0}")]
    Missing(PathBuf),

    #[error("collection file is unreadable: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("collection file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Read a collection document from disk.
pub fn load(path: &Path) -> Result<Collection, LoadError> {
    if !path.exists() {
        return Err(LoadError::Missing(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let mut collection: Collection = serde_json::from_str(&content)?;
    collection.recount();
    Ok(collection)
}

/// Load a collection, treating a missing, unreadable or corrupt file as
/// "no prior collection".
pub fn load_or_empty(path: &Path) -> Collection {
    match load(path) {
        Ok(collection) => {
            info!(
                "Loaded {} posts from {} users ({})",
                collection.total_post_count,
                collection.users.len(),
                path.display()
            );
            collection
        }
        Err(LoadError::Missing(_)) => {
            debug!("No collection at {}, starting empty", path.display());
            Collection::new()
        }
        Err(e) => {
            warn!("{}; starting with an empty collection", e);
            Collection::new()
        }
    }
}

/// The live collection plus the files that back it.
pub struct CollectionStore {
    path: PathBuf,
    archive_dir: PathBuf,
    collection: Collection,
}

impl CollectionStore {
    /// Open the store at `path`, loading whatever is already there.
    pub fn open(path: PathBuf, archive_dir: PathBuf) -> Self {
        let collection = load_or_empty(&path);
        Self {
            path,
            archive_dir,
            collection,
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut Collection {
        &mut self.collection
    }

    pub fn total_posts(&self) -> usize {
        self.collection.total_post_count
    }

    pub fn has_pending(&self) -> bool {
        self.collection.has_pending()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge a batch into the live collection. Returns posts added.
    pub fn merge(&mut self, batch: Vec<Author>) -> usize {
        self.collection.merge(batch)
    }

    /// Overwrite the live file with the current collection.
    pub fn persist(&self) -> Result<()> {
        write_atomic(&self.path, &self.collection)
    }

    /// Move the live file to a timestamped archive. Returns the archive path.
    pub fn archive(&self) -> Result<PathBuf> {
        // The in-memory collection may carry fields set since the last persist.
        self.persist()?;

        std::fs::create_dir_all(&self.archive_dir).with_context(|| {
            format!(
                "Failed to create archive directory: {}",
                self.archive_dir.display()
            )
        })?;

        let target = unique_snapshot_path(&self.archive_dir, "archive_posts");
        std::fs::rename(&self.path, &target).with_context(|| {
            format!(
                "Failed to archive {} to {}",
                self.path.display(),
                target.display()
            )
        })?;

        info!("Archived posts to {}", target.display());
        Ok(target)
    }

    /// Write the current collection to a timestamped error snapshot.
    pub fn snapshot_error(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.archive_dir).with_context(|| {
            format!(
                "Failed to create archive directory: {}",
                self.archive_dir.display()
            )
        })?;

        let target = unique_snapshot_path(&self.archive_dir, "error_posts");
        write_atomic(&target, &self.collection)?;

        info!("Saved current state to {}", target.display());
        Ok(target)
    }

    /// Empty the collection in memory and on disk.
    pub fn reset(&mut self) -> Result<()> {
        self.collection = Collection::new();
        self.persist()
    }
}

/// Write `collection` to `path` through a temp file in the same directory.
fn write_atomic(path: &Path, collection: &Collection) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let json =
        serde_json::to_string_pretty(collection).context("Failed to serialize collection")?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())
        .context("Failed to write collection")?;
    tmp.as_file()
        .sync_all()
        .context("Failed to flush collection")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!(
        "Persisted {} posts to {}",
        collection.total_post_count,
        path.display()
    );
    Ok(())
}

/// `<dir>/<prefix>_YYYYMMDD_HHMMSS.json`, suffixed `_1`, `_2`, ... if taken.
fn unique_snapshot_path(dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{}_{}", prefix, stamp);

    let mut candidate = dir.join(format!("{}.json", base));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.json", base, n));
        n += 1;
    }
    candidate
}
