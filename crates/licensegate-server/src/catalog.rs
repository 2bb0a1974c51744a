use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use licensegate_contracts::CatalogEntry;
use licensegate_kernel::parse_catalog_csv;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("catalog read failed for {path}: {message}")]
    Read { path: String, message: String },
}

type LoadResult = Result<Arc<Vec<CatalogEntry>>, CatalogError>;

/// Memoized master software list. The slot lock is held across the read, so concurrent first
/// callers wait for the one in-flight load and share its result, failures included, until
/// [`CatalogCache::clear`].
pub struct CatalogCache {
    path: PathBuf,
    slot: Mutex<Option<LoadResult>>,
    source_reads: AtomicUsize,
}

impl CatalogCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: Mutex::new(None),
            source_reads: AtomicUsize::new(0),
        }
    }

    pub async fn load(&self) -> LoadResult {
        let mut slot = self.slot.lock().await;
        if let Some(loaded) = slot.as_ref() {
            return loaded.clone();
        }

        self.source_reads.fetch_add(1, Ordering::SeqCst);
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let entries = parse_catalog_csv(&String::from_utf8_lossy(&bytes));
                info!(
                    path = %self.path.display(),
                    entries = entries.len(),
                    "catalog loaded"
                );
                Ok(Arc::new(entries))
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "catalog load failed");
                Err(CatalogError::Read {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };
        *slot = Some(loaded.clone());
        loaded
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }

    /// Number of times the source file has been read.
    pub fn source_reads(&self) -> usize {
        self.source_reads.load(Ordering::SeqCst)
    }
}
