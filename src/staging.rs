//! On-disk staging of fetched article bodies.
//!
//! Every staged file is recorded in a [`CleanupRegistry`] *before* it is
//! written, so a sweep after cancellation also catches files whose write was
//! interrupted. The registry is the only state workers mutate concurrently.

use crate::error::{Error, Result};
use crate::types::SegmentRef;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Longest sanitized message-id prefix kept in a staged filename
const MAX_STEM_LEN: usize = 96;

/// Registry of staged segments and partial outputs that still need to be removed
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    paths: Mutex<HashSet<PathBuf>>,
}

impl CleanupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        // A panicking worker cannot leave the set half-updated
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a path for cleanup
    pub fn register(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    /// Forget a path (after it has been deleted)
    pub fn unregister(&self, path: &Path) {
        self.lock().remove(path);
    }

    /// Whether a path is currently registered
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    /// Number of registered paths
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delete every registered file and clear the registry.
    ///
    /// Files that are already gone are not an error. Returns the number of
    /// files actually removed from disk.
    pub async fn sweep(&self) -> usize {
        let paths: Vec<PathBuf> = self.lock().drain().collect();
        let mut removed = 0;
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged segment"),
            }
        }
        debug!(removed, "swept staged segments");
        removed
    }
}

/// A fetched article body persisted to disk, still encoded
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedSegment {
    /// Segment number within its file
    pub number: u32,
    /// Message-ID the body was fetched for
    pub message_id: String,
    /// Location of the raw body
    pub path: PathBuf,
    /// Actual number of bytes staged
    pub size: u64,
}

/// Directory of staged segments plus the shared cleanup registry
#[derive(Clone, Debug)]
pub struct StagingArea {
    dir: PathBuf,
    registry: Arc<CleanupRegistry>,
}

impl StagingArea {
    /// Create a staging area in `dir`, tracking files in `registry`
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<CleanupRegistry>) -> Self {
        Self {
            dir: dir.into(),
            registry,
        }
    }

    /// Staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared cleanup registry
    pub fn registry(&self) -> &Arc<CleanupRegistry> {
        &self.registry
    }

    /// Staged file path for a segment.
    ///
    /// The name is the message-id with filesystem-unsafe characters replaced,
    /// plus a hash of the raw id so two ids never share a file.
    pub fn path_for(&self, segment: &SegmentRef) -> PathBuf {
        let id = segment.message_id.trim_start_matches('<').trim_end_matches('>');
        let stem: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_STEM_LEN)
            .collect();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        segment.message_id.hash(&mut hasher);

        self.dir
            .join(format!("{}.{:016x}.seg", stem, hasher.finish()))
    }

    /// Persist a raw article body for `segment`
    pub async fn stage(&self, segment: &SegmentRef, body: &[u8]) -> Result<StagedSegment> {
        let path = self.path_for(segment);
        self.registry.register(&path);

        if let Err(source) = tokio::fs::write(&path, body).await {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => self.registry.unregister(&path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.registry.unregister(&path)
                }
                // Partial file still on disk: leave it for the sweep
                Err(_) => {}
            }
            return Err(Error::Staging { path, source });
        }

        debug!(
            segment = segment.number,
            message_id = %segment.message_id,
            bytes = body.len(),
            "staged segment"
        );

        Ok(StagedSegment {
            number: segment.number,
            message_id: segment.message_id.clone(),
            path,
            size: body.len() as u64,
        })
    }

    /// Read a staged body back for decoding
    pub async fn read(&self, staged: &StagedSegment) -> Result<Vec<u8>> {
        tokio::fs::read(&staged.path)
            .await
            .map_err(|source| Error::Staging {
                path: staged.path.clone(),
                source,
            })
    }

    /// Delete a staged body and drop it from the registry
    pub async fn remove(&self, staged: &StagedSegment) -> Result<()> {
        match tokio::fs::remove_file(&staged.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Staging {
                    path: staged.path.clone(),
                    source,
                });
            }
        }
        self.registry.unregister(&staged.path);
        Ok(())
    }

    /// Delete every staged body in `staged`, logging failures
    pub async fn remove_all(&self, staged: &[StagedSegment]) {
        for segment in staged {
            if let Err(e) = self.remove(segment).await {
                warn!(segment = segment.number, error = %e, "failed to remove staged segment");
            }
        }
    }
}
