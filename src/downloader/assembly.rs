//! Reassembly of decoded parts into output files.
//!
//! Parts are written to `<name>.part` next to the final output and only
//! renamed into place by [`OutputAssembler::commit`]. A file that turns out
//! to be incomplete never leaves anything under its final name.

use crate::error::Result;
use crate::staging::CleanupRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// Suffix of in-progress outputs
const PARTIAL_SUFFIX: &str = ".part";

/// Reduce a name taken from a yEnc header or manifest subject to a bare file name.
///
/// Directory components are dropped so a hostile header cannot write outside
/// the output directory. Returns `None` when nothing usable is left.
pub fn safe_file_name(name: &str) -> Option<String> {
    let name = name.trim().replace('\\', "/");
    let base = name.rsplit('/').next()?.trim();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base.to_string())
}

/// An output being written: where it ends up and where it lives until then
#[derive(Debug)]
struct PendingOutput {
    path: PathBuf,
    partial: PathBuf,
}

/// Writes decoded parts to files in one output directory
///
/// One assembler serves one manifest file and is driven sequentially, so the
/// same output file never has two writers. Partial files are registered with
/// the run's [`CleanupRegistry`] before the first byte is written and stay
/// registered until [`commit`](Self::commit) or [`discard`](Self::discard).
#[derive(Debug)]
pub struct OutputAssembler {
    output_dir: PathBuf,
    registry: Arc<CleanupRegistry>,
    pending: Vec<PendingOutput>,
}

impl OutputAssembler {
    /// Create an assembler writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, registry: Arc<CleanupRegistry>) -> Self {
        Self {
            output_dir: output_dir.into(),
            registry,
            pending: Vec::new(),
        }
    }

    /// Path a (sanitized) output name resolves to
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Path the output `name` is written to until it is committed
    pub fn partial_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}{PARTIAL_SUFFIX}"))
    }

    /// Write one decoded part.
    ///
    /// The first write of an output, and any part 1 (which includes every
    /// single-part file), truncates or creates its partial file; later parts
    /// are appended. `name` must already be a bare file name (see
    /// [`safe_file_name`]).
    pub async fn append(&mut self, name: &str, part: u32, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.output_path(name);
        let fresh = !self.pending.iter().any(|p| p.path == path);
        let partial = self.partial_path(name);
        if fresh {
            self.registry.register(&partial);
            self.pending.push(PendingOutput {
                path: path.clone(),
                partial: partial.clone(),
            });
        }

        let mut options = tokio::fs::OpenOptions::new();
        if fresh || part <= 1 {
            options.write(true).create(true).truncate(true);
        } else {
            options.append(true).create(true);
        }
        let mut file = options.open(&partial).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        trace!(path = %partial.display(), part, bytes = bytes.len(), "wrote part");
        Ok(path)
    }

    /// Move every partial file to its final name and return the final paths.
    ///
    /// An output that fails to move stays registered, so the end-of-run sweep
    /// removes its partial file.
    pub async fn commit(self) -> Result<Vec<PathBuf>> {
        let mut outputs = Vec::with_capacity(self.pending.len());
        for pending in self.pending {
            tokio::fs::rename(&pending.partial, &pending.path).await?;
            self.registry.unregister(&pending.partial);
            debug!(path = %pending.path.display(), "output committed");
            outputs.push(pending.path);
        }
        Ok(outputs)
    }

    /// Delete every partial file without touching the final names
    pub async fn discard(self) {
        for pending in self.pending {
            match tokio::fs::remove_file(&pending.partial).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    // Left registered for the end-of-run sweep
                    warn!(path = %pending.partial.display(), error = %e, "failed to remove partial output");
                    continue;
                }
            }
            self.registry.unregister(&pending.partial);
        }
    }
}

/// Whether an output for the manifest name `name` already exists in `dir`
pub async fn output_exists(dir: &Path, name: &str) -> bool {
    match safe_file_name(name) {
        Some(name) => tokio::fs::try_exists(dir.join(name)).await.unwrap_or(false),
        None => false,
    }
}
