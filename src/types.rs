//! Core types for slurp

use crate::error::ExitStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One article to fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRef {
    /// 1-based sequence position within the file (unique, not necessarily contiguous)
    pub number: u32,
    /// Message-ID identifying the article on the server (without angle brackets)
    pub message_id: String,
    /// Size hint from the manifest, used only for progress accounting
    pub declared_bytes: u64,
}

/// One logical output file described by the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Canonical output filename from the manifest subject
    pub name: String,
    /// Candidate newsgroups in preference order (non-empty)
    pub groups: Vec<String>,
    /// Segments ordered by `number` ascending (non-empty)
    pub segments: Vec<SegmentRef>,
    /// Sum of the declared segment sizes
    pub total_bytes: u64,
    /// Posting time, informational only
    pub posted_at: Option<DateTime<Utc>>,
}

impl FileDescriptor {
    /// Build a descriptor, sorting segments by number and summing declared sizes
    pub fn new(
        name: impl Into<String>,
        groups: Vec<String>,
        mut segments: Vec<SegmentRef>,
        posted_at: Option<DateTime<Utc>>,
    ) -> Self {
        segments.sort_by_key(|s| s.number);
        let total_bytes = segments.iter().map(|s| s.declared_bytes).sum();
        Self {
            name: name.into(),
            groups,
            segments,
            total_bytes,
            posted_at,
        }
    }
}

/// Result of fetching every segment of one file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every segment was staged
    Complete,
    /// At least one segment exhausted all candidate groups
    Incomplete {
        /// Segments that could not be fetched, in number order
        missing: Vec<SegmentRef>,
    },
}

impl FetchOutcome {
    /// Whether every segment was staged
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchOutcome::Complete)
    }
}

/// A decoded part whose checksum did not match and was therefore not written
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChecksumWarning {
    /// Manifest file the part belonged to
    pub file: String,
    /// Segment number
    pub segment: u32,
    /// Checksum declared by the trailer
    pub expected: u32,
    /// Checksum of the decoded bytes
    pub actual: u32,
}

/// Final status of one manifest file
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    /// Reassembled into the listed output files
    Complete {
        /// Output files written (yEnc header names)
        outputs: Vec<PathBuf>,
    },
    /// Not reassembled because segments are missing
    Incomplete {
        /// Message-IDs of the missing segments
        missing: Vec<String>,
    },
    /// Output already existed
    Skipped,
    /// Aborted by a fatal error
    Failed {
        /// Error description
        error: String,
    },
}

/// Per-file entry of a [`RunSummary`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Manifest file name
    pub name: String,
    /// What happened to it
    pub outcome: FileOutcome,
}

/// Result of a complete run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// One entry per selected file, in manifest order
    pub files: Vec<FileReport>,
    /// Parts that were decoded but dropped because of a checksum mismatch
    pub checksum_mismatches: Vec<ChecksumWarning>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Whether any file could not be reassembled because segments were missing
    pub fn has_incomplete(&self) -> bool {
        self.files
            .iter()
            .any(|f| matches!(f.outcome, FileOutcome::Incomplete { .. }))
    }

    /// Whether any file was aborted by a fatal error
    pub fn has_failed(&self) -> bool {
        self.files
            .iter()
            .any(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
    }

    /// Process-level status: failures outrank incomplete files
    pub fn exit_status(&self) -> ExitStatus {
        if self.has_failed() {
            ExitStatus::Fatal
        } else if self.has_incomplete() {
            ExitStatus::Incomplete
        } else {
            ExitStatus::Success
        }
    }

    /// Wall-clock duration of the run
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Event emitted by the downloader
///
/// Consumers subscribe via [`crate::Downloader::subscribe`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Started working on a file
    FileStarted {
        /// 1-based position among the selected files
        index: usize,
        /// Number of selected files
        count: usize,
        /// Manifest file name
        name: String,
    },

    /// Skipped a file whose output already exists
    FileSkipped {
        /// Manifest file name
        name: String,
    },

    /// A wave of fetches finished
    Progress {
        /// Manifest file name
        name: String,
        /// Percentage of declared bytes staged so far (0.0 - 100.0)
        percent: f32,
        /// Declared bytes staged so far
        staged_bytes: u64,
        /// Declared bytes of the whole file
        total_bytes: u64,
        /// Time since the file started
        elapsed: Duration,
    },

    /// A segment exhausted every candidate group
    SegmentMissing {
        /// Manifest file name
        name: String,
        /// Segment number
        segment: u32,
        /// Message-ID
        message_id: String,
    },

    /// A decoded part was dropped because its checksum did not match
    ChecksumMismatch {
        /// Manifest file name
        name: String,
        /// Segment number
        segment: u32,
    },

    /// A file was reassembled
    FileComplete {
        /// Manifest file name
        name: String,
    },

    /// A file could not be reassembled
    FileIncomplete {
        /// Manifest file name
        name: String,
        /// Number of missing segments
        missing: usize,
    },

    /// A file was aborted by a fatal error
    FileFailed {
        /// Manifest file name
        name: String,
        /// Error description
        error: String,
    },

    /// Run was interrupted and staged segments were swept
    Cancelled {
        /// Number of staged files removed
        swept: usize,
    },
}
