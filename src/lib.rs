//! # slurp
//!
//! Fetch, verify and reassemble yEnc-encoded binaries described by an NZB
//! manifest from a single NNTP server.
//!
//! ## Pipeline
//!
//! - [`manifest`] - Parse the NZB into [`FileDescriptor`]s
//! - [`downloader::scheduler`] - Fetch segments in bounded waves, falling back
//!   across the file's newsgroups
//! - [`staging`] - Persist raw bodies and track them for cleanup
//! - [`yenc`] - Decode and checksum each body
//! - [`downloader::assembly`] - Append verified parts to the output files
//!
//! ## Quick Start
//!
//! ```no_run
//! use slurp::{Config, Downloader, NameFilter, ServerConfig, manifest};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ServerConfig::from_address("news.example.com:563", true)?
//!         .with_credentials("user", "pass");
//!     let downloader = Downloader::new(Config::new(server))?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let manifest = manifest::load_nzb(Path::new("release.nzb")).await?;
//!     let summary = downloader.run(&manifest.files, &NameFilter::all()).await?;
//!     println!("{} files in {:?}", summary.files.len(), summary.duration());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Segment scheduling, decoding and reassembly
pub mod downloader;
/// Error types
pub mod error;
/// File selection by name pattern
pub mod filter;
/// NZB manifest loading
pub mod manifest;
/// NNTP client and the article provider seam
pub mod nntp;
/// Retry logic with exponential backoff
pub mod retry;
/// Staged segment storage and the cleanup registry
pub mod staging;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// yEnc decoding
pub mod yenc;

// Re-export commonly used types
pub use config::{Config, RetryConfig, ServerConfig, TimeoutConfig};
pub use downloader::Downloader;
pub use error::{Error, ExitStatus, NntpError, Result, ToExitCode, YencError};
pub use filter::NameFilter;
pub use manifest::Manifest;
pub use nntp::{ArticleProvider, NntpArticleProvider};
pub use staging::CleanupRegistry;
pub use types::{
    ChecksumWarning, Event, FetchOutcome, FileDescriptor, FileOutcome, FileReport, RunSummary,
    SegmentRef,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns once the token is cancelled, whether by a signal or by someone else.
///
/// # Example
///
/// ```no_run
/// use slurp::{Config, Downloader, ServerConfig, cancel_on_signal};
///
/// # async fn example() -> slurp::Result<()> {
/// let downloader = Downloader::new(Config::new(ServerConfig::from_address("news.example.com", false)?))?;
/// tokio::spawn(cancel_on_signal(downloader.cancel_token()));
/// # Ok(())
/// # }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("interrupt received, cancelling run");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::debug!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::debug!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        // Without a signal source nothing can interrupt the run
        std::future::pending::<()>().await;
    }
}
