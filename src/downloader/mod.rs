//! Core downloader implementation split into focused submodules.
//!
//! The [`Downloader`] owns the configuration, the article provider, the event
//! channel, the cancellation token and the cleanup registry. Work is split by
//! phase:
//! - [`scheduler`] - Wave-based segment fetching with group fallback
//! - [`assembly`] - Writing decoded parts into output files
//! - [`run`] - Per-file lifecycle: skip, fetch, decode, reassemble, clean up

pub mod assembly;
mod run;
pub mod scheduler;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::Config;
use crate::error::Result;
use crate::nntp::{ArticleProvider, NntpArticleProvider};
use crate::staging::CleanupRegistry;
use crate::types::Event;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Fetches, decodes and reassembles the files of a manifest
///
/// Cloning is cheap; clones share the event channel, the cancellation token
/// and the cleanup registry.
#[derive(Clone)]
pub struct Downloader {
    /// Configuration (immutable for the lifetime of the downloader)
    pub(crate) config: Arc<Config>,
    /// Source of article bodies
    pub(crate) provider: Arc<dyn ArticleProvider>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Cancelled on interrupt; observed between waves and by in-flight fetches
    pub(crate) cancel_token: CancellationToken,
    /// Every staged segment that has not been removed yet
    pub(crate) registry: Arc<CleanupRegistry>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .field("staged", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Downloader {
    /// Create a downloader that fetches from the configured news server
    pub fn new(config: Config) -> Result<Self> {
        let provider = NntpArticleProvider::new(
            config.server.clone(),
            config.timeouts.clone(),
            config.retry.clone(),
        );
        Self::with_provider(config, Arc::new(provider))
    }

    /// Create a downloader that fetches through `provider`
    pub fn with_provider(config: Config, provider: Arc<dyn ArticleProvider>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            provider,
            event_tx,
            cancel_token: CancellationToken::new(),
            registry: Arc::new(CleanupRegistry::new()),
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use slurp::{Config, Downloader, ServerConfig};
    ///
    /// # fn example() -> slurp::Result<()> {
    /// let server = ServerConfig::from_address("news.example.com", true)?;
    /// let downloader = Downloader::new(Config::new(server))?;
    ///
    /// let mut events = downloader.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "download event");
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that interrupts the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Get the configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Registry of staged segments awaiting removal
    pub fn registry(&self) -> &Arc<CleanupRegistry> {
        &self.registry
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
