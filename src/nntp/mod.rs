//! NNTP protocol client
//!
//! [`NntpConnection`] speaks the wire protocol for one session. The scheduler
//! never touches it directly: it goes through the [`ArticleProvider`] seam so
//! tests can substitute scripted responses for a real server.

mod connection;
pub mod response;

pub use connection::{NntpConnection, normalize_message_id};

use crate::config::{RetryConfig, ServerConfig, TimeoutConfig};
use crate::error::NntpError;
use crate::retry::with_retry;
use async_trait::async_trait;

/// Source of raw article bodies
///
/// Implementations must classify every failure into [`NntpError`]; the
/// scheduler relies on [`NntpError::is_recoverable`] to decide whether to try
/// the next candidate group.
#[async_trait]
pub trait ArticleProvider: Send + Sync {
    /// Select `group` and fetch the raw body of `message_id` from it
    async fn fetch_body(&self, group: &str, message_id: &str) -> Result<Vec<u8>, NntpError>;
}

/// [`ArticleProvider`] backed by a real news server.
///
/// Every call opens a fresh connection, authenticates, selects the group,
/// fetches one body and closes the session, so a broken connection only ever
/// affects the attempt that owns it.
#[derive(Clone, Debug)]
pub struct NntpArticleProvider {
    server: ServerConfig,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
}

impl NntpArticleProvider {
    /// Create a provider for `server`
    pub fn new(server: ServerConfig, timeouts: TimeoutConfig, retry: RetryConfig) -> Self {
        Self {
            server,
            timeouts,
            retry,
        }
    }

    /// Open an authenticated session, retrying transient connect failures
    pub async fn open_session(&self) -> Result<NntpConnection, NntpError> {
        let server = &self.server;
        let timeouts = &self.timeouts;
        with_retry(&self.retry, || async move {
            let mut conn = NntpConnection::connect(server, timeouts).await?;
            conn.authenticate(&server.username, &server.password).await?;
            Ok::<_, NntpError>(conn)
        })
        .await
    }
}

#[async_trait]
impl ArticleProvider for NntpArticleProvider {
    async fn fetch_body(&self, group: &str, message_id: &str) -> Result<Vec<u8>, NntpError> {
        // Not worth a connection
        normalize_message_id(message_id)?;
        let mut conn = self.open_session().await?;

        let result = match conn.select_group(group).await {
            Ok(()) => conn.fetch_body(message_id).await,
            Err(e) => Err(e),
        };

        match &result {
            // The session is still in a known state, so say goodbye
            Ok(_) | Err(NntpError::NotFound { .. }) | Err(NntpError::Group { .. }) => {
                conn.close().await
            }
            Err(_) => drop(conn),
        }
        result
    }
}
