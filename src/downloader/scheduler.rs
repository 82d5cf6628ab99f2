//! Fetch scheduler: bounded-concurrency waves with per-segment group fallback.
//!
//! A file's segments are cut into consecutive waves of at most `concurrency`
//! segments. Every segment of a wave is fetched by its own task and the wave
//! is joined before the next one starts, so no more than `concurrency`
//! fetches are ever in flight.

use crate::error::{Error, Result};
use crate::nntp::ArticleProvider;
use crate::staging::{StagedSegment, StagingArea};
use crate::types::{Event, FetchOutcome, FileDescriptor, SegmentRef};
use crate::utils::percent;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a wave needs, shared by all of its tasks
#[derive(Clone)]
pub struct FetchContext {
    /// Source of article bodies
    pub provider: Arc<dyn ArticleProvider>,
    /// Where fetched bodies are persisted
    pub staging: StagingArea,
    /// Progress and missing-segment events
    pub event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Observed between waves and raced against in-flight fetches
    pub cancel_token: CancellationToken,
    /// Wave width
    pub concurrency: usize,
}

/// What happened to a single segment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentFetch {
    /// Body was fetched from one of the groups and staged
    Staged(StagedSegment),
    /// Every candidate group was tried without success
    Missing(SegmentRef),
}

/// Result of [`fetch_all`]
#[derive(Debug)]
pub struct FetchReport {
    /// Complete, or the list of missing segments
    pub outcome: FetchOutcome,
    /// Staged segments in ascending `number` order
    pub staged: Vec<StagedSegment>,
}

/// Fetch one segment, trying each candidate group in order.
///
/// Recoverable failures move on to the next group; the first success is
/// staged and ends the search. Running out of groups is not an error: the
/// segment is reported as [`SegmentFetch::Missing`].
pub async fn fetch_one(
    provider: &dyn ArticleProvider,
    staging: &StagingArea,
    segment: &SegmentRef,
    groups: &[String],
    cancel_token: &CancellationToken,
) -> Result<SegmentFetch> {
    for group in groups {
        let body = tokio::select! {
            _ = cancel_token.cancelled() => return Err(Error::Cancelled),
            body = provider.fetch_body(group, &segment.message_id) => body,
        };

        match body {
            Ok(body) => {
                let staged = staging.stage(segment, &body).await?;
                return Ok(SegmentFetch::Staged(staged));
            }
            Err(e) if e.is_recoverable() => {
                debug!(
                    segment = segment.number,
                    message_id = %segment.message_id,
                    group = %group,
                    error = %e,
                    "segment not available, trying next group"
                );
            }
            Err(e) => return Err(Error::Nntp(e)),
        }
    }

    Ok(SegmentFetch::Missing(segment.clone()))
}

/// Fetch every segment of `file` in waves of `ctx.concurrency`.
///
/// A fatal error in any task aborts the file once its wave has been joined;
/// the staged segments of the file are removed before the error is returned.
/// On cancellation, [`Error::Cancelled`] is returned and staged files are left
/// for the registry sweep.
pub async fn fetch_all(ctx: &FetchContext, file: &FileDescriptor) -> Result<FetchReport> {
    let started = std::time::Instant::now();
    let groups: Arc<[String]> = file.groups.clone().into();
    let width = ctx.concurrency.max(1);

    let mut staged = Vec::with_capacity(file.segments.len());
    let mut missing = Vec::new();
    let mut staged_bytes: u64 = 0;

    for wave in file.segments.chunks(width) {
        if ctx.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut fatal: Option<Error> = None;

        let mut tasks = JoinSet::new();
        for segment in wave {
            let provider = Arc::clone(&ctx.provider);
            let staging = ctx.staging.clone();
            let groups = Arc::clone(&groups);
            let cancel_token = ctx.cancel_token.clone();
            let segment = segment.clone();
            tasks.spawn(async move {
                fetch_one(provider.as_ref(), &staging, &segment, &groups, &cancel_token).await
            });
        }

        // Barrier: every task of the wave finishes before the next wave starts
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .unwrap_or_else(|e| Err(Error::Other(format!("fetch task failed: {e}"))));
            match result {
                Ok(SegmentFetch::Staged(segment)) => {
                    staged_bytes += wave
                        .iter()
                        .find(|s| s.number == segment.number)
                        .map_or(0, |s| s.declared_bytes);
                    staged.push(segment);
                }
                Ok(SegmentFetch::Missing(segment)) => {
                    warn!(
                        file = %file.name,
                        segment = segment.number,
                        message_id = %segment.message_id,
                        "segment missing from every group"
                    );
                    ctx.event_tx
                        .send(Event::SegmentMissing {
                            name: file.name.clone(),
                            segment: segment.number,
                            message_id: segment.message_id.clone(),
                        })
                        .ok();
                    missing.push(segment);
                }
                Err(e) => {
                    // Keep the most severe error: cancellation wins, then run-aborting ones
                    let replace = match (&fatal, &e) {
                        (None, _) => true,
                        (Some(Error::Cancelled), _) => false,
                        (_, Error::Cancelled) => true,
                        (Some(current), Error::Nntp(n)) => n.aborts_run() && !aborts_run(current),
                        _ => false,
                    };
                    if replace {
                        fatal = Some(e);
                    }
                }
            }
        }

        if let Some(e) = fatal {
            if !matches!(e, Error::Cancelled) {
                ctx.staging.remove_all(&staged).await;
            }
            return Err(e);
        }

        ctx.event_tx
            .send(Event::Progress {
                name: file.name.clone(),
                percent: percent(staged_bytes, file.total_bytes),
                staged_bytes,
                total_bytes: file.total_bytes,
                elapsed: started.elapsed(),
            })
            .ok();
    }

    staged.sort_by_key(|s| s.number);
    missing.sort_by_key(|s| s.number);

    let outcome = if missing.is_empty() {
        FetchOutcome::Complete
    } else {
        FetchOutcome::Incomplete { missing }
    };
    Ok(FetchReport { outcome, staged })
}

fn aborts_run(error: &Error) -> bool {
    matches!(error, Error::Nntp(e) if e.aborts_run())
}

/// Whether `error` stops the whole run rather than just the current file
pub(crate) fn is_run_fatal(error: &Error) -> bool {
    matches!(error, Error::Cancelled) || aborts_run(error)
}
