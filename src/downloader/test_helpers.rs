//! Shared test helpers: a scripted article provider and yEnc body builders.

use crate::config::{Config, ServerConfig};
use crate::downloader::Downloader;
use crate::error::NntpError;
use crate::nntp::ArticleProvider;
use crate::types::{FileDescriptor, SegmentRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Scripted reply for one (group, message-id) pair
#[derive(Clone, Debug)]
pub(crate) enum MockReply {
    Body(Vec<u8>),
    NotFound,
    NoSuchGroup,
    AuthRejected,
    Fatal,
    /// Never completes (until the caller gives up)
    Hang,
}

/// [`ArticleProvider`] that answers from a script and records every call.
///
/// Unscripted pairs answer `430 no such article`.
#[derive(Default)]
pub(crate) struct MockArticleProvider {
    replies: Mutex<HashMap<(String, String), MockReply>>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl MockArticleProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `delay` before answering
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn reply(self, group: &str, message_id: &str, reply: MockReply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert((group.to_string(), message_id.to_string()), reply);
        self
    }

    pub(crate) fn body(self, group: &str, message_id: &str, body: Vec<u8>) -> Self {
        self.reply(group, message_id, MockReply::Body(body))
    }

    /// (group, message-id) pairs in call order
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, message_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, id)| id == message_id)
            .map(|(group, _)| group)
            .collect()
    }

    /// Highest number of fetches that were ever in flight together
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ArticleProvider for MockArticleProvider {
    async fn fetch_body(&self, group: &str, message_id: &str) -> Result<Vec<u8>, NntpError> {
        self.calls
            .lock()
            .unwrap()
            .push((group.to_string(), message_id.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&(group.to_string(), message_id.to_string()))
            .cloned()
            .unwrap_or(MockReply::NotFound);

        match reply {
            MockReply::Body(body) => Ok(body),
            MockReply::NotFound => Err(NntpError::NotFound {
                message_id: message_id.to_string(),
                code: 430,
            }),
            MockReply::NoSuchGroup => Err(NntpError::Group {
                group: group.to_string(),
                code: 411,
                message: "No such group".into(),
            }),
            MockReply::AuthRejected => Err(NntpError::Auth {
                code: 481,
                message: "Authentication failed".into(),
            }),
            MockReply::Fatal => Err(NntpError::Protocol {
                code: 502,
                message: "Access denied".into(),
            }),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

/// yEnc-encode `data` (escaping NUL, LF, CR and `=`)
pub(crate) fn yenc_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 4);
    for (i, &byte) in data.iter().enumerate() {
        let encoded = byte.wrapping_add(42);
        match encoded {
            0x00 | 0x0A | 0x0D | 0x3D => {
                out.push(b'=');
                out.push(encoded.wrapping_add(64));
            }
            _ => out.push(encoded),
        }
        if (i + 1) % 128 == 0 {
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Single-part yEnc article body with a `crc32` trailer
pub(crate) fn single_part_body(name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!("=ybegin line=128 size={} name={}\r\n", data.len(), name).into_bytes();
    body.extend(yenc_encode(data));
    body.extend(
        format!(
            "=yend size={} crc32={:08x}\r\n",
            data.len(),
            crc32fast::hash(data)
        )
        .into_bytes(),
    );
    body
}

/// One part of a multipart yEnc file with a `pcrc32` trailer
pub(crate) fn multipart_body(name: &str, part: u32, total: u32, total_size: usize, begin: usize, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "=ybegin part={} total={} line=128 size={} name={}\r\n=ypart begin={} end={}\r\n",
        part,
        total,
        total_size,
        name,
        begin + 1,
        begin + data.len()
    )
    .into_bytes();
    body.extend(yenc_encode(data));
    body.extend(
        format!(
            "=yend size={} part={} pcrc32={:08x}\r\n",
            data.len(),
            part,
            crc32fast::hash(data)
        )
        .into_bytes(),
    );
    body
}

/// Split `data` into `parts` multipart bodies (message-ids `<prefix>-<n>@test`)
pub(crate) fn split_into_parts(name: &str, prefix: &str, data: &[u8], parts: usize) -> Vec<(SegmentRef, Vec<u8>)> {
    let chunk = data.len().div_ceil(parts);
    data.chunks(chunk)
        .enumerate()
        .map(|(i, piece)| {
            let number = i as u32 + 1;
            let body = multipart_body(name, number, parts as u32, data.len(), i * chunk, piece);
            let segment = SegmentRef {
                number,
                message_id: format!("{prefix}-{number}@test"),
                declared_bytes: body.len() as u64,
            };
            (segment, body)
        })
        .collect()
}

pub(crate) fn segment(number: u32, message_id: &str, declared_bytes: u64) -> SegmentRef {
    SegmentRef {
        number,
        message_id: message_id.to_string(),
        declared_bytes,
    }
}

pub(crate) fn file(name: &str, groups: &[&str], segments: Vec<SegmentRef>) -> FileDescriptor {
    FileDescriptor::new(
        name,
        groups.iter().map(|g| g.to_string()).collect(),
        segments,
        None,
    )
}

/// Downloader writing into a fresh temp dir, fetching through `provider`.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) fn create_test_downloader(
    provider: Arc<MockArticleProvider>,
    concurrency: usize,
) -> (Downloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::new(ServerConfig::from_address("news.test", false).unwrap());
    config.concurrency = concurrency;
    config.staging_dir = temp_dir.path().join("staging");
    config.output_dir = temp_dir.path().join("output");

    let downloader = Downloader::with_provider(config, provider).unwrap();
    (downloader, temp_dir)
}

/// Files left in a directory (empty if it does not exist)
pub(crate) fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
