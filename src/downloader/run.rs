//! Run controller: drives every selected file through fetch, decode and reassembly.

use super::Downloader;
use super::assembly::{OutputAssembler, output_exists, safe_file_name};
use super::scheduler::{FetchContext, fetch_all, is_run_fatal};
use crate::error::{Error, Result, YencError};
use crate::filter::NameFilter;
use crate::staging::{StagedSegment, StagingArea};
use crate::types::{
    ChecksumWarning, Event, FetchOutcome, FileDescriptor, FileOutcome, FileReport, RunSummary,
};
use crate::yenc;
use tracing::{debug, error, info, warn};

/// Result of decoding and reassembling one fully fetched file
pub(super) struct Reassembled {
    pub(super) outputs: Vec<std::path::PathBuf>,
    /// Message-IDs of staged bodies that were not valid yEnc
    malformed: Vec<String>,
    mismatches: Vec<ChecksumWarning>,
}

impl Downloader {
    /// Process every file of `files` selected by `filter`, in manifest order.
    ///
    /// Per-file failures are recorded in the returned [`RunSummary`]; an
    /// authentication failure additionally stops the run after the current
    /// file. When the cancel token fires, every staged segment is swept and
    /// [`Error::Cancelled`] is returned.
    pub async fn run(&self, files: &[FileDescriptor], filter: &NameFilter) -> Result<RunSummary> {
        let mut summary = RunSummary {
            started_at: chrono::Utc::now(),
            ..Default::default()
        };

        tokio::fs::create_dir_all(&self.config.staging_dir).await?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let selected: Vec<&FileDescriptor> =
            files.iter().filter(|f| filter.matches(&f.name)).collect();
        let count = selected.len();
        info!(selected = count, total = files.len(), "starting run");

        let staging = StagingArea::new(&self.config.staging_dir, self.registry.clone());
        let ctx = FetchContext {
            provider: self.provider.clone(),
            staging: staging.clone(),
            event_tx: self.event_tx.clone(),
            cancel_token: self.cancel_token.clone(),
            concurrency: self.config.concurrency,
        };

        for (i, file) in selected.into_iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                return Err(self.abort_cancelled().await);
            }

            info!(file = %file.name, "{}/{} ({})", i + 1, count, file.name);
            self.emit(Event::FileStarted {
                index: i + 1,
                count,
                name: file.name.clone(),
            });

            if self.config.skip_existing && output_exists(&self.config.output_dir, &file.name).await
            {
                info!(file = %file.name, "output already exists, skipping");
                self.emit(Event::FileSkipped {
                    name: file.name.clone(),
                });
                summary.files.push(FileReport {
                    name: file.name.clone(),
                    outcome: FileOutcome::Skipped,
                });
                continue;
            }

            match self.process_file(&ctx, file).await {
                Ok((outcome, mut mismatches)) => {
                    summary.checksum_mismatches.append(&mut mismatches);
                    summary.files.push(FileReport {
                        name: file.name.clone(),
                        outcome,
                    });
                }
                Err(Error::Cancelled) => return Err(self.abort_cancelled().await),
                Err(e) => {
                    error!(file = %file.name, error = %e, "file failed");
                    self.emit(Event::FileFailed {
                        name: file.name.clone(),
                        error: e.to_string(),
                    });
                    summary.files.push(FileReport {
                        name: file.name.clone(),
                        outcome: FileOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                    if is_run_fatal(&e) {
                        warn!("stopping run: further requests cannot succeed");
                        break;
                    }
                }
            }
        }

        // Anything still registered belongs to a file that failed mid-write
        if !self.registry.is_empty() {
            self.registry.sweep().await;
        }

        summary.finished_at = chrono::Utc::now();
        Ok(summary)
    }

    async fn abort_cancelled(&self) -> Error {
        let swept = self.registry.sweep().await;
        warn!(swept, "run cancelled, staged segments removed");
        self.emit(Event::Cancelled { swept });
        Error::Cancelled
    }

    async fn process_file(
        &self,
        ctx: &FetchContext,
        file: &FileDescriptor,
    ) -> Result<(FileOutcome, Vec<ChecksumWarning>)> {
        let report = fetch_all(ctx, file).await?;

        if let FetchOutcome::Incomplete { missing } = report.outcome {
            ctx.staging.remove_all(&report.staged).await;
            warn!(
                file = %file.name,
                missing = missing.len(),
                "file incomplete, not reassembling"
            );
            self.emit(Event::FileIncomplete {
                name: file.name.clone(),
                missing: missing.len(),
            });
            let missing = missing.into_iter().map(|s| s.message_id).collect();
            return Ok((FileOutcome::Incomplete { missing }, Vec::new()));
        }

        let reassembled = match self.reassemble(&ctx.staging, file, &report.staged).await {
            Ok(r) => r,
            Err(e) => {
                ctx.staging.remove_all(&report.staged).await;
                return Err(e);
            }
        };

        if !reassembled.malformed.is_empty() {
            warn!(
                file = %file.name,
                malformed = reassembled.malformed.len(),
                "some segments were not valid yEnc"
            );
            self.emit(Event::FileIncomplete {
                name: file.name.clone(),
                missing: reassembled.malformed.len(),
            });
            return Ok((
                FileOutcome::Incomplete {
                    missing: reassembled.malformed,
                },
                reassembled.mismatches,
            ));
        }

        info!(file = %file.name, outputs = reassembled.outputs.len(), "file complete");
        self.emit(Event::FileComplete {
            name: file.name.clone(),
        });
        Ok((
            FileOutcome::Complete {
                outputs: reassembled.outputs,
            },
            reassembled.mismatches,
        ))
    }

    /// Decode staged segments strictly in `number` order and reassemble them.
    ///
    /// Outputs are committed under their final names only when every staged
    /// body decoded; otherwise (or on error and cancellation) the partial
    /// files are discarded. Every staged body is removed once it has been
    /// handled.
    pub(super) async fn reassemble(
        &self,
        staging: &StagingArea,
        file: &FileDescriptor,
        staged: &[StagedSegment],
    ) -> Result<Reassembled> {
        let mut assembler = OutputAssembler::new(&self.config.output_dir, self.registry.clone());

        match self.decode_parts(&mut assembler, staging, file, staged).await {
            Ok((malformed, mismatches)) if malformed.is_empty() => Ok(Reassembled {
                outputs: assembler.commit().await?,
                malformed,
                mismatches,
            }),
            Ok((malformed, mismatches)) => {
                assembler.discard().await;
                Ok(Reassembled {
                    outputs: Vec::new(),
                    malformed,
                    mismatches,
                })
            }
            Err(e) => {
                assembler.discard().await;
                Err(e)
            }
        }
    }

    /// Decode each staged body and hand the usable parts to `assembler`.
    ///
    /// Returns the message-ids of bodies that were not valid yEnc and the
    /// checksum warnings.
    async fn decode_parts(
        &self,
        assembler: &mut OutputAssembler,
        staging: &StagingArea,
        file: &FileDescriptor,
        staged: &[StagedSegment],
    ) -> Result<(Vec<String>, Vec<ChecksumWarning>)> {
        let mut malformed = Vec::new();
        let mut mismatches = Vec::new();

        for (done, segment) in staged.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let body = staging.read(segment).await?;
            match yenc::decode_segment(&body) {
                Ok(part) => match safe_file_name(&part.name) {
                    Some(name) => {
                        assembler.append(&name, part.part, &part.data).await?;
                    }
                    None => {
                        warn!(
                            file = %file.name,
                            segment = segment.number,
                            header_name = %part.name,
                            "unusable output name in yEnc header"
                        );
                        malformed.push(segment.message_id.clone());
                    }
                },
                Err(YencError::ChecksumMismatch { expected, actual }) => {
                    warn!(
                        file = %file.name,
                        segment = segment.number,
                        expected = %format!("{expected:08x}"),
                        actual = %format!("{actual:08x}"),
                        "checksum mismatch, part dropped"
                    );
                    self.emit(Event::ChecksumMismatch {
                        name: file.name.clone(),
                        segment: segment.number,
                    });
                    mismatches.push(ChecksumWarning {
                        file: file.name.clone(),
                        segment: segment.number,
                        expected,
                        actual,
                    });
                }
                Err(e @ YencError::Malformed(_)) => {
                    warn!(
                        file = %file.name,
                        segment = segment.number,
                        error = %e,
                        "segment treated as missing"
                    );
                    malformed.push(segment.message_id.clone());
                }
            }

            staging.remove(segment).await?;
            debug!(
                file = %file.name,
                segment = segment.number,
                "{}/{} decoded",
                done + 1,
                staged.len()
            );
        }

        Ok((malformed, mismatches))
    }
}
