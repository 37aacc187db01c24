//! Processing orchestrator.
//!
//! Drives one [`WorkRequest`] through validation, download, frame
//! extraction, archive upload, source removal and outcome notification:
//!
//! ```text
//! validate ─▶ acquire ─▶ transform ─▶ publish ─▶ retire source ─▶ notify
//!    │           │           │           │        (best effort)      ▲
//!    └───────────┴───────────┴───────────┴───────── failure ─────────┘
//! ```
//!
//! Stages run strictly in sequence and the first failure skips straight to
//! notification. Every invocation ends with exactly one notification attempt.
//! Local scratch files are owned by [`ScratchPath`] guards and are gone by the
//! time `execute` returns, on every path.

use crate::error::{ExtractionError, ProcessingError, TransferError};
use crate::job::{video_extension, ProcessingOutcome, WorkRequest};
use crate::observability::{FileKind, WorkerMetrics};
use crate::ports::{BlobStore, FrameExtractor, Notifier};
use crate::scratch::{encode_path_component, ScratchPath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

/// Fixed destinations and local paths for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Bucket the frame archives are published to
    pub output_bucket: String,
    /// Where outcome notifications are sent
    pub notification_destination: String,
    /// Directory for downloaded videos
    pub work_dir: PathBuf,
}

/// Where a published archive ended up.
#[derive(Debug)]
struct PublishedArchive {
    output_key: String,
    frame_count: usize,
}

pub struct ProcessingOrchestrator {
    store: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    extractor: Arc<dyn FrameExtractor>,
    settings: OrchestratorSettings,
    metrics: WorkerMetrics,
}

impl ProcessingOrchestrator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        extractor: Arc<dyn FrameExtractor>,
        settings: OrchestratorSettings,
        metrics: WorkerMetrics,
    ) -> Self {
        Self {
            store,
            notifier,
            extractor,
            settings,
            metrics,
        }
    }

    /// Process one request and notify its outcome.
    ///
    /// Returns `Ok(())` when the archive was published and the success
    /// notification sent. A stage failure is notified and then returned; if
    /// the notification itself fails, that error is returned instead.
    #[instrument(skip(self, request), fields(process_id = %request.process_id()))]
    pub async fn execute(&self, request: WorkRequest) -> Result<(), ProcessingError> {
        info!(
            bucket = %request.source_bucket(),
            key = %request.source_key(),
            received_at = %request.received_at(),
            "Starting video processing"
        );
        let started = Instant::now();

        let outcome = match self.run_pipeline(&request).await {
            Ok(published) => {
                self.metrics
                    .record_video(true, started.elapsed(), published.frame_count);
                ProcessingOutcome::success(
                    request.process_id(),
                    &self.settings.output_bucket,
                    published.output_key,
                )
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind().as_str(), "Video processing failed");
                self.metrics.record_error(e.kind());
                self.metrics.record_video(false, started.elapsed(), 0);
                ProcessingOutcome::failure(request.process_id(), e)
            }
        };

        self.notify(&outcome).await?;
        outcome.into_result()
    }

    /// Stages up to and including source removal. Scratch files are dropped
    /// before this returns.
    async fn run_pipeline(&self, request: &WorkRequest) -> Result<PublishedArchive, ProcessingError> {
        request.validate()?;

        let video = self.acquire(request).await?;

        let extracted = self
            .extractor
            .extract(video.path())
            .await
            .map_err(ProcessingError::Extraction)?;
        let archive = ScratchPath::file(extracted.archive_path);
        if extracted.frame_count == 0 {
            return Err(ExtractionError::NoFrames.into());
        }
        info!(frame_count = extracted.frame_count, "Video processed successfully");

        let output_key = request.output_key();
        self.publish(archive.path(), &output_key).await?;

        self.retire_source(request).await;

        Ok(PublishedArchive {
            output_key,
            frame_count: extracted.frame_count,
        })
    }

    /// Download the source video into the work directory
    async fn acquire(&self, request: &WorkRequest) -> Result<ScratchPath, ProcessingError> {
        debug!("Downloading video");

        let mut body = self
            .store
            .get(request.source_bucket(), request.source_key())
            .await
            .map_err(|e| ProcessingError::Acquisition(e.into()))?;

        let video = ScratchPath::file(self.video_path(request));
        let bytes = write_local(&mut body, &self.settings.work_dir, video.path())
            .await
            .map_err(ProcessingError::Acquisition)?;

        self.metrics.record_file_size(FileKind::Video, bytes);
        info!(path = %video.path().display(), bytes, "Video downloaded");
        Ok(video)
    }

    /// Upload the archive to the output bucket
    async fn publish(&self, archive_path: &Path, output_key: &str) -> Result<(), ProcessingError> {
        debug!(bucket = %self.settings.output_bucket, key = %output_key, "Uploading archive");

        let file = tokio::fs::File::open(archive_path)
            .await
            .map_err(|e| ProcessingError::Publish(TransferError::Local(e)))?;
        if let Ok(meta) = file.metadata().await {
            self.metrics.record_file_size(FileKind::Archive, meta.len());
        }

        let location = self
            .store
            .put(&self.settings.output_bucket, output_key, Box::new(file))
            .await
            .map_err(|e| ProcessingError::Publish(e.into()))?;

        info!(location = %location, "Archive uploaded successfully");
        Ok(())
    }

    /// Best-effort removal of the source video
    async fn retire_source(&self, request: &WorkRequest) {
        match self
            .store
            .delete(request.source_bucket(), request.source_key())
            .await
        {
            Ok(()) => debug!("Original video deleted"),
            Err(e) => {
                let warning = ProcessingError::Cleanup(e);
                self.metrics.record_error(warning.kind());
                warn!(error = %warning, "Keeping job successful despite source cleanup failure");
            }
        }
    }

    async fn notify(&self, outcome: &ProcessingOutcome) -> Result<(), ProcessingError> {
        let result = match outcome.to_payload() {
            Ok(payload) => self
                .notifier
                .send(&self.settings.notification_destination, &payload)
                .await
                .map_err(ProcessingError::Notification),
            Err(e) => Err(ProcessingError::Notification(e.into())),
        };

        match result {
            Ok(message_id) => {
                info!(
                    succeeded = outcome.succeeded(),
                    message_id = %message_id,
                    "Outcome notification sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    succeeded = outcome.succeeded(),
                    "Failed to send outcome notification"
                );
                self.metrics.record_error(e.kind());
                Err(e)
            }
        }
    }

    /// `{work_dir}/video_{process_id}.{ext}`, unique per process id
    fn video_path(&self, request: &WorkRequest) -> PathBuf {
        let ext = video_extension(request.source_key()).unwrap_or_default();
        self.settings.work_dir.join(format!(
            "video_{}.{}",
            encode_path_component(request.process_id()),
            ext
        ))
    }
}

/// Stream `body` into `path`, returning the number of bytes written
async fn write_local(
    body: &mut crate::ports::BlobReader,
    work_dir: &Path,
    path: &Path,
) -> Result<u64, TransferError> {
    tokio::fs::create_dir_all(work_dir).await?;
    let mut file = tokio::fs::File::create(path).await?;
    let bytes = tokio::io::copy(body, &mut file).await?;
    file.flush().await?;
    Ok(bytes)
}
