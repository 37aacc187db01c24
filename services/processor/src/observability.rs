//! Worker metrics.
//!
//! `WorkerMetrics` is built once at startup and handed to the orchestrator
//! and intake loop. It records through the `metrics` facade, so without an
//! installed recorder (unit tests) every call is a no-op.

use crate::error::ErrorKind;
use metrics::{describe_counter, describe_gauge, describe_histogram, Gauge, Unit};
use std::time::Duration;

const MESSAGES_PROCESSED: &str = "worker_messages_processed_total";
const MESSAGES_MALFORMED: &str = "worker_messages_malformed_total";
const VIDEOS_PROCESSED: &str = "worker_videos_processed_total";
const PROCESSING_DURATION: &str = "worker_processing_duration_seconds";
const FRAMES_EXTRACTED: &str = "worker_frames_extracted_last";
const ERRORS: &str = "worker_errors_total";
const ACTIVE_MESSAGES: &str = "worker_messages_active";
const FILE_SIZE: &str = "worker_file_size_bytes";
const S3_OPERATIONS: &str = "worker_s3_operations_total";
const SQS_OPERATIONS: &str = "worker_sqs_operations_total";

/// Artifact measured by [`WorkerMetrics::record_file_size`].
#[derive(Debug, Clone, Copy)]
pub enum FileKind {
    Video,
    Archive,
}

/// Metric handles for the processing pipeline.
#[derive(Clone)]
pub struct WorkerMetrics {
    active_messages: Gauge,
    frames_extracted: Gauge,
}

impl std::fmt::Debug for WorkerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerMetrics").finish_non_exhaustive()
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            active_messages: metrics::gauge!(ACTIVE_MESSAGES),
            frames_extracted: metrics::gauge!(FRAMES_EXTRACTED),
        }
    }

    /// Register help text with the installed recorder
    pub fn describe() {
        describe_counter!(MESSAGES_PROCESSED, "Total number of messages processed by the worker");
        describe_counter!(MESSAGES_MALFORMED, "Messages discarded because they could not be decoded");
        describe_counter!(VIDEOS_PROCESSED, "Total number of videos processed by the worker");
        describe_histogram!(PROCESSING_DURATION, Unit::Seconds, "Video processing duration");
        describe_gauge!(FRAMES_EXTRACTED, "Number of frames extracted from the last processed video");
        describe_counter!(ERRORS, "Total number of errors by type");
        describe_gauge!(ACTIVE_MESSAGES, "Number of messages currently being processed");
        describe_histogram!(FILE_SIZE, Unit::Bytes, "Downloaded video and produced archive sizes");
        describe_counter!(S3_OPERATIONS, "Total number of S3 operations");
        describe_counter!(SQS_OPERATIONS, "Total number of SQS operations");
    }

    pub fn message_started(&self) {
        self.active_messages.increment(1.0);
    }

    pub fn message_finished(&self, success: bool) {
        self.active_messages.decrement(1.0);
        metrics::counter!(MESSAGES_PROCESSED, "status" => status(success)).increment(1);
    }

    pub fn message_malformed(&self) {
        metrics::counter!(MESSAGES_MALFORMED).increment(1);
    }

    pub fn record_video(&self, success: bool, duration: Duration, frames: usize) {
        let status = status(success);
        metrics::counter!(VIDEOS_PROCESSED, "status" => status).increment(1);
        metrics::histogram!(PROCESSING_DURATION, "status" => status).record(duration.as_secs_f64());

        if success && frames > 0 {
            self.frames_extracted.set(frames as f64);
        }
    }

    pub fn record_error(&self, kind: ErrorKind) {
        metrics::counter!(ERRORS, "type" => kind.as_str()).increment(1);
    }

    pub fn record_file_size(&self, kind: FileKind, bytes: u64) {
        let kind = match kind {
            FileKind::Video => "video",
            FileKind::Archive => "archive",
        };
        metrics::histogram!(FILE_SIZE, "type" => kind).record(bytes as f64);
    }

    pub fn record_s3_operation(&self, operation: &'static str, success: bool) {
        metrics::counter!(S3_OPERATIONS, "operation" => operation, "status" => status(success))
            .increment(1);
    }

    pub fn record_sqs_operation(&self, operation: &'static str, success: bool) {
        metrics::counter!(SQS_OPERATIONS, "operation" => operation, "status" => status(success))
            .increment(1);
    }
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}
