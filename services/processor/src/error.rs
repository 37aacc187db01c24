//! Error types for the processor and its collaborators.
//!
//! Adapter errors stay close to the boundary they come from. `ProcessingError`
//! is the taxonomy of a single job: the orchestrator converts every stage
//! failure into one of its variants so callers can branch on [`ErrorKind`]
//! instead of matching message text.

use std::io;
use thiserror::Error;

/// Rejections raised before any collaborator is called.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid video file format: {key}. Supported: mp4, avi, mov, mkv, wmv, flv, webm")]
    UnsupportedFormat { key: String },
}

/// Errors from the blob store port.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("storage request failed: {0}")]
    Transient(String),

    #[error("storage stream error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the notification port.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to send message: {0}")]
    Transient(String),

    #[error("message sent but no message ID returned")]
    MissingMessageId,

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the inbound queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to receive message: {0}")]
    Receive(String),

    #[error("failed to delete message: {0}")]
    Acknowledge(String),
}

/// Errors from the frame extractor.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("ffmpeg error: {status}, output: {output}")]
    CommandFailed { status: String, output: String },

    #[error("no frames extracted from video")]
    NoFrames,

    #[error("failed to create zip: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("frame extraction I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A stage that moves bytes between the blob store and a local file.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StorageError),

    #[error("local file error: {0}")]
    Local(#[from] io::Error),
}

/// Failure of one processing job.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to download video: {0}")]
    Acquisition(TransferError),

    #[error("failed to process video: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("failed to upload zip: {0}")]
    Publish(TransferError),

    #[error("failed to send outcome notification: {0}")]
    Notification(#[from] NotifyError),

    /// Source object could not be removed. Logged, never returned.
    #[error("failed to delete original video: {0}")]
    Cleanup(StorageError),
}

/// Discriminant of [`ProcessingError`], used for branching and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Acquisition,
    Extraction,
    Publish,
    Notification,
    Cleanup,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Acquisition => "acquisition",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Publish => "publish",
            ErrorKind::Notification => "notification",
            ErrorKind::Cleanup => "cleanup",
        }
    }
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::Validation(_) => ErrorKind::Validation,
            ProcessingError::Acquisition(_) => ErrorKind::Acquisition,
            ProcessingError::Extraction(_) => ErrorKind::Extraction,
            ProcessingError::Publish(_) => ErrorKind::Publish,
            ProcessingError::Notification(_) => ErrorKind::Notification,
            ProcessingError::Cleanup(_) => ErrorKind::Cleanup,
        }
    }
}
