//! Collaborator contracts used by the orchestrator and the intake loop.
//!
//! Concrete adapters live in [`crate::s3_store`], [`crate::sqs`] and
//! [`crate::ffmpeg`]; tests substitute fakes or `mockall` mocks.

use crate::error::{ExtractionError, NotifyError, QueueError, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// Readable object body.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Object storage addressed by bucket and key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open the object for reading
    async fn get(&self, bucket: &str, key: &str) -> Result<BlobReader, StorageError>;

    /// Write the object, returning its location
    async fn put(&self, bucket: &str, key: &str, body: BlobReader) -> Result<String, StorageError>;

    /// Remove the object
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// Outbound text messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `payload` to `destination`, returning the delivery id
    async fn send(&self, destination: &str, payload: &str) -> Result<String, NotifyError>;
}

/// Frames produced from one video, packed into a single archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFrames {
    pub archive_path: PathBuf,
    pub frame_count: usize,
}

/// Turns a local video file into an archive of frame images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, video_path: &Path) -> Result<ExtractedFrames, ExtractionError>;
}

/// A message leased from the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Inbound queue: receive one message at a time and delete it once handled.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Wait for the next message; `None` when the poll came back empty
    async fn receive(&self) -> Result<Option<QueueMessage>, QueueError>;

    /// Remove a handled message from the queue
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError>;
}
