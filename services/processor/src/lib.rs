//! Frame Processor
//!
//! Queue-driven worker that turns uploaded videos into zip archives of frame
//! images. Each work request names a video in object storage; the worker
//! downloads it, samples frames with ffmpeg, publishes the archive, removes
//! the source and reports the outcome on a notification queue.
//!
//! ## Features
//!
//! - **One outcome per request**: every request ends in exactly one success
//!   or failure notification, including requests that fail validation
//! - **Scoped scratch files**: downloaded videos and archives are removed on
//!   every exit path, including cancellation at shutdown
//! - **Streaming transfers**: downloads stream to disk, uploads switch to S3
//!   multipart above the configured part size
//! - **Bounded dispatch**: one message at a time by default, a fixed-size
//!   worker pool when `queue.concurrency` is raised
//!
//! ## Architecture
//!
//! ```text
//! SQS input queue                                        SQS output queue
//! ┌──────────────┐                                       ┌──────────────┐
//! │ {process_id, │                                       │ success /    │
//! │  video_*}    │                                       │ failure      │
//! └──────────────┘                                       └──────────────┘
//!        │                                                      ▲
//!        ▼                                                      │
//! ┌──────────────┐   WorkRequest    ┌──────────────┐   outcome  │
//! │ Intake       │─────────────────▶│ Processing   │────────────┘
//! │ Loop         │◀── ack ──────────│ Orchestrator │
//! └──────────────┘                  └──────────────┘
//!                                      │        │
//!                         get/put/delete│        │extract
//!                                      ▼        ▼
//!                               ┌──────────┐ ┌──────────┐
//!                               │ S3 Blob  │ │ ffmpeg   │
//!                               │ Store    │ │ + zip    │
//!                               └──────────┘ └──────────┘
//! ```

pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod health;
pub mod intake;
pub mod job;
pub mod observability;
pub mod orchestrator;
pub mod ports;
pub mod s3_store;
pub mod scratch;
pub mod sqs;

pub use config::Config;
pub use error::{ErrorKind, ProcessingError};
pub use ffmpeg::FfmpegExtractor;
pub use health::ReadinessFlag;
pub use intake::{IntakeLoop, IntakeSettings};
pub use job::{ProcessingOutcome, WorkRequest};
pub use observability::WorkerMetrics;
pub use orchestrator::{OrchestratorSettings, ProcessingOrchestrator};
pub use ports::{BlobStore, FrameExtractor, Notifier, QueueSource};
pub use s3_store::S3BlobStore;
pub use sqs::{SqsNotifier, SqsQueue};
