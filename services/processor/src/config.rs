use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// S3 rejects multipart parts smaller than this (except the last one).
pub const MIN_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Main configuration for the frame processor
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// AWS client configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// Queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Output storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Frame extraction configuration
    #[serde(default)]
    pub extractor: ExtractorConfig,
    /// Health probe server configuration
    #[serde(default)]
    pub health: HealthConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// AWS client configuration shared by S3 and SQS
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack, MinIO, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Queue the work requests arrive on
    #[serde(default)]
    pub input_url: String,
    /// Queue the outcome notifications are sent to
    #[serde(default)]
    pub output_url: String,
    /// Long-poll wait per receive call
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: i32,
    /// Visibility lease requested for each received message
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i32,
    /// Delay before polling again after a receive error
    #[serde(default = "default_receive_backoff_secs")]
    pub receive_backoff_secs: u64,
    /// Delay before polling again after an empty receive
    #[serde(default)]
    pub idle_delay_ms: u64,
    /// Number of jobs processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How long shutdown waits for in-flight jobs
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Output storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket the frame archives are written to
    #[serde(default)]
    pub output_bucket: String,
    /// Part size for multipart uploads in bytes (8MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Frame extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    /// ffmpeg binary to invoke
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Scratch directory for downloads, frames and archives
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Frames sampled per second of video
    #[serde(default = "default_frames_per_second")]
    pub frames_per_second: u32,
    /// Image format of the extracted frames
    #[serde(default = "default_frame_format")]
    pub frame_format: String,
    /// ffmpeg -loglevel value
    #[serde(default = "default_ffmpeg_log_level")]
    pub log_level: String,
}

/// Health probe server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address
    #[serde(default = "default_health_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_health_port")]
    pub port: u16,
}

// Default value functions
fn default_service_name() -> String {
    "frame-processor".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_wait_time_secs() -> i32 {
    10
}

fn default_visibility_timeout_secs() -> i32 {
    300 // 5 minutes to process one video
}

fn default_receive_backoff_secs() -> u64 {
    5
}

fn default_concurrency() -> usize {
    1
}

fn default_shutdown_grace_secs() -> u64 {
    300
}

fn default_part_size() -> usize {
    8 * 1024 * 1024 // 8MB
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/video-processor")
}

fn default_frames_per_second() -> u32 {
    1
}

fn default_frame_format() -> String {
    "png".to_string()
}

fn default_ffmpeg_log_level() -> String {
    "error".to_string()
}

fn default_health_host() -> String {
    "0.0.0.0".to_string()
}

fn default_health_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .set_default("service.metrics_port", default_metrics_port())?
            .add_source(config::File::with_name("config/processor").required(false))
            .add_source(config::File::with_name("/etc/frame-processor/processor").required(false))
            // PROCESSOR__QUEUE__INPUT_URL -> queue.input_url
            .add_source(
                config::Environment::with_prefix("PROCESSOR")
                    .separator("__")
                    .try_parsing(true),
            )
            // Plain variables used by existing deployments of the worker
            .set_override_option("queue.input_url", env_var("QUEUE_INPUT"))?
            .set_override_option("queue.output_url", env_var("QUEUE_OUTPUT"))?
            .set_override_option("storage.output_bucket", env_var("STORAGE_OUTPUT"))?
            .set_override_option("aws.region", env_var("AWS_REGION"))?;

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("Invalid processor configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the worker cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue.input_url.trim().is_empty() {
            bail!("queue.input_url is required (QUEUE_INPUT)");
        }
        if self.queue.output_url.trim().is_empty() {
            bail!("queue.output_url is required (QUEUE_OUTPUT)");
        }
        if self.storage.output_bucket.trim().is_empty() {
            bail!("storage.output_bucket is required (STORAGE_OUTPUT)");
        }
        if self.queue.concurrency == 0 {
            bail!("queue.concurrency must be at least 1");
        }
        if self.extractor.frames_per_second == 0 {
            bail!("extractor.frames_per_second must be at least 1");
        }
        if self.storage.part_size_bytes < MIN_PART_SIZE_BYTES {
            bail!(
                "storage.part_size_bytes must be at least {} bytes",
                MIN_PART_SIZE_BYTES
            );
        }
        Ok(())
    }

    /// Delay after a failed receive call
    pub fn receive_backoff(&self) -> Duration {
        Duration::from_secs(self.queue.receive_backoff_secs)
    }

    /// Delay after an empty receive call
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.queue.idle_delay_ms)
    }

    /// Time allowed for in-flight jobs during shutdown
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.queue.shutdown_grace_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            input_url: String::new(),
            output_url: String::new(),
            wait_time_secs: default_wait_time_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            receive_backoff_secs: default_receive_backoff_secs(),
            idle_delay_ms: 0,
            concurrency: default_concurrency(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_bucket: String::new(),
            part_size_bytes: default_part_size(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            work_dir: default_work_dir(),
            frames_per_second: default_frames_per_second(),
            frame_format: default_frame_format(),
            log_level: default_ffmpeg_log_level(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            host: default_health_host(),
            port: default_health_port(),
        }
    }
}
