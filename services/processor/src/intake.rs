//! Intake loop: receive, decode, dispatch, acknowledge.
//!
//! ```text
//! POLLING ──message──▶ DECODING ──▶ DISPATCHING ──▶ ACK ──▶ POLLING
//!    │                    │                          ▲
//!    │                    └──── malformed body ──────┘
//!    └── empty poll / receive error ──▶ (delay) ──▶ POLLING
//! ```
//!
//! Every received message is acknowledged once its handling finishes,
//! whatever the job outcome. Receive errors never acknowledge anything.

use crate::config::Config;
use crate::error::ErrorKind;
use crate::job::WorkRequest;
use crate::observability::WorkerMetrics;
use crate::orchestrator::ProcessingOrchestrator;
use crate::ports::{QueueMessage, QueueSource};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Timing and concurrency knobs of the loop.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    /// Pause after a failed receive
    pub receive_backoff: Duration,
    /// Pause after an empty receive
    pub idle_delay: Duration,
    /// Messages handled at the same time
    pub concurrency: usize,
    /// How long shutdown waits for in-flight jobs before aborting them
    pub shutdown_grace: Duration,
}

impl IntakeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            receive_backoff: config.receive_backoff(),
            idle_delay: config.idle_delay(),
            concurrency: config.queue.concurrency,
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            receive_backoff: Duration::from_secs(5),
            idle_delay: Duration::ZERO,
            concurrency: 1,
            shutdown_grace: Duration::from_secs(300),
        }
    }
}

pub struct IntakeLoop<Q> {
    queue: Arc<Q>,
    orchestrator: Arc<ProcessingOrchestrator>,
    settings: IntakeSettings,
    metrics: WorkerMetrics,
}

impl<Q> IntakeLoop<Q>
where
    Q: QueueSource + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        orchestrator: Arc<ProcessingOrchestrator>,
        settings: IntakeSettings,
        metrics: WorkerMetrics,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            settings,
            metrics,
        }
    }

    /// Run until `shutdown` is cancelled, then drain in-flight jobs.
    ///
    /// A permit is taken before each receive, so no more than
    /// `concurrency` messages are ever leased at once.
    pub async fn run(self, shutdown: CancellationToken) {
        let concurrency = self.settings.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight = JoinSet::new();

        info!(concurrency, "Starting intake loop");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                    continue;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.queue.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    let queue = self.queue.clone();
                    let orchestrator = self.orchestrator.clone();
                    let metrics = self.metrics.clone();
                    in_flight.spawn(async move {
                        handle_message(queue.as_ref(), &orchestrator, &metrics, message).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    debug!("No messages received");
                    if !pause(&shutdown, self.settings.idle_delay).await {
                        break;
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(
                        error = %e,
                        retry_in_secs = self.settings.receive_backoff.as_secs(),
                        "Failed to receive message"
                    );
                    if !pause(&shutdown, self.settings.receive_backoff).await {
                        break;
                    }
                }
            }
        }

        self.drain(in_flight).await;
        info!("Intake loop stopped");
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        info!(
            in_flight = in_flight.len(),
            grace_secs = self.settings.shutdown_grace.as_secs(),
            "Waiting for in-flight jobs"
        );

        let drained = tokio::time::timeout(self.settings.shutdown_grace, async {
            while let Some(joined) = in_flight.join_next().await {
                log_join(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                aborted = in_flight.len(),
                "Shutdown grace period elapsed, aborting in-flight jobs"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }
    }
}

/// Decode one message, run it and acknowledge it
#[instrument(skip_all, fields(message_id = %message.message_id))]
async fn handle_message<Q>(
    queue: &Q,
    orchestrator: &ProcessingOrchestrator,
    metrics: &WorkerMetrics,
    message: QueueMessage,
) where
    Q: QueueSource + ?Sized,
{
    match WorkRequest::decode(&message.body, Utc::now()) {
        Ok(request) => {
            metrics.message_started();
            let result = orchestrator.execute(request).await;
            metrics.message_finished(result.is_ok());

            match result {
                Ok(()) => info!("Message processed"),
                Err(e) if e.kind() == ErrorKind::Notification => {
                    error!(error = %e, "Job outcome could not be delivered")
                }
                Err(e) => info!(error = %e, "Job failed, outcome notified"),
            }
        }
        Err(e) => {
            metrics.message_malformed();
            warn!(error = %e, "Discarding malformed message");
        }
    }

    if let Err(e) = queue.acknowledge(&message).await {
        error!(error = %e, "Failed to acknowledge message");
    }
}

/// Sleep for `delay`; false when shutdown was requested meanwhile
async fn pause(shutdown: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !shutdown.is_cancelled();
    }

    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Message handler panicked");
        }
    }
}
