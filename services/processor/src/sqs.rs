use crate::config::{AwsConfig, QueueConfig};
use crate::error::{NotifyError, QueueError};
use crate::observability::WorkerMetrics;
use crate::ports::{Notifier, QueueMessage, QueueSource};
use async_trait::async_trait;
use aws_sdk_sqs::config::Builder as SqsConfigBuilder;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use aws_types::SdkConfig;
use tracing::{debug, info, instrument, warn};

/// Build an SQS client, honouring a custom endpoint for LocalStack
pub fn build_client(sdk_config: &SdkConfig, aws: &AwsConfig) -> SqsClient {
    let mut builder = SqsConfigBuilder::from(sdk_config);
    if let Some(ref endpoint_url) = aws.endpoint_url {
        builder = builder.endpoint_url(endpoint_url);
    }
    SqsClient::from_conf(builder.build())
}

/// Inbound work queue.
pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
    wait_time_secs: i32,
    visibility_timeout_secs: i32,
    metrics: WorkerMetrics,
}

impl SqsQueue {
    pub fn new(client: SqsClient, config: &QueueConfig, metrics: WorkerMetrics) -> Self {
        info!(
            queue_url = %config.input_url,
            wait_time_secs = config.wait_time_secs,
            visibility_timeout_secs = config.visibility_timeout_secs,
            "SQS input queue initialized"
        );

        Self {
            client,
            queue_url: config.input_url.clone(),
            wait_time_secs: config.wait_time_secs,
            visibility_timeout_secs: config.visibility_timeout_secs,
            metrics,
        }
    }
}

#[async_trait]
impl QueueSource for SqsQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>, QueueError> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.wait_time_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .send()
            .await;
        self.metrics.record_sqs_operation("receive", result.is_ok());

        let output = result.map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        Ok(output.messages().iter().find_map(convert_message))
    }

    #[instrument(skip(self, message), fields(message_id = %message.message_id))]
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let result = self
            .client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await;
        self.metrics.record_sqs_operation("delete", result.is_ok());

        result.map_err(|e| QueueError::Acknowledge(DisplayErrorContext(&e).to_string()))?;
        debug!("Message deleted from queue");
        Ok(())
    }
}

fn convert_message(message: &Message) -> Option<QueueMessage> {
    let message_id = message.message_id().unwrap_or_default().to_string();

    let Some(receipt_handle) = message.receipt_handle() else {
        warn!(message_id = %message_id, "Received message without receipt handle");
        return None;
    };

    Some(QueueMessage {
        message_id,
        receipt_handle: receipt_handle.to_string(),
        body: message.body().unwrap_or_default().to_string(),
    })
}

/// Outcome notifications sent as SQS messages.
pub struct SqsNotifier {
    client: SqsClient,
    metrics: WorkerMetrics,
}

impl SqsNotifier {
    pub fn new(client: SqsClient, metrics: WorkerMetrics) -> Self {
        Self { client, metrics }
    }
}

#[async_trait]
impl Notifier for SqsNotifier {
    async fn send(&self, destination: &str, payload: &str) -> Result<String, NotifyError> {
        let result = self
            .client
            .send_message()
            .queue_url(destination)
            .message_body(payload)
            .send()
            .await;
        self.metrics.record_sqs_operation("send", result.is_ok());

        let output = result.map_err(|e| NotifyError::Transient(DisplayErrorContext(&e).to_string()))?;

        output
            .message_id()
            .map(str::to_string)
            .ok_or(NotifyError::MissingMessageId)
    }
}
