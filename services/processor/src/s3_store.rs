use crate::config::{AwsConfig, StorageConfig};
use crate::error::StorageError;
use crate::observability::WorkerMetrics;
use crate::ports::{BlobReader, BlobStore};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use aws_types::SdkConfig;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

/// S3-backed blob store.
///
/// Uploads stream the body in `part_size` chunks: bodies that fit in one
/// chunk go up with a single `PutObject`, larger ones use multipart upload.
pub struct S3BlobStore {
    client: S3Client,
    part_size: usize,
    metrics: WorkerMetrics,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub fn new(
        sdk_config: &SdkConfig,
        aws: &AwsConfig,
        storage: &StorageConfig,
        metrics: WorkerMetrics,
    ) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(sdk_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = aws.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if aws.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            region = %aws.region,
            output_bucket = %storage.output_bucket,
            "S3 blob store initialized"
        );

        Self {
            client,
            part_size: storage.part_size_bytes,
            metrics,
        }
    }

    /// Simple single-part upload for small bodies
    async fn simple_upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/zip")
            .send()
            .await
            .map_err(|e| StorageError::Transient(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Multipart upload, starting with an already-read first part
    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        first_part: Vec<u8>,
        body: &mut BlobReader,
    ) -> Result<(), StorageError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type("application/zip")
            .send()
            .await
            .map_err(|e| StorageError::Transient(DisplayErrorContext(&e).to_string()))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StorageError::Transient("No upload ID in response".to_string()))?
            .to_string();

        match self.upload_parts(bucket, key, &upload_id, first_part, body).await {
            Ok(parts) => {
                let completed_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed_upload)
                    .send()
                    .await
                    .map_err(|e| StorageError::Transient(DisplayErrorContext(&e).to_string()))?;

                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key = %key,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut BlobReader,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut completed_parts = Vec::new();
        let mut part_number = 1;
        let mut chunk = first_part;

        while !chunk.is_empty() {
            let upload_part_response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| StorageError::Transient(DisplayErrorContext(&e).to_string()))?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );

            debug!(key = %key, part_number, "Uploaded part");
            part_number += 1;
            chunk = read_chunk(body, self.part_size).await?;
        }

        Ok(completed_parts)
    }

    async fn put_inner(&self, bucket: &str, key: &str, mut body: BlobReader) -> Result<(), StorageError> {
        let first = read_chunk(&mut body, self.part_size).await?;

        if first.len() < self.part_size {
            self.simple_upload(bucket, key, first).await
        } else {
            self.multipart_upload(bucket, key, first, &mut body).await
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<BlobReader, StorageError> {
        let result = self.client.get_object().bucket(bucket).key(key).send().await;
        self.metrics.record_s3_operation("get", result.is_ok());

        match result {
            Ok(output) => {
                debug!(
                    content_length = output.content_length().unwrap_or_default(),
                    "Object opened"
                );
                Ok(Box::new(output.body.into_async_read()))
            }
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    Err(StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                } else {
                    Err(StorageError::Transient(DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }

    #[instrument(skip(self, body))]
    async fn put(&self, bucket: &str, key: &str, body: BlobReader) -> Result<String, StorageError> {
        let result = self.put_inner(bucket, key, body).await;
        self.metrics.record_s3_operation("put", result.is_ok());
        result?;

        let location = format!("s3://{bucket}/{key}");
        info!(location = %location, "Object uploaded");
        Ok(location)
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let result = self.client.delete_object().bucket(bucket).key(key).send().await;
        self.metrics.record_s3_operation("delete", result.is_ok());
        result.map_err(|e| StorageError::Transient(DisplayErrorContext(&e).to_string()))?;

        debug!("Object deleted");
        Ok(())
    }
}

/// Read up to `size` bytes; shorter only at end of stream
async fn read_chunk(body: &mut BlobReader, size: usize) -> Result<Vec<u8>, StorageError> {
    let mut chunk = Vec::with_capacity(size);
    body.take(size as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}
