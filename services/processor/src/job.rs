//! Work requests, job outcomes and the queue payloads that carry them.

use crate::error::{ProcessingError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Video container extensions the extractor accepts.
pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

/// Placeholder sent when a failure carries no readable detail.
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Inbound queue message.
///
/// Missing and `null` fields decode as empty strings so that validation, not
/// decoding, rejects them and the sender still receives a failure notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub process_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub video_bucket: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub video_key: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One unit of processing work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    process_id: String,
    source_bucket: String,
    source_key: String,
    received_at: DateTime<Utc>,
}

impl WorkRequest {
    pub fn new(
        process_id: impl Into<String>,
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            received_at,
        }
    }

    /// Decode a queue message body. `received_at` is the intake time, never
    /// a value supplied by the sender.
    pub fn decode(body: &str, received_at: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let message: WorkMessage = serde_json::from_str(body)?;
        Ok(Self::new(
            message.process_id,
            message.video_bucket,
            message.video_key,
            received_at,
        ))
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn source_bucket(&self) -> &str {
        &self.source_bucket
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Check the request before any collaborator is touched
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.process_id.is_empty() {
            return Err(ValidationError::MissingField("process_id"));
        }
        if self.source_bucket.is_empty() {
            return Err(ValidationError::MissingField("video_bucket"));
        }
        if self.source_key.is_empty() {
            return Err(ValidationError::MissingField("video_key"));
        }
        if video_extension(&self.source_key).is_none() {
            return Err(ValidationError::UnsupportedFormat {
                key: self.source_key.clone(),
            });
        }
        Ok(())
    }

    /// Key the frame archive for this request is published under
    pub fn output_key(&self) -> String {
        output_key(&self.process_id)
    }
}

/// Output key for a process: `processed/frames_{process_id}.zip`
pub fn output_key(process_id: &str) -> String {
    format!("processed/frames_{process_id}.zip")
}

/// Lowercased extension of `key` if it is a supported video container.
pub fn video_extension(key: &str) -> Option<String> {
    let ext = Path::new(key).extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_VIDEO_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// Result of executing one [`WorkRequest`].
#[derive(Debug)]
pub struct ProcessingOutcome {
    process_id: String,
    result: OutcomeResult,
}

#[derive(Debug)]
enum OutcomeResult {
    Succeeded {
        output_bucket: String,
        output_key: String,
    },
    Failed(ProcessingError),
}

impl ProcessingOutcome {
    pub fn success(
        process_id: impl Into<String>,
        output_bucket: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            result: OutcomeResult::Succeeded {
                output_bucket: output_bucket.into(),
                output_key: output_key.into(),
            },
        }
    }

    pub fn failure(process_id: impl Into<String>, error: ProcessingError) -> Self {
        Self {
            process_id: process_id.into(),
            result: OutcomeResult::Failed(error),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.result, OutcomeResult::Succeeded { .. })
    }

    /// JSON body of the outcome notification
    pub fn to_payload(&self) -> serde_json::Result<String> {
        match &self.result {
            OutcomeResult::Succeeded {
                output_bucket,
                output_key,
            } => serde_json::to_string(&SuccessNotification {
                process_id: &self.process_id,
                file_bucket: output_bucket,
                file_key: output_key,
            }),
            OutcomeResult::Failed(error) => {
                let detail = error.to_string();
                let error_message = if detail.trim().is_empty() {
                    UNKNOWN_ERROR_MESSAGE
                } else {
                    detail.as_str()
                };
                serde_json::to_string(&FailureNotification {
                    process_id: &self.process_id,
                    error_message,
                })
            }
        }
    }

    /// Consume the outcome, surfacing the job failure if there was one
    pub fn into_result(self) -> Result<(), ProcessingError> {
        match self.result {
            OutcomeResult::Succeeded { .. } => Ok(()),
            OutcomeResult::Failed(error) => Err(error),
        }
    }
}

#[derive(Debug, Serialize)]
struct SuccessNotification<'a> {
    process_id: &'a str,
    file_bucket: &'a str,
    file_key: &'a str,
}

#[derive(Debug, Serialize)]
struct FailureNotification<'a> {
    process_id: &'a str,
    error_message: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, TransferError};
    use chrono::TimeZone;
    use serde_json::json;

    fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap()
    }

    fn request(process_id: &str, bucket: &str, key: &str) -> WorkRequest {
        WorkRequest::new(process_id, bucket, key, received_at())
    }

    #[test]
    fn test_decode_work_message() {
        let body = r#"{"process_id":"p1","video_bucket":"in","video_key":"v.mp4"}"#;

        let request = WorkRequest::decode(body, received_at()).unwrap();
        assert_eq!(request.process_id(), "p1");
        assert_eq!(request.source_bucket(), "in");
        assert_eq!(request.source_key(), "v.mp4");
        assert_eq!(request.received_at(), received_at());
    }

    #[test]
    fn test_decode_missing_fields_reach_validation() {
        let request = WorkRequest::decode(r#"{"video_bucket":"in"}"#, received_at()).unwrap();

        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField("process_id"))
        );
    }

    #[test]
    fn test_decode_null_fields_reach_validation() {
        let body = r#"{"process_id":"p1","video_bucket":null,"video_key":"v.mp4"}"#;

        let request = WorkRequest::decode(body, received_at()).unwrap();
        assert_eq!(request.process_id(), "p1");
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField("video_bucket"))
        );
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(WorkRequest::decode("not json", received_at()).is_err());
        assert!(WorkRequest::decode("[1, 2, 3]", received_at()).is_err());
        assert!(WorkRequest::decode(r#"{"process_id": 42}"#, received_at()).is_err());
    }

    #[test]
    fn test_validate_required_fields() {
        assert_eq!(
            request("", "in", "v.mp4").validate(),
            Err(ValidationError::MissingField("process_id"))
        );
        assert_eq!(
            request("p1", "", "v.mp4").validate(),
            Err(ValidationError::MissingField("video_bucket"))
        );
        assert_eq!(
            request("p1", "in", "").validate(),
            Err(ValidationError::MissingField("video_key"))
        );
        assert_eq!(request("p1", "in", "v.mp4").validate(), Ok(()));
    }

    #[test]
    fn test_supported_extensions_are_case_insensitive() {
        for key in ["a.mp4", "a.AVI", "dir/a.Mov", "a.mkv", "a.wmv", "a.flv", "a.WEBM"] {
            assert!(request("p1", "in", key).validate().is_ok(), "{key}");
        }
    }

    #[test]
    fn test_unsupported_extensions_are_rejected() {
        for key in ["a.txt", "a", "mp4", "a.mp4.gz", "a.mpeg"] {
            assert!(
                matches!(
                    request("p1", "in", key).validate(),
                    Err(ValidationError::UnsupportedFormat { .. })
                ),
                "{key}"
            );
        }
    }

    #[test]
    fn test_output_key() {
        assert_eq!(request("p1", "in", "v.mp4").output_key(), "processed/frames_p1.zip");
    }

    #[test]
    fn test_success_payload() {
        let outcome = ProcessingOutcome::success("p1", "out", "processed/frames_p1.zip");

        assert!(outcome.succeeded());

        let payload: serde_json::Value =
            serde_json::from_str(&outcome.to_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            json!({
                "process_id": "p1",
                "file_bucket": "out",
                "file_key": "processed/frames_p1.zip"
            })
        );
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_failure_payload() {
        let error = ProcessingError::Acquisition(TransferError::Store(StorageError::Transient(
            "connection reset".to_string(),
        )));
        let outcome = ProcessingOutcome::failure("p1", error);

        assert!(!outcome.succeeded());

        let payload: serde_json::Value =
            serde_json::from_str(&outcome.to_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            json!({
                "process_id": "p1",
                "error_message": "failed to download video: storage request failed: connection reset"
            })
        );
        assert!(outcome.into_result().is_err());
    }
}
