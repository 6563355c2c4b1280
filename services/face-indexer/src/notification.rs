use crate::error::IndexerError;
use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use std::fmt;

/// Object-created notification for a single uploaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadNotification {
    /// Bucket holding the object
    pub bucket: String,
    /// Object key, as delivered by S3. Also the record identity.
    pub key: String,
}

impl UploadNotification {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Extract bucket and key from an S3 event record
    pub fn from_record(record: &S3EventRecord) -> Result<Self, IndexerError> {
        let bucket = record
            .s3
            .bucket
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                IndexerError::MalformedNotification("record has no bucket name".to_string())
            })?;

        let key = record
            .s3
            .object
            .key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                IndexerError::MalformedNotification(format!(
                    "record from bucket {} has no object key",
                    bucket
                ))
            })?;

        Ok(Self::new(bucket, key))
    }
}

impl fmt::Display for UploadNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Map every record of an S3 event batch, keeping malformed ones as errors
/// so they are reported alongside their siblings.
pub fn notifications_from_event(event: &S3Event) -> Vec<Result<UploadNotification, IndexerError>> {
    event
        .records
        .iter()
        .map(UploadNotification::from_record)
        .collect()
}
