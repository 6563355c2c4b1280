use crate::config::AwsConfig;
use crate::detection::{EmotionScore, FaceAttributes};
use crate::error::IndexerError;
use async_trait::async_trait;
use aws_sdk_dynamodb::config::Builder as DynamoConfigBuilder;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_types::SdkConfig;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Persisted per-image record, keyed by object key
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Object key (partition key `Image`)
    pub image: String,
    /// Smile confidence, 0 when the service gave none
    pub smile_confidence: f32,
    /// JSON object of emotion label -> confidence
    pub emotions: String,
    /// JSON object `{"Low":n,"High":n}`
    pub age_range: String,
}

/// Serialized shape of the `AgeRange` attribute
#[derive(Debug, Serialize)]
struct AgeBounds {
    #[serde(rename = "Low")]
    low: i32,
    #[serde(rename = "High")]
    high: i32,
}

/// Emotion scores serialized as a JSON object in service order
struct EmotionMap<'a>(Vec<&'a EmotionScore>);

impl<'a> EmotionMap<'a> {
    /// Repeated labels keep their first position and take the last confidence
    fn new(emotions: &'a [EmotionScore]) -> Self {
        let mut entries: Vec<&EmotionScore> = Vec::with_capacity(emotions.len());
        for emotion in emotions {
            match entries.iter_mut().find(|e| e.label == emotion.label) {
                Some(existing) => *existing = emotion,
                None => entries.push(emotion),
            }
        }
        Self(entries)
    }
}

impl Serialize for EmotionMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for emotion in &self.0 {
            map.serialize_entry(&emotion.label, &emotion.confidence)?;
        }
        map.end()
    }
}

impl ImageRecord {
    /// Build a record from the first detected face, applying defaults for
    /// attributes the service did not return
    pub fn from_face(key: &str, face: &FaceAttributes) -> Result<Self, IndexerError> {
        let smile_confidence = face.smile_confidence.unwrap_or(0.0);
        let emotions = serde_json::to_string(&EmotionMap::new(&face.emotions))?;

        let age = face.age_range.unwrap_or_default();
        let age_range = serde_json::to_string(&AgeBounds {
            low: age.low.unwrap_or(0),
            high: age.high.unwrap_or(0),
        })?;

        Ok(Self {
            image: key.to_string(),
            smile_confidence,
            emotions,
            age_range,
        })
    }

    /// Item attributes as written to the table
    pub fn to_item(&self) -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("Image".to_string(), AttributeValue::S(self.image.clone())),
            (
                "SmileConfidence".to_string(),
                AttributeValue::N(self.smile_confidence.to_string()),
            ),
            ("Emotions".to_string(), AttributeValue::S(self.emotions.clone())),
            ("AgeRange".to_string(), AttributeValue::S(self.age_range.clone())),
        ])
    }
}

/// Key-value store for image records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create or overwrite the record stored under `record.image`
    async fn put_record(&self, record: &ImageRecord) -> Result<(), IndexerError>;
}

/// Record store backed by a DynamoDB table
pub struct DynamoRecordStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoRecordStore {
    /// Create a record store from the shared AWS configuration
    pub fn new(sdk_config: &SdkConfig, config: &AwsConfig, table_name: &str) -> Self {
        let mut builder = DynamoConfigBuilder::from(sdk_config);

        // Configure custom endpoint for LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        let client = DynamoClient::from_conf(builder.build());

        info!(table = %table_name, "DynamoDB record store initialized");

        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    #[instrument(skip(self, record), fields(table = %self.table_name, image = %record.image))]
    async fn put_record(&self, record: &ImageRecord) -> Result<(), IndexerError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record.to_item()))
            .send()
            .await
            .map_err(|e| IndexerError::Store(DisplayErrorContext(&e).to_string()))?;

        debug!("Image record written");

        Ok(())
    }
}
