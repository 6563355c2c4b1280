use crate::config::AwsConfig;
use crate::error::IndexerError;
use crate::notification::UploadNotification;
use async_trait::async_trait;
use aws_sdk_rekognition::config::Builder as RekognitionConfigBuilder;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::types::{Attribute, FaceDetail, Image, S3Object};
use aws_sdk_rekognition::Client as RekognitionClient;
use aws_types::SdkConfig;
use tracing::{debug, info, instrument};

/// Detection response for one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    /// Detected faces, in service order
    pub faces: Vec<FaceAttributes>,
}

impl DetectionResult {
    pub fn new(faces: Vec<FaceAttributes>) -> Self {
        Self { faces }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn first_face(&self) -> Option<&FaceAttributes> {
        self.faces.first()
    }
}

/// Attributes of a single detected face
///
/// Every field is optional because the detection service omits what it
/// could not estimate. Defaults are applied when a record is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceAttributes {
    /// Face bounding box
    pub bounding_box: Option<BoundingBox>,
    /// Smile confidence (0 - 100)
    pub smile_confidence: Option<f32>,
    /// Emotion scores, in service order
    pub emotions: Vec<EmotionScore>,
    /// Estimated age range
    pub age_range: Option<AgeRange>,
}

/// Face bounding box size as fractions of the image dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub width: Option<f32>,
    pub height: Option<f32>,
}

/// Confidence (0 - 100) for one emotion label
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScore {
    pub label: String,
    pub confidence: f32,
}

/// Estimated age bounds in years
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgeRange {
    pub low: Option<i32>,
    pub high: Option<i32>,
}

/// Face detection backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces with full attribute detail in the referenced object
    async fn detect_faces(
        &self,
        notification: &UploadNotification,
    ) -> Result<DetectionResult, IndexerError>;
}

/// Face detector backed by Amazon Rekognition `DetectFaces`
pub struct RekognitionDetector {
    client: RekognitionClient,
}

impl RekognitionDetector {
    /// Create a detector from the shared AWS configuration
    pub fn new(sdk_config: &SdkConfig, config: &AwsConfig) -> Self {
        let mut builder = RekognitionConfigBuilder::from(sdk_config);

        // Configure custom endpoint for LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        let client = RekognitionClient::from_conf(builder.build());

        info!("Rekognition detector initialized");

        Self { client }
    }
}

#[async_trait]
impl FaceDetector for RekognitionDetector {
    #[instrument(skip(self, notification), fields(bucket = %notification.bucket, key = %notification.key))]
    async fn detect_faces(
        &self,
        notification: &UploadNotification,
    ) -> Result<DetectionResult, IndexerError> {
        let image = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&notification.bucket)
                    .name(&notification.key)
                    .build(),
            )
            .build();

        let response = self
            .client
            .detect_faces()
            .image(image)
            .attributes(Attribute::All)
            .send()
            .await
            .map_err(|e| IndexerError::Detection(DisplayErrorContext(&e).to_string()))?;

        let faces: Vec<FaceAttributes> = response
            .face_details()
            .iter()
            .map(face_attributes_from_detail)
            .collect();

        debug!(face_count = faces.len(), "Rekognition returned face details");

        Ok(DetectionResult::new(faces))
    }
}

/// Convert a Rekognition face detail into the domain representation
fn face_attributes_from_detail(detail: &FaceDetail) -> FaceAttributes {
    let bounding_box = detail.bounding_box().map(|b| BoundingBox {
        width: b.width(),
        height: b.height(),
    });

    let emotions = detail
        .emotions()
        .iter()
        .filter_map(|e| {
            let label = e.r#type()?.as_str().to_string();
            let confidence = e.confidence()?;
            Some(EmotionScore { label, confidence })
        })
        .collect();

    let age_range = detail.age_range().map(|a| AgeRange {
        low: a.low(),
        high: a.high(),
    });

    FaceAttributes {
        bounding_box,
        smile_confidence: detail.smile().and_then(|s| s.confidence()),
        emotions,
        age_range,
    }
}
