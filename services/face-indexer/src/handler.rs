use crate::detection::FaceDetector;
use crate::error::IndexerError;
use crate::notification::{notifications_from_event, UploadNotification};
use crate::quality_gate::{QualityDecision, QualityGate};
use crate::record_store::{ImageRecord, RecordStore};
use aws_lambda_events::event::s3::S3Event;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a notification was settled when no error occurred
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// A record was written for the object key
    Indexed,
    /// The detection service found no faces
    NoFaces,
    /// The quality gate rejected the detection result
    Rejected { reason: String },
}

/// Result of one notification within a batch
#[derive(Debug)]
pub struct NotificationReport {
    /// `None` when the notification itself was malformed
    pub notification: Option<UploadNotification>,
    pub result: Result<ProcessOutcome, IndexerError>,
}

/// Per-notification results of one invocation
///
/// Failures are collected here and never turned into a batch-level error.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<NotificationReport>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn indexed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.result, Ok(ProcessOutcome::Indexed)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| {
                matches!(
                    r.result,
                    Ok(ProcessOutcome::NoFaces) | Ok(ProcessOutcome::Rejected { .. })
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_err()).count()
    }

    /// Report for the given object key, if the batch contained it
    pub fn for_key(&self, key: &str) -> Option<&NotificationReport> {
        self.reports
            .iter()
            .find(|r| r.notification.as_ref().map(|n| n.key.as_str()) == Some(key))
    }
}

/// Runs detection, quality gate and record write for upload notifications
pub struct NotificationHandler {
    detector: Arc<dyn FaceDetector>,
    store: Arc<dyn RecordStore>,
    quality_gate: QualityGate,
    expected_bucket: Option<String>,
}

impl NotificationHandler {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        store: Arc<dyn RecordStore>,
        quality_gate: QualityGate,
    ) -> Self {
        Self {
            detector,
            store,
            quality_gate,
            expected_bucket: None,
        }
    }

    /// Set the bucket the function is expected to be triggered by
    pub fn with_expected_bucket(mut self, bucket: Option<String>) -> Self {
        self.expected_bucket = bucket;
        self
    }

    /// Process every notification of a batch concurrently
    ///
    /// Returns once all notifications have settled. A failure in one
    /// notification is logged and recorded in the report only.
    #[instrument(skip(self, event), fields(records = event.records.len()))]
    pub async fn handle_batch(&self, event: &S3Event) -> BatchReport {
        let units = notifications_from_event(event)
            .into_iter()
            .map(|notification| self.settle(notification));

        let report = BatchReport {
            reports: join_all(units).await,
        };

        info!(
            notifications = report.len(),
            indexed = report.indexed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch processed"
        );

        report
    }

    /// Process one notification and swallow its failure into a report
    async fn settle(
        &self,
        notification: Result<UploadNotification, IndexerError>,
    ) -> NotificationReport {
        let notification = match notification {
            Ok(notification) => notification,
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Skipping malformed notification");
                metrics::counter!("indexer.notifications.failed").increment(1);
                return NotificationReport {
                    notification: None,
                    result: Err(e),
                };
            }
        };

        let result = self.process_notification(&notification).await;

        match result {
            Ok(ProcessOutcome::Indexed) => {
                metrics::counter!("indexer.notifications.indexed").increment(1);
            }
            Ok(_) => {
                metrics::counter!("indexer.notifications.skipped").increment(1);
            }
            Err(ref e) => {
                error!(
                    bucket = %notification.bucket,
                    key = %notification.key,
                    error = %e,
                    kind = e.kind(),
                    "Error processing Rekognition or DynamoDB"
                );
                metrics::counter!("indexer.notifications.failed").increment(1);
            }
        }

        NotificationReport {
            notification: Some(notification),
            result,
        }
    }

    /// Detect faces in the uploaded image and write a record if it passes the gate
    #[instrument(skip(self, notification), fields(bucket = %notification.bucket, key = %notification.key))]
    pub async fn process_notification(
        &self,
        notification: &UploadNotification,
    ) -> Result<ProcessOutcome, IndexerError> {
        info!("Processing image");

        if let Some(ref expected) = self.expected_bucket {
            if expected != &notification.bucket {
                warn!(expected_bucket = %expected, "Notification from unexpected bucket");
            }
        }

        let detection = self.detector.detect_faces(notification).await?;

        metrics::counter!("indexer.faces.detected").increment(detection.face_count() as u64);

        let first_face = match detection.first_face() {
            Some(face) => face,
            None => {
                info!("No faces detected");
                return Ok(ProcessOutcome::NoFaces);
            }
        };

        debug!(face_count = detection.face_count(), "Faces detected");

        if let QualityDecision::Reject { reason } = self.quality_gate.evaluate(&detection) {
            info!(reason = %reason, "Low quality image, stopping processing");
            return Ok(ProcessOutcome::Rejected { reason });
        }

        let record = ImageRecord::from_face(&notification.key, first_face)?;
        self.store.put_record(&record).await?;

        info!(
            smile_confidence = record.smile_confidence,
            "Image record stored"
        );

        Ok(ProcessOutcome::Indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{
        AgeRange, BoundingBox, DetectionResult, EmotionScore, FaceAttributes, MockFaceDetector,
    };
    use crate::notification::fixtures::s3_event;
    use crate::record_store::MockRecordStore;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    /// Record store that keeps written records in memory
    #[derive(Default)]
    struct InMemoryStore {
        records: Mutex<Vec<ImageRecord>>,
    }

    impl InMemoryStore {
        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.image.clone())
                .collect();
            keys.sort();
            keys
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for InMemoryStore {
        async fn put_record(&self, record: &ImageRecord) -> Result<(), IndexerError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn sized_face(width: f32, height: f32) -> FaceAttributes {
        FaceAttributes {
            bounding_box: Some(BoundingBox {
                width: Some(width),
                height: Some(height),
            }),
            ..Default::default()
        }
    }

    fn portrait() -> DetectionResult {
        DetectionResult::new(vec![FaceAttributes {
            smile_confidence: Some(87.3),
            emotions: vec![
                EmotionScore {
                    label: "HAPPY".to_string(),
                    confidence: 90.1,
                },
                EmotionScore {
                    label: "CALM".to_string(),
                    confidence: 5.2,
                },
            ],
            age_range: Some(AgeRange {
                low: Some(20),
                high: Some(28),
            }),
            ..sized_face(0.4, 0.5)
        }])
    }

    fn handler_with(
        detector: MockFaceDetector,
        store: Arc<dyn RecordStore>,
    ) -> NotificationHandler {
        NotificationHandler::new(Arc::new(detector), store, QualityGate::default())
    }

    #[tokio::test]
    async fn test_single_face_is_indexed() {
        let mut detector = MockFaceDetector::new();
        detector
            .expect_detect_faces()
            .withf(|n| n.bucket == "upload-bucket" && n.key == "alice.jpg")
            .times(1)
            .returning(|_| Ok(portrait()));

        let store = Arc::new(InMemoryStore::default());
        let handler = handler_with(detector, store.clone());

        let outcome = handler
            .process_notification(&UploadNotification::new("upload-bucket", "alice.jpg"))
            .await;

        assert_eq!(assert_ok!(outcome), ProcessOutcome::Indexed);

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            ImageRecord {
                image: "alice.jpg".to_string(),
                smile_confidence: 87.3,
                emotions: r#"{"HAPPY":90.1,"CALM":5.2}"#.to_string(),
                age_range: r#"{"Low":20,"High":28}"#.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_no_faces_skips_write() {
        let mut detector = MockFaceDetector::new();
        detector
            .expect_detect_faces()
            .returning(|_| Ok(DetectionResult::default()));

        let mut store = MockRecordStore::new();
        store.expect_put_record().never();

        let handler = handler_with(detector, Arc::new(store));
        let outcome = handler
            .process_notification(&UploadNotification::new("upload-bucket", "empty.jpg"))
            .await;

        assert_eq!(assert_ok!(outcome), ProcessOutcome::NoFaces);
    }

    #[tokio::test]
    async fn test_rejected_images_skip_write() {
        let mut detector = MockFaceDetector::new();
        detector.expect_detect_faces().returning(|n| {
            Ok(match n.key.as_str() {
                "group.jpg" => {
                    DetectionResult::new(vec![sized_face(0.3, 0.3), sized_face(0.3, 0.3)])
                }
                _ => DetectionResult::new(vec![sized_face(0.05, 0.5)]),
            })
        });

        let mut store = MockRecordStore::new();
        store.expect_put_record().never();

        let handler = handler_with(detector, Arc::new(store));

        for key in ["group.jpg", "far-away.jpg"] {
            let outcome = handler
                .process_notification(&UploadNotification::new("upload-bucket", key))
                .await;
            assert!(matches!(
                assert_ok!(outcome),
                ProcessOutcome::Rejected { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_missing_attributes_use_defaults() {
        let mut detector = MockFaceDetector::new();
        detector
            .expect_detect_faces()
            .returning(|_| Ok(DetectionResult::new(vec![sized_face(0.2, 0.2)])));

        let store = Arc::new(InMemoryStore::default());
        let handler = handler_with(detector, store.clone());

        let outcome = handler
            .process_notification(&UploadNotification::new("upload-bucket", "plain.jpg"))
            .await;
        assert_ok!(outcome);

        let records = store.records.lock().unwrap();
        assert_eq!(records[0].smile_confidence, 0.0);
        assert_eq!(records[0].emotions, "{}");
        assert_eq!(records[0].age_range, r#"{"Low":0,"High":0}"#);
    }

    #[tokio::test]
    async fn test_detection_failure_does_not_abort_batch() {
        let mut detector = MockFaceDetector::new();
        detector.expect_detect_faces().times(3).returning(|n| {
            if n.key == "2.jpg" {
                Err(IndexerError::Detection("InvalidImageFormatException".to_string()))
            } else {
                Ok(portrait())
            }
        });

        let store = Arc::new(InMemoryStore::default());
        let handler = handler_with(detector, store.clone());

        let event = s3_event(&[
            ("upload-bucket", "1.jpg"),
            ("upload-bucket", "2.jpg"),
            ("upload-bucket", "3.jpg"),
        ]);
        let report = handler.handle_batch(&event).await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.indexed(), 2);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.for_key("2.jpg").map(|r| &r.result),
            Some(Err(IndexerError::Detection(_)))
        ));
        assert_eq!(store.keys(), vec!["1.jpg", "3.jpg"]);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_per_notification() {
        let mut detector = MockFaceDetector::new();
        detector.expect_detect_faces().returning(|_| Ok(portrait()));

        let mut store = MockRecordStore::new();
        store.expect_put_record().times(2).returning(|record| {
            if record.image == "a.jpg" {
                Err(IndexerError::Store("ProvisionedThroughputExceededException".to_string()))
            } else {
                Ok(())
            }
        });

        let handler = handler_with(detector, Arc::new(store));
        let event = s3_event(&[("upload-bucket", "a.jpg"), ("upload-bucket", "b.jpg")]);
        let report = handler.handle_batch(&event).await;

        assert_eq!(report.indexed(), 1);
        assert_eq!(report.failed(), 1);
        assert_err!(&report.for_key("a.jpg").unwrap().result);
    }

    #[tokio::test]
    async fn test_malformed_notification_does_not_abort_batch() {
        let mut detector = MockFaceDetector::new();
        detector
            .expect_detect_faces()
            .times(1)
            .returning(|_| Ok(portrait()));

        let store = Arc::new(InMemoryStore::default());
        let handler = handler_with(detector, store.clone());

        let mut event = s3_event(&[("upload-bucket", "a.jpg"), ("upload-bucket", "b.jpg")]);
        event.records[0].s3.object.key = None;

        let report = handler.handle_batch(&event).await;

        assert_eq!(report.failed(), 1);
        assert!(report.reports[0].notification.is_none());
        assert_eq!(store.keys(), vec!["b.jpg"]);
    }

    #[tokio::test]
    async fn test_unexpected_bucket_still_processed() {
        let mut detector = MockFaceDetector::new();
        detector.expect_detect_faces().returning(|_| Ok(portrait()));

        let store = Arc::new(InMemoryStore::default());
        let handler = handler_with(detector, store.clone())
            .with_expected_bucket(Some("upload-bucket".to_string()));

        let report = handler
            .handle_batch(&s3_event(&[("other-bucket", "c.jpg")]))
            .await;

        assert_eq!(report.indexed(), 1);
        assert_eq!(store.keys(), vec!["c.jpg"]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let detector = MockFaceDetector::new();
        let handler = handler_with(detector, Arc::new(InMemoryStore::default()));

        let report = handler.handle_batch(&s3_event(&[])).await;

        assert!(report.is_empty());
        assert_eq!(report.skipped(), 0);
    }
}
