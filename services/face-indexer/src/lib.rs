//! Face Indexer
//!
//! Upload-triggered face attribute indexer. Every image uploaded to the
//! bucket produces an S3 object-created notification; the Lambda function
//! asks Rekognition for the faces in the image, applies a quality gate and
//! stores the attributes of a single clearly visible face in DynamoDB.
//!
//! ## Processing
//!
//! - **Independent notifications**: every record of a batch is processed
//!   concurrently; a failing record is logged and never affects the others
//! - **Quality gate**: exactly one face, at least 10% of the image width and
//!   height
//! - **Upsert by key**: records are keyed by object key and overwritten when
//!   the same key is processed again
//!
//! ## Architecture
//!
//! ```text
//! S3 Bucket                Lambda                         DynamoDB
//! ┌──────────────┐        ┌──────────────┐               ┌──────────────┐
//! │ ObjectCreated│───────▶│ Notification │               │ Image (PK)   │
//! │ notifications│        │ Handler      │               │ Smile        │
//! └──────────────┘        └──────────────┘               │ Emotions     │
//!                           │          │                 │ AgeRange     │
//!                           ▼          ▼                 └──────────────┘
//!                  ┌──────────────┐ ┌──────────────┐            ▲
//!                  │ Rekognition  │ │ Quality      │────────────┘
//!                  │ DetectFaces  │ │ Gate         │   PutItem
//!                  └──────────────┘ └──────────────┘
//! ```

pub mod config;
pub mod detection;
pub mod error;
pub mod handler;
pub mod notification;
pub mod quality_gate;
pub mod record_store;

pub use config::Config;
pub use detection::{DetectionResult, FaceAttributes, FaceDetector, RekognitionDetector};
pub use error::IndexerError;
pub use handler::{BatchReport, NotificationHandler, NotificationReport, ProcessOutcome};
pub use notification::UploadNotification;
pub use quality_gate::{QualityDecision, QualityGate, QualityGateBuilder};
pub use record_store::{DynamoRecordStore, ImageRecord, RecordStore};
