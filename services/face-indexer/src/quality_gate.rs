use crate::config::QualityConfig;
use crate::detection::{DetectionResult, FaceAttributes};
use tracing::trace;

/// Decision on whether a detection result is worth persisting
#[derive(Debug, Clone, PartialEq)]
pub enum QualityDecision {
    /// A single, clearly visible subject
    Accept,
    /// Rejected with the given reason
    Reject { reason: String },
}

impl QualityDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, QualityDecision::Accept)
    }
}

/// Quality gate applied to a detection result before a record is written
///
/// Rules, each a hard rejection, in order:
/// - no faces detected
/// - any face without a bounding box size, or smaller than the minimum
///   width/height fraction of the image
/// - more than one face detected
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    /// Only single-subject images are indexed
    pub const MAX_FACES: usize = 1;

    /// Create a new quality gate with the given thresholds
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Evaluate a detection result
    pub fn evaluate(&self, result: &DetectionResult) -> QualityDecision {
        if result.is_empty() {
            return QualityDecision::Reject {
                reason: "No faces detected".to_string(),
            };
        }

        for (index, face) in result.faces.iter().enumerate() {
            if let Some(reason) = self.check_face_size(face) {
                trace!(face = index, %reason, "Face failed size check");
                return QualityDecision::Reject { reason };
            }
        }

        if result.face_count() > Self::MAX_FACES {
            return QualityDecision::Reject {
                reason: format!("Multiple faces detected: {}", result.face_count()),
            };
        }

        QualityDecision::Accept
    }

    /// Whether the detection result passes the gate
    pub fn is_acceptable(&self, result: &DetectionResult) -> bool {
        self.evaluate(result).is_accept()
    }

    /// Check one face's bounding box against the size thresholds
    fn check_face_size(&self, face: &FaceAttributes) -> Option<String> {
        let (width, height) = match face.bounding_box {
            Some(bbox) => match (bbox.width, bbox.height) {
                (Some(width), Some(height)) => (width, height),
                _ => return Some("Face bounding box has no size".to_string()),
            },
            None => return Some("Face has no bounding box".to_string()),
        };

        // Zero-sized boxes never pass, even with zero thresholds
        if width <= 0.0 || height <= 0.0 {
            return Some(format!("Face has zero size: {:.3}x{:.3}", width, height));
        }

        // Negated so NaN sizes fail too
        if !(width >= self.config.min_face_width) || !(height >= self.config.min_face_height) {
            return Some(format!(
                "Face too small: {:.3}x{:.3} < min {:.3}x{:.3}",
                width, height, self.config.min_face_width, self.config.min_face_height
            ));
        }

        None
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

/// Builder for creating QualityGate with custom thresholds
pub struct QualityGateBuilder {
    config: QualityConfig,
}

impl QualityGateBuilder {
    pub fn new() -> Self {
        Self {
            config: QualityConfig::default(),
        }
    }

    pub fn min_face_width(mut self, fraction: f32) -> Self {
        self.config.min_face_width = fraction;
        self
    }

    pub fn min_face_height(mut self, fraction: f32) -> Self {
        self.config.min_face_height = fraction;
        self
    }

    pub fn build(self) -> QualityGate {
        QualityGate::new(self.config)
    }
}

impl Default for QualityGateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
