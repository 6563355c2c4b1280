use serde::Deserialize;
use thiserror::Error;

/// Main configuration for the face indexer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Target table for image records
    #[serde(default)]
    pub table: TableConfig,
    /// Upload bucket the function is wired to
    #[serde(default)]
    pub bucket: BucketConfig,
    /// Quality gate thresholds
    #[serde(default)]
    pub quality: QualityConfig,
    /// AWS client overrides
    #[serde(default)]
    pub aws: AwsConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// DynamoDB table configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableConfig {
    /// Table name, keyed by `Image`
    #[serde(default)]
    pub name: String,
}

/// Upload bucket configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketConfig {
    /// Expected bucket name. Notifications from other buckets are logged but still processed.
    pub name: Option<String>,
}

/// Quality gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    /// Minimum face width as a fraction of image width
    #[serde(default = "default_min_face_fraction")]
    pub min_face_width: f32,
    /// Minimum face height as a fraction of image height
    #[serde(default = "default_min_face_fraction")]
    pub min_face_height: f32,
}

/// AWS client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    /// Region override; falls back to the default provider chain
    pub region: Option<String>,
    /// Custom endpoint URL (for LocalStack)
    pub endpoint_url: Option<String>,
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

// Default value functions
fn default_service_name() -> String {
    "face-indexer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_face_fraction() -> f32 {
    0.1
}

impl Config {
    /// Load configuration from defaults, an optional config file and the environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .add_source(
                config::File::with_name("config/indexer")
                    .required(false)
            )
            // INDEXER__QUALITY__MIN_FACE_WIDTH -> quality.min_face_width
            .add_source(
                config::Environment::with_prefix("INDEXER")
                    .separator("__")
                    .try_parsing(true)
            )
            // Plain deploy-time variables set on the function
            .set_override_option("table.name", std::env::var("TABLE").ok())?
            .set_override_option("bucket.name", std::env::var("BUCKET").ok())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.table.name.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("table.name".to_string()));
        }

        validate_fraction("quality.min_face_width", self.quality.min_face_width)?;
        validate_fraction("quality.min_face_height", self.quality.min_face_height)?;

        if let Some(ref bucket) = self.bucket.name {
            if bucket.trim().is_empty() {
                return Err(ConfigValidationError::InvalidValue {
                    field: "bucket.name".to_string(),
                    message: "Bucket name must not be blank".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn validate_fraction(field: &str, value: f32) -> Result<(), ConfigValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("{} is not a fraction between 0 and 1", value),
        });
    }
    Ok(())
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_face_width: default_min_face_fraction(),
            min_face_height: default_min_face_fraction(),
        }
    }
}
