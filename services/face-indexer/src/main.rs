use anyhow::{anyhow, Context, Result};
use aws_config::BehaviorVersion;
use aws_lambda_events::event::s3::S3Event;
use face_indexer::config::{AwsConfig, Config};
use face_indexer::{DynamoRecordStore, NotificationHandler, QualityGate, RekognitionDetector};
use lambda_runtime::{run, service_fn, LambdaEvent};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        table = %config.table.name,
        bucket = ?config.bucket.name,
        "Starting face indexer"
    );

    // Clients are built once per execution environment and reused by every invocation
    let sdk_config = load_aws_config(&config.aws).await;
    let detector = Arc::new(RekognitionDetector::new(&sdk_config, &config.aws));
    let store = Arc::new(DynamoRecordStore::new(
        &sdk_config,
        &config.aws,
        &config.table.name,
    ));

    let handler = NotificationHandler::new(
        detector,
        store,
        QualityGate::new(config.quality.clone()),
    )
    .with_expected_bucket(config.bucket.name.clone());

    run(service_fn(|event| function_handler(&handler, event)))
        .await
        .map_err(|e| anyhow!(e))
        .context("Lambda runtime error")
}

/// Handle one S3 event invocation
///
/// Always succeeds once every notification has settled; per-notification
/// failures are only logged.
async fn function_handler(
    handler: &NotificationHandler,
    event: LambdaEvent<S3Event>,
) -> Result<(), lambda_runtime::Error> {
    info!(
        request_id = %event.context.request_id,
        records = event.payload.records.len(),
        "Received upload notifications"
    );

    handler.handle_batch(&event.payload).await;

    Ok(())
}

/// Load the shared AWS configuration, honoring a region override
async fn load_aws_config(config: &AwsConfig) -> aws_types::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(ref region) = config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    loader.load().await
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}
