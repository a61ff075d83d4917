use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use derivatives_shared::config::AppConfig;
use derivatives_shared::s3::S3BlobStore;
use derivatives_shared::video_thumbnail::FfmpegFrameExtractor;
use derivatives_shared::AppState;
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    // Configuration and clients are built once per cold start
    let config = AppConfig::from_env()?;
    tracing::info!(
        projects = config.routes.len(),
        derivative_bucket = %config.derivative_bucket,
        "Derivative Lambda starting"
    );

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(config.store_timeout)
                .build(),
        )
        .load()
        .await;

    let frames = FfmpegFrameExtractor::from_config(&config.video);
    let state = AppState::new(
        config,
        Arc::new(S3BlobStore::new(S3Client::new(&sdk_config))),
        Arc::new(frames),
    );

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
