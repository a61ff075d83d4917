use crate::delivery::{self, DeliveryOutcome};
use crate::error::DerivativeError;
use crate::image_processing::{self, ImagePlan};
use crate::key::DerivativeKey;
use crate::store::{BlobStore, StoreError};
use crate::types::{Artifact, MediaKind, TransformRequest};
use crate::video_thumbnail;
use crate::AppState;

/// Serve one derivative request: probe the cache, compute on a miss, write back, deliver.
///
/// Steps run strictly in order; each depends on the previous one.
pub async fn serve(state: &AppState, request: &TransformRequest) -> DeliveryOutcome {
    match run(state, request).await {
        Ok(outcome) => outcome,
        Err(err) => DeliveryOutcome::Error(err),
    }
}

async fn run(state: &AppState, request: &TransformRequest) -> Result<DeliveryOutcome, DerivativeError> {
    let config = &state.config;
    let source_bucket = config.routes.resolve(&request.project_id)?;

    // Reject bad format/quality before touching the store.
    let image_plan = match request.kind {
        MediaKind::Image => Some(image_processing::plan(
            &request.operations,
            &config.supported_formats,
            config.default_quality,
        )?),
        MediaKind::Video => None,
    };

    let key = DerivativeKey::build(&request.project_id, &request.object_path, &request.operations);
    let location = config.derivative_location(key.as_str());

    if probe(state.store.as_ref(), &config.derivative_bucket, &key).await? {
        tracing::info!(key = %key, "Derivative cache hit");
        return Ok(DeliveryOutcome::Redirect { location });
    }

    tracing::info!(key = %key, bucket = source_bucket, "Derivative cache miss");
    let source = fetch_source(state.store.as_ref(), source_bucket, &request.object_path).await?;

    let artifact = match image_plan {
        Some(plan) => compute_image(state, source, plan).await?,
        None => video_thumbnail::thumbnail(&source, state.frames.as_ref(), &config.video).await?,
    };

    let written = write_derivative(state, &key, &artifact).await;
    Ok(delivery::decide(artifact, config.max_inline_bytes, written, location))
}

/// HEAD against the derivative store. Only "absent" counts as a miss.
async fn probe(store: &dyn BlobStore, bucket: &str, key: &DerivativeKey) -> Result<bool, DerivativeError> {
    store.head(bucket, key.as_str()).await.map_err(|e| match e {
        StoreError::BucketUnavailable(detail) => DerivativeError::StorageConfig(detail),
        other => DerivativeError::Store(format!("probe {}: {}", key, other)),
    })
}

async fn fetch_source(store: &dyn BlobStore, bucket: &str, object_path: &str) -> Result<Vec<u8>, DerivativeError> {
    store.get(bucket, object_path).await.map_err(|e| match e {
        StoreError::NotFound => DerivativeError::SourceNotFound(format!("{}/{}", bucket, object_path)),
        StoreError::BucketUnavailable(detail) => DerivativeError::StorageConfig(detail),
        StoreError::AccessDenied(detail) => DerivativeError::AccessDenied(detail),
        StoreError::Other(detail) => DerivativeError::Store(detail),
    })
}

async fn compute_image(state: &AppState, source: Vec<u8>, plan: ImagePlan) -> Result<Artifact, DerivativeError> {
    let supported = state.config.supported_formats.clone();
    let fallback = state.config.fallback_format;
    tokio::task::spawn_blocking(move || {
        image_processing::transform_image(&source, &plan, &supported, fallback)
    })
    .await
    .map_err(|e| DerivativeError::TransformFailed(format!("transform task failed: {}", e)))?
}

/// Persist the artifact. Failures are logged and reported as `false`, never propagated.
async fn write_derivative(state: &AppState, key: &DerivativeKey, artifact: &Artifact) -> bool {
    let config = &state.config;
    match state
        .store
        .put(
            &config.derivative_bucket,
            key.as_str(),
            artifact.bytes.clone(),
            &artifact.content_type,
            &config.cache_control,
        )
        .await
    {
        Ok(()) => {
            tracing::info!(key = %key, size = artifact.size_bytes(), "Derivative stored");
            true
        }
        Err(e) => {
            tracing::error!(key = %key, "Failed to store derivative, serving anyway: {}", e);
            false
        }
    }
}
