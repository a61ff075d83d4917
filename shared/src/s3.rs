use crate::store::{BlobStore, StoreError};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

/// [`BlobStore`] backed by S3.
#[derive(Clone)]
pub struct S3BlobStore {
    client: S3Client,
}

impl S3BlobStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => match classify(&e) {
                StoreError::NotFound => Ok(false),
                other => {
                    tracing::error!(bucket, key, "HeadObject failed: {}", DisplayErrorContext(&e));
                    Err(other)
                }
            },
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let result = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(result) => result,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StoreError::NotFound)
            }
            Err(e) => {
                let err = classify(&e);
                if !matches!(err, StoreError::NotFound) {
                    tracing::error!(bucket, key, "GetObject failed: {}", DisplayErrorContext(&e));
                }
                return Err(err);
            }
        };

        let body_bytes = result
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Other(format!("Failed to read S3 body: {}", e)))?
            .into_bytes();

        Ok(body_bytes.to_vec())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .cache_control(cache_control)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(bucket, key, "PutObject failed: {}", DisplayErrorContext(&e));
                classify(&e)
            })?;
        Ok(())
    }
}

/// Sort an SDK failure into a [`StoreError`] by error code first, HTTP status second.
fn classify<E>(err: &SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify_parts(err.code(), status, &err.message().unwrap_or("").to_string())
}

fn classify_parts(code: Option<&str>, status: Option<u16>, message: &str) -> StoreError {
    match code {
        Some("NoSuchKey") | Some("NotFound") => return StoreError::NotFound,
        Some(
            c @ ("NoSuchBucket"
            | "PermanentRedirect"
            | "AuthorizationHeaderMalformed"
            | "InvalidBucketName"
            | "IllegalLocationConstraintException"),
        ) => return StoreError::BucketUnavailable(c.to_string()),
        Some(
            c @ ("AccessDenied"
            | "AllAccessDisabled"
            | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch"
            | "ExpiredToken"),
        ) => return StoreError::AccessDenied(c.to_string()),
        _ => {}
    }

    match status {
        Some(404) => StoreError::NotFound,
        Some(301) => StoreError::BucketUnavailable("bucket in another region".to_string()),
        Some(403) => StoreError::AccessDenied(code.unwrap_or("Forbidden").to_string()),
        _ => StoreError::Other(format!(
            "{} ({})",
            code.unwrap_or("unknown"),
            if message.is_empty() { "no message" } else { message }
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_code() {
        assert!(matches!(classify_parts(Some("NoSuchKey"), Some(404), ""), StoreError::NotFound));
        assert!(matches!(
            classify_parts(Some("NoSuchBucket"), Some(404), ""),
            StoreError::BucketUnavailable(_)
        ));
        assert!(matches!(
            classify_parts(Some("AccessDenied"), Some(403), ""),
            StoreError::AccessDenied(_)
        ));
        assert!(matches!(
            classify_parts(Some("SlowDown"), Some(503), "reduce request rate"),
            StoreError::Other(_)
        ));
    }

    #[test]
    fn test_classify_by_status_when_no_code() {
        // HEAD responses carry no body, so only the status is known
        assert!(matches!(classify_parts(None, Some(404), ""), StoreError::NotFound));
        assert!(matches!(classify_parts(None, Some(403), ""), StoreError::AccessDenied(_)));
        assert!(matches!(classify_parts(None, Some(301), ""), StoreError::BucketUnavailable(_)));
        assert!(matches!(classify_parts(None, None, ""), StoreError::Other(_)));
    }
}
