use lambda_http::http::StatusCode;
use thiserror::Error;

/// Every failure a derivative request can end in.
///
/// The `String` payloads are internal detail for logs. Clients only ever see
/// [`DerivativeError::client_message`].
#[derive(Debug, Error)]
pub enum DerivativeError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("source object not found: {0}")]
    SourceNotFound(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid quality: {0}")]
    InvalidQuality(i64),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("storage misconfigured: {0}")]
    StorageConfig(String),

    #[error("transform failed: {0}")]
    TransformFailed(String),

    #[error("artifact too large to inline: {0} bytes")]
    TooLarge(usize),

    #[error("store error: {0}")]
    Store(String),
}

impl DerivativeError {
    pub fn status(&self) -> StatusCode {
        match self {
            DerivativeError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            DerivativeError::UnknownProject(_) => StatusCode::NOT_FOUND,
            DerivativeError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            DerivativeError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DerivativeError::InvalidQuality(_) => StatusCode::BAD_REQUEST,
            DerivativeError::AccessDenied(_) => StatusCode::FORBIDDEN,
            DerivativeError::StorageConfig(_) => StatusCode::SERVICE_UNAVAILABLE,
            DerivativeError::TransformFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DerivativeError::TooLarge(_) => StatusCode::FORBIDDEN,
            DerivativeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable text for the `{"error": ...}` body.
    pub fn client_message(&self) -> &'static str {
        match self {
            DerivativeError::MalformedRequest(_) => "Malformed request",
            DerivativeError::UnknownProject(_) => "Project not found",
            DerivativeError::SourceNotFound(_) => "Source object not found",
            DerivativeError::UnsupportedFormat(_) => "Unsupported format",
            DerivativeError::InvalidQuality(_) => "Quality must be between 1 and 100",
            DerivativeError::AccessDenied(_) => "Access denied",
            DerivativeError::StorageConfig(_) => "Storage temporarily unavailable",
            DerivativeError::TransformFailed(_) => "Failed to generate derivative",
            DerivativeError::TooLarge(_) => "Derivative too large to deliver",
            DerivativeError::Store(_) => "Internal storage error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        let cases = [
            (DerivativeError::MalformedRequest("x".into()), 400),
            (DerivativeError::UnknownProject("x".into()), 404),
            (DerivativeError::SourceNotFound("x".into()), 404),
            (DerivativeError::UnsupportedFormat("tiff".into()), 415),
            (DerivativeError::InvalidQuality(0), 400),
            (DerivativeError::AccessDenied("x".into()), 403),
            (DerivativeError::StorageConfig("x".into()), 503),
            (DerivativeError::TransformFailed("x".into()), 500),
            (DerivativeError::TooLarge(10), 403),
            (DerivativeError::Store("x".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{:?}", err);
        }
    }

    #[test]
    fn test_client_message_hides_detail() {
        let err = DerivativeError::Store("dispatch failure: connection reset".into());
        assert!(!err.client_message().contains("connection reset"));
        assert_eq!(
            DerivativeError::UnknownProject("nope".into()).client_message(),
            "Project not found"
        );
    }
}
