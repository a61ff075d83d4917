use crate::error::DerivativeError;
use crate::types::Artifact;

/// How a finished request answers the client. Exactly one per request.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Bytes in the response body.
    Inline(Artifact),
    /// Client should fetch the cached derivative from `location`.
    Redirect { location: String },
    Error(DerivativeError),
}

/// Pick inline or redirect delivery for a freshly computed artifact.
///
/// Artifacts up to `max_inline_bytes` (inclusive) go inline. Larger ones can only be
/// redirected if the derivative write succeeded; otherwise there is nothing to point at.
pub fn decide(
    artifact: Artifact,
    max_inline_bytes: usize,
    written: bool,
    location: String,
) -> DeliveryOutcome {
    let size = artifact.size_bytes();
    if size <= max_inline_bytes {
        DeliveryOutcome::Inline(artifact)
    } else if written {
        DeliveryOutcome::Redirect { location }
    } else {
        DeliveryOutcome::Error(DerivativeError::TooLarge(size))
    }
}
