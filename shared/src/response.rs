use crate::delivery::DeliveryOutcome;
use crate::error::DerivativeError;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::time::Duration;

/// Turn a pipeline outcome into the HTTP response.
///
/// `cache_control` is the derivative cache policy; `elapsed` feeds the `Server-Timing` header.
pub fn outcome_response(
    outcome: DeliveryOutcome,
    cache_control: &str,
    elapsed: Duration,
) -> Result<Response<Body>, Error> {
    let timing = format!("derive;dur={}", elapsed.as_millis());
    match outcome {
        DeliveryOutcome::Inline(artifact) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", artifact.content_type)
            .header("Cache-Control", cache_control)
            .header("Server-Timing", timing)
            .header("Access-Control-Allow-Origin", "*")
            // Binary bodies are base64-encoded by the Lambda HTTP adapter
            .body(Body::Binary(artifact.bytes))
            .map_err(Box::new)?),
        DeliveryOutcome::Redirect { location } => Ok(Response::builder()
            .status(StatusCode::FOUND)
            .header("Location", location)
            .header("Cache-Control", cache_control)
            .header("Server-Timing", timing)
            .header("Access-Control-Allow-Origin", "*")
            .body(Body::Empty)
            .map_err(Box::new)?),
        DeliveryOutcome::Error(err) => error_response(&err),
    }
}

/// Log the internal detail, answer with the stable client message.
pub fn error_response(err: &DerivativeError) -> Result<Response<Body>, Error> {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), "Request failed: {}", err);
    } else {
        tracing::info!(status = status.as_u16(), "Request rejected: {}", err);
    }
    json_error(status, err.client_message())
}

pub fn json_error(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-store")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({ "error": message }).to_string().into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Artifact;

    fn body_json(response: &Response<Body>) -> serde_json::Value {
        serde_json::from_slice(response.body().as_ref()).unwrap()
    }

    #[test]
    fn test_inline_response() {
        let outcome = DeliveryOutcome::Inline(Artifact::new(vec![1, 2, 3], "image/webp"));
        let response = outcome_response(outcome, "public, max-age=60", Duration::from_millis(12)).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["Content-Type"], "image/webp");
        assert_eq!(response.headers()["Cache-Control"], "public, max-age=60");
        assert_eq!(response.headers()["Server-Timing"], "derive;dur=12");
        assert!(matches!(response.body(), Body::Binary(b) if b == &vec![1, 2, 3]));
    }

    #[test]
    fn test_redirect_response() {
        let outcome = DeliveryOutcome::Redirect {
            location: "https://cdn.example.com/geerly/a.png/width=10".into(),
        };
        let response = outcome_response(outcome, "public", Duration::ZERO).unwrap();
        assert_eq!(response.status(), 302);
        assert_eq!(
            response.headers()["Location"],
            "https://cdn.example.com/geerly/a.png/width=10"
        );
    }

    #[test]
    fn test_error_body_is_stable_message() {
        let err = DerivativeError::StorageConfig("NoSuchBucket: geerly-source".into());
        let response = error_response(&err).unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(body_json(&response), serde_json::json!({ "error": "Storage temporarily unavailable" }));
    }
}
