use derivatives_shared::{pipeline, request, response, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Main Lambda handler - every request is a derivative lookup
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("Derivative request - Method: {} Path: {}", method, path);

    let config = &state.config;

    // Only traffic that came through the trusted edge is served
    let marker = event
        .headers()
        .get(config.trusted_edge_header.as_str())
        .and_then(|v| v.to_str().ok());
    if marker != Some(config.trusted_edge_secret.as_str()) {
        tracing::warn!("Rejected request without valid edge marker: {}", path);
        return response::json_error(StatusCode::FORBIDDEN, "Forbidden");
    }

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,HEAD,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    if method != Method::GET && method != Method::HEAD {
        return response::json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    let query: Vec<(&str, &str)> = event
        .query_string_parameters_ref()
        .map(|params| params.iter().collect())
        .unwrap_or_default();

    let transform_request = match request::parse_request(path, &query, config.operations_source) {
        Ok(req) => req,
        Err(err) => return response::error_response(&err),
    };

    let started = Instant::now();
    let outcome = pipeline::serve(&state, &transform_request).await;
    response::outcome_response(outcome, &config.cache_control, started.elapsed())
}
