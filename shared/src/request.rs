use crate::config::OperationsSource;
use crate::error::DerivativeError;
use crate::types::{MediaKind, Operation, OperationName, Operations, OutputFormat, TransformRequest};
use percent_encoding::percent_decode_str;

/// Parse an inbound path (and query pairs) into a [`TransformRequest`].
///
/// Accepted shapes:
/// - `/{project}/{objectPath...}?width=&height=&quality=&format=` (query profile)
/// - `/{project}/{objectPath...}/width=300,format=webp` (path profile)
pub fn parse_request(
    path: &str,
    query: &[(&str, &str)],
    source: OperationsSource,
) -> Result<TransformRequest, DerivativeError> {
    let segments = path
        .trim_start_matches('/')
        .split('/')
        .map(decode_segment)
        .collect::<Result<Vec<String>, DerivativeError>>()?;
    if segments.iter().any(|s| s.is_empty()) {
        return Err(malformed("empty path segment"));
    }

    let (project_id, mut rest) = match segments.split_first() {
        Some((project, rest)) if !rest.is_empty() => (project, rest),
        _ => return Err(malformed("expected /{project}/{objectPath}")),
    };

    let mut operations = Operations::new();
    match source {
        OperationsSource::Path => {
            if let Some((last, head)) = rest.split_last() {
                if last.contains('=') {
                    parse_operation_segment(last, &mut operations)?;
                    rest = head;
                }
            }
        }
        OperationsSource::Query => {
            for (name, value) in query {
                // unrelated query parameters (cache busters, tracking) are ignored
                if let Some(name) = OperationName::parse(name) {
                    operations.push(parse_operation(name, value)?)?;
                }
            }
        }
    }

    if rest.is_empty() {
        return Err(malformed("object path is empty"));
    }
    if let Some(bad) = rest.iter().find(|s| is_traversal(s)) {
        return Err(malformed(&format!("illegal path segment '{}'", bad)));
    }

    let object_path = rest.join("/");
    let kind = MediaKind::from_path(&object_path);
    if kind == MediaKind::Video && !operations.is_empty() {
        return Err(malformed("video derivatives take no operations"));
    }

    Ok(TransformRequest {
        project_id: project_id.to_string(),
        object_path,
        operations,
        kind,
    })
}

fn parse_operation_segment(segment: &str, operations: &mut Operations) -> Result<(), DerivativeError> {
    for pair in segment.split(',').filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| malformed(&format!("expected key=value, got '{}'", pair)))?;
        let name = OperationName::parse(name)
            .ok_or_else(|| malformed(&format!("unknown operation '{}'", name)))?;
        operations.push(parse_operation(name, value)?)?;
    }
    Ok(())
}

fn parse_operation(name: OperationName, raw: &str) -> Result<Operation, DerivativeError> {
    let raw = raw.trim();
    match name {
        OperationName::Width | OperationName::Height => {
            let value: u32 = raw
                .parse()
                .map_err(|_| malformed(&format!("{} must be an integer, got '{}'", name.as_str(), raw)))?;
            if value == 0 {
                return Err(malformed(&format!("{} must be positive", name.as_str())));
            }
            Ok(if name == OperationName::Width {
                Operation::Width(value)
            } else {
                Operation::Height(value)
            })
        }
        OperationName::Quality => raw
            .parse::<i64>()
            .map(Operation::Quality)
            .map_err(|_| malformed(&format!("quality must be an integer, got '{}'", raw))),
        OperationName::Format => {
            if raw.is_empty() {
                return Err(malformed("format must not be empty"));
            }
            let lowered = raw.to_ascii_lowercase();
            // fold aliases (jpg → jpeg) so they share a derivative key
            let canonical = OutputFormat::parse(&lowered)
                .map(|f| f.as_str().to_string())
                .unwrap_or(lowered);
            Ok(Operation::Format(canonical))
        }
    }
}

/// Raw URI paths arrive percent-encoded; object keys are matched decoded.
fn decode_segment(raw: &str) -> Result<String, DerivativeError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed(&format!("path segment '{}' is not valid UTF-8", raw)))
}

/// Checked after decoding, so `%2e%2e` and `%2f` are caught too.
fn is_traversal(segment: &str) -> bool {
    matches!(segment, "." | "..") || segment.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}

fn malformed(detail: &str) -> DerivativeError {
    DerivativeError::MalformedRequest(detail.to_string())
}
