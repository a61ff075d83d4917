use crate::router::ProjectRoutes;
use crate::types::OutputFormat;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable"; // 1 year
const DEFAULT_MAX_INLINE_BYTES: usize = 4_500_000; // stays under the 6MB Lambda payload once base64-encoded
const DEFAULT_QUALITY: u8 = 80;
const DEFAULT_TRUSTED_EDGE_HEADER: &str = "x-origin-verify";

/// Characters left as-is when a derivative key becomes a URL path.
/// `=` and `,` appear in every operation suffix.
const KEY_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'=')
    .remove(b',');

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where a deployment reads transform operations from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationsSource {
    /// `?width=300&format=webp`
    Query,
    /// `/width=300,format=webp` as the last path segment
    Path,
}

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub frame_offset_secs: f64,
    pub max_width: u32,
    pub max_height: u32,
    pub ffmpeg_path: String,
    pub timeout: Duration,
}

/// Process-wide configuration, loaded once at cold start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub routes: ProjectRoutes,
    pub derivative_bucket: String,
    pub derivative_public_url: String,
    pub cache_control: String,
    pub max_inline_bytes: usize,
    pub supported_formats: Vec<OutputFormat>,
    pub default_quality: u8,
    pub fallback_format: OutputFormat,
    pub operations_source: OperationsSource,
    pub trusted_edge_header: String,
    pub trusted_edge_secret: String,
    pub video: VideoConfig,
    pub store_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from any variable source. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_routes = lookup("PROJECT_ROUTES").ok_or(ConfigError::Missing("PROJECT_ROUTES"))?;
        let routes = ProjectRoutes::from_json(&raw_routes).map_err(|e| ConfigError::Invalid {
            name: "PROJECT_ROUTES",
            reason: e.to_string(),
        })?;
        if routes.is_empty() {
            return Err(ConfigError::Invalid {
                name: "PROJECT_ROUTES",
                reason: "at least one project is required".to_string(),
            });
        }

        let derivative_bucket =
            lookup("DERIVATIVE_BUCKET").ok_or(ConfigError::Missing("DERIVATIVE_BUCKET"))?;
        let derivative_public_url = lookup("DERIVATIVE_PUBLIC_URL")
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", derivative_bucket))
            .trim_end_matches('/')
            .to_string();

        let trusted_edge_secret =
            lookup("TRUSTED_EDGE_SECRET").ok_or(ConfigError::Missing("TRUSTED_EDGE_SECRET"))?;
        if trusted_edge_secret.is_empty() {
            return Err(ConfigError::Invalid {
                name: "TRUSTED_EDGE_SECRET",
                reason: "must not be empty".to_string(),
            });
        }

        let supported_formats = match lookup("SUPPORTED_FORMATS") {
            Some(raw) => parse_formats(&raw)?,
            None => OutputFormat::ALL.to_vec(),
        };

        let default_quality: u8 = parse_or(&lookup, "DEFAULT_QUALITY", DEFAULT_QUALITY)?;
        if !(1..=100).contains(&default_quality) {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_QUALITY",
                reason: format!("{} is outside 1..=100", default_quality),
            });
        }

        let fallback_format = match lookup("FALLBACK_FORMAT") {
            Some(raw) => OutputFormat::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "FALLBACK_FORMAT",
                reason: format!("unknown format '{}'", raw),
            })?,
            None => OutputFormat::Png,
        };
        if !supported_formats.contains(&fallback_format) {
            return Err(ConfigError::Invalid {
                name: "FALLBACK_FORMAT",
                reason: format!("'{}' is not in SUPPORTED_FORMATS", fallback_format.as_str()),
            });
        }

        let operations_source = match lookup("OPERATIONS_SOURCE").as_deref() {
            None | Some("query") => OperationsSource::Query,
            Some("path") => OperationsSource::Path,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "OPERATIONS_SOURCE",
                    reason: format!("expected 'query' or 'path', got '{}'", other),
                })
            }
        };

        let video = VideoConfig {
            frame_offset_secs: parse_or(&lookup, "VIDEO_FRAME_OFFSET_SECS", 1.0)?,
            max_width: parse_or(&lookup, "VIDEO_MAX_WIDTH", 640)?,
            max_height: parse_or(&lookup, "VIDEO_MAX_HEIGHT", 640)?,
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            timeout: Duration::from_secs(parse_or(&lookup, "FFMPEG_TIMEOUT_SECS", 20)?),
        };
        if video.frame_offset_secs < 0.0 || video.max_width == 0 || video.max_height == 0 {
            return Err(ConfigError::Invalid {
                name: "VIDEO_*",
                reason: "offset must be non-negative and bounds non-zero".to_string(),
            });
        }

        Ok(Self {
            routes,
            derivative_bucket,
            derivative_public_url,
            cache_control: lookup("DERIVATIVE_CACHE_CONTROL")
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
            max_inline_bytes: parse_or(&lookup, "MAX_INLINE_BYTES", DEFAULT_MAX_INLINE_BYTES)?,
            supported_formats,
            default_quality,
            fallback_format,
            operations_source,
            trusted_edge_header: lookup("TRUSTED_EDGE_HEADER")
                .unwrap_or_else(|| DEFAULT_TRUSTED_EDGE_HEADER.to_string())
                .to_ascii_lowercase(),
            trusted_edge_secret,
            video,
            store_timeout: Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 10)?),
        })
    }

    /// Public URL of a cached derivative, used as the redirect target.
    pub fn derivative_location(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.derivative_public_url,
            utf8_percent_encode(key, KEY_PATH_SET)
        )
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn parse_formats(raw: &str) -> Result<Vec<OutputFormat>, ConfigError> {
    let mut formats = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let format = OutputFormat::parse(name).ok_or_else(|| ConfigError::Invalid {
            name: "SUPPORTED_FORMATS",
            reason: format!("unknown format '{}'", name),
        })?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        return Err(ConfigError::Invalid {
            name: "SUPPORTED_FORMATS",
            reason: "at least one format is required".to_string(),
        });
    }
    Ok(formats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("PROJECT_ROUTES", r#"{"geerly":"geerly-source"}"#),
        ("DERIVATIVE_BUCKET", "geerly-derivatives"),
        ("TRUSTED_EDGE_SECRET", "s3cret"),
    ];

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(cfg.routes.resolve("geerly").unwrap(), "geerly-source");
        assert_eq!(cfg.derivative_public_url, "https://geerly-derivatives.s3.amazonaws.com");
        assert_eq!(cfg.max_inline_bytes, DEFAULT_MAX_INLINE_BYTES);
        assert_eq!(cfg.default_quality, 80);
        assert_eq!(cfg.operations_source, OperationsSource::Query);
        assert_eq!(cfg.supported_formats.len(), 5);
        assert_eq!(cfg.trusted_edge_header, "x-origin-verify");
        assert_eq!(cfg.video.timeout, Duration::from_secs(20));
        assert_eq!(
            cfg.derivative_location("geerly/a.png/width=10"),
            "https://geerly-derivatives.s3.amazonaws.com/geerly/a.png/width=10"
        );
    }

    #[test]
    fn test_missing_required() {
        let err = AppConfig::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TRUSTED_EDGE_SECRET")));
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_INLINE_BYTES", "lots"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "MAX_INLINE_BYTES", .. }));
    }

    #[test]
    fn test_supported_formats_and_profile() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SUPPORTED_FORMATS", "jpeg, webp"));
        pairs.push(("FALLBACK_FORMAT", "jpg"));
        pairs.push(("OPERATIONS_SOURCE", "path"));
        pairs.push(("DERIVATIVE_PUBLIC_URL", "https://cdn.example.com/"));
        let cfg = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(cfg.supported_formats, vec![OutputFormat::Jpeg, OutputFormat::WebP]);
        assert_eq!(cfg.fallback_format, OutputFormat::Jpeg);
        assert_eq!(cfg.operations_source, OperationsSource::Path);
        assert_eq!(cfg.derivative_location("k"), "https://cdn.example.com/k");

        let bad = vec![REQUIRED[0], REQUIRED[1], REQUIRED[2], ("SUPPORTED_FORMATS", "bmp")];
        assert!(AppConfig::from_lookup(lookup_from(&bad)).is_err());
    }

    #[test]
    fn test_fallback_must_be_supported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SUPPORTED_FORMATS", "jpeg"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "FALLBACK_FORMAT", .. }));

        pairs.push(("FALLBACK_FORMAT", "jpeg"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_ok());
    }

    #[test]
    fn test_empty_route_table_rejected() {
        let pairs = [("PROJECT_ROUTES", "{}"), REQUIRED[1], REQUIRED[2]];
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PROJECT_ROUTES", .. }));
    }

    #[test]
    fn test_location_escapes_key() {
        let cfg = AppConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(
            cfg.derivative_location("geerly/photos/my file #1.png/format=webp,width=300"),
            "https://geerly-derivatives.s3.amazonaws.com/geerly/photos/my%20file%20%231.png/format=webp,width=300"
        );
        assert_eq!(
            cfg.derivative_location("geerly/café.jpg/default"),
            "https://geerly-derivatives.s3.amazonaws.com/geerly/caf%C3%A9.jpg/default"
        );
    }
}
