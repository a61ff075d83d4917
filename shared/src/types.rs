use crate::error::DerivativeError;
use image::ImageFormat;

// ========== OUTPUT FORMAT ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::WebP,
        OutputFormat::Gif,
        OutputFormat::Avif,
    ];

    /// Parse a format name as it appears in a request (`jpg` is accepted for JPEG).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "gif" => Some(OutputFormat::Gif),
            "avif" => Some(OutputFormat::Avif),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Gif => "gif",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Avif => "image/avif",
        }
    }

    /// Quality only means something for lossy encoders.
    pub fn is_lossy(&self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::WebP | OutputFormat::Avif)
    }

    /// Output format matching a decoded source, if we can write it back.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::WebP),
            ImageFormat::Gif => Some(OutputFormat::Gif),
            ImageFormat::Avif => Some(OutputFormat::Avif),
            _ => None,
        }
    }
}

// ========== OPERATIONS ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationName {
    Width,
    Height,
    Format,
    Quality,
}

impl OperationName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "width" => Some(OperationName::Width),
            "height" => Some(OperationName::Height),
            "format" => Some(OperationName::Format),
            "quality" => Some(OperationName::Quality),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::Width => "width",
            OperationName::Height => "height",
            OperationName::Format => "format",
            OperationName::Quality => "quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Width(u32),
    Height(u32),
    /// Lowercased format name. Support is checked by the transform engine.
    Format(String),
    /// Raw integer; range is checked by the transform engine.
    Quality(i64),
}

impl Operation {
    pub fn name(&self) -> OperationName {
        match self {
            Operation::Width(_) => OperationName::Width,
            Operation::Height(_) => OperationName::Height,
            Operation::Format(_) => OperationName::Format,
            Operation::Quality(_) => OperationName::Quality,
        }
    }

    pub fn value(&self) -> String {
        match self {
            Operation::Width(v) | Operation::Height(v) => v.to_string(),
            Operation::Format(f) => f.clone(),
            Operation::Quality(q) => q.to_string(),
        }
    }
}

/// Operations in the order the client supplied them. Each name appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operations(Vec<Operation>);

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation) -> Result<(), DerivativeError> {
        if self.0.iter().any(|existing| existing.name() == op.name()) {
            return Err(DerivativeError::MalformedRequest(format!(
                "duplicate operation '{}'",
                op.name().as_str()
            )));
        }
        self.0.push(op);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.0.iter()
    }

    pub fn width(&self) -> Option<u32> {
        self.0.iter().find_map(|op| match op {
            Operation::Width(w) => Some(*w),
            _ => None,
        })
    }

    pub fn height(&self) -> Option<u32> {
        self.0.iter().find_map(|op| match op {
            Operation::Height(h) => Some(*h),
            _ => None,
        })
    }

    pub fn format(&self) -> Option<&str> {
        self.0.iter().find_map(|op| match op {
            Operation::Format(f) => Some(f.as_str()),
            _ => None,
        })
    }

    pub fn quality(&self) -> Option<i64> {
        self.0.iter().find_map(|op| match op {
            Operation::Quality(q) => Some(*q),
            _ => None,
        })
    }
}

// ========== REQUEST ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "mov", "m4v", "webm", "mkv", "avi", "mpeg"];

impl MediaKind {
    /// Media kind from the object path's extension.
    pub fn from_path(object_path: &str) -> Self {
        let extension = object_path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub project_id: String,
    pub object_path: String,
    pub operations: Operations,
    pub kind: MediaKind,
}

// ========== ARTIFACT ==========
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_path("clips/a.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_path("clips/A.MOV"), MediaKind::Video);
        assert_eq!(MediaKind::from_path("photos/a.png"), MediaKind::Image);
        assert_eq!(MediaKind::from_path("photos.mp4/readme"), MediaKind::Image);
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let mut ops = Operations::new();
        ops.push(Operation::Width(100)).unwrap();
        let err = ops.push(Operation::Width(200)).unwrap_err();
        assert!(matches!(err, DerivativeError::MalformedRequest(_)));
        assert_eq!(ops.width(), Some(100));
    }

    #[test]
    fn test_lossy_formats() {
        assert!(OutputFormat::Jpeg.is_lossy());
        assert!(OutputFormat::WebP.is_lossy());
        assert!(OutputFormat::Avif.is_lossy());
        assert!(!OutputFormat::Png.is_lossy());
        assert!(!OutputFormat::Gif.is_lossy());
        assert_eq!(OutputFormat::parse("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse("tiff"), None);
    }
}
