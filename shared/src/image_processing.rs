use crate::error::DerivativeError;
use crate::types::{Artifact, Operations, OutputFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{
    ColorType, DynamicImage, ImageBuffer, ImageDecoder, ImageError, ImageFormat, ImageReader, Limits, RgbaImage,
};
use std::io::{Cursor, ErrorKind};

/// rav1e speed preset; 1 is slowest/best, 10 fastest
const AVIF_SPEED: u8 = 8;

/// Longest edge accepted from a source image
const MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Pixel buffer ceiling for one decode (256 MiB)
const MAX_DECODE_BYTES: u64 = 256 * 1024 * 1024;

/// Image operations after validation against what this deployment can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlan {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// `None` keeps the source format (or the fallback for sources we cannot write).
    pub format: Option<OutputFormat>,
    pub quality: u8,
}

/// Validate format and quality. Runs before any store access so bad requests are cheap.
pub fn plan(
    operations: &Operations,
    supported: &[OutputFormat],
    default_quality: u8,
) -> Result<ImagePlan, DerivativeError> {
    let format = match operations.format() {
        Some(name) => {
            let format = OutputFormat::parse(name)
                .filter(|f| supported.contains(f))
                .ok_or_else(|| DerivativeError::UnsupportedFormat(name.to_string()))?;
            Some(format)
        }
        None => None,
    };

    let quality = match operations.quality() {
        Some(q) if (1..=100).contains(&q) => q as u8,
        Some(q) => return Err(DerivativeError::InvalidQuality(q)),
        None => default_quality,
    };

    Ok(ImagePlan {
        width: operations.width(),
        height: operations.height(),
        format,
        quality,
    })
}

/// Decode, orient, resize and re-encode a source image. CPU bound; call from a blocking thread.
pub fn transform_image(
    source: &[u8],
    plan: &ImagePlan,
    supported: &[OutputFormat],
    fallback: OutputFormat,
) -> Result<Artifact, DerivativeError> {
    let (img, source_format) = if looks_like_svg(source) {
        (rasterize_svg(source)?, None)
    } else {
        let (img, format) = decode_upright(source, decode_limits())?;
        (img, Some(format))
    };

    let img = match (plan.width, plan.height) {
        (None, None) => img,
        (w, h) => {
            let (new_width, new_height) = fit_inside(img.width(), img.height(), w, h);
            if (new_width, new_height) == (img.width(), img.height()) {
                img
            } else {
                img.resize_exact(new_width, new_height, FilterType::Lanczos3)
            }
        }
    };

    let output = plan.format.unwrap_or_else(|| {
        source_format
            .and_then(OutputFormat::from_image_format)
            .filter(|f| supported.contains(f))
            .unwrap_or(fallback)
    });

    let bytes = encode(&img, output, plan.quality)?;
    tracing::debug!(
        width = img.width(),
        height = img.height(),
        format = output.as_str(),
        size = bytes.len(),
        "Encoded derivative"
    );
    Ok(Artifact::new(bytes, output.content_type()))
}

/// Target size for a `fit=inside` resize that never enlarges the source.
pub fn fit_inside(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let bound_w = max_width.unwrap_or(width).min(width);
    let bound_h = max_height.unwrap_or(height).min(height);

    let ratio = (bound_w as f64 / width as f64).min(bound_h as f64 / height as f64);
    if ratio >= 1.0 {
        return (width, height);
    }

    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, bound_w.max(1));
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, bound_h.max(1));
    (new_width, new_height)
}

/// Decode with the embedded orientation applied.
///
/// A missing or unreadable orientation tag is not fatal; the image is used as stored.
/// Once the header has parsed, a source cut short keeps whatever rows were decoded.
fn decode_upright(source: &[u8], mut limits: Limits) -> Result<(DynamicImage, ImageFormat), DerivativeError> {
    let mut reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| DerivativeError::TransformFailed(format!("Failed to read image: {}", e)))?;
    reader.limits(limits.clone());

    let format = reader
        .format()
        .ok_or_else(|| DerivativeError::TransformFailed("Source is not a recognizable image".to_string()))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| DerivativeError::TransformFailed(format!("Failed to load image: {}", e)))?;

    let orientation = decoder.orientation().unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable orientation metadata: {}", e);
        Orientation::NoTransforms
    });

    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let total = decoder.total_bytes();
    limits
        .reserve(total)
        .map_err(|e| DerivativeError::TransformFailed(format!("Image too large to decode: {}", e)))?;
    let len = usize::try_from(total)
        .map_err(|_| DerivativeError::TransformFailed(format!("Image too large to decode: {} bytes", total)))?;

    let mut buf = vec![0u8; len];
    match decoder.read_image(&mut buf) {
        Ok(()) => {}
        Err(ImageError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
            tracing::warn!(width, height, "Source image is truncated, using the rows that decoded");
        }
        Err(e) => {
            return Err(DerivativeError::TransformFailed(format!("Failed to decode image: {}", e)));
        }
    }

    let mut img = image_from_raw(width, height, color, buf)?;
    img.apply_orientation(orientation);

    Ok((img, format))
}

/// Wrap a native-endian decode buffer in the matching [`DynamicImage`] variant.
fn image_from_raw(width: u32, height: u32, color: ColorType, buf: Vec<u8>) -> Result<DynamicImage, DerivativeError> {
    fn words(buf: &[u8]) -> Vec<u16> {
        buf.chunks_exact(2).map(|c| u16::from_ne_bytes([c[0], c[1]])).collect()
    }
    fn floats(buf: &[u8]) -> Vec<f32> {
        buf.chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    let img = match color {
        ColorType::L8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
        ColorType::La8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8),
        ColorType::Rgb8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
        ColorType::Rgba8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8),
        ColorType::L16 => ImageBuffer::from_raw(width, height, words(&buf)).map(DynamicImage::ImageLuma16),
        ColorType::La16 => ImageBuffer::from_raw(width, height, words(&buf)).map(DynamicImage::ImageLumaA16),
        ColorType::Rgb16 => ImageBuffer::from_raw(width, height, words(&buf)).map(DynamicImage::ImageRgb16),
        ColorType::Rgba16 => ImageBuffer::from_raw(width, height, words(&buf)).map(DynamicImage::ImageRgba16),
        ColorType::Rgb32F => ImageBuffer::from_raw(width, height, floats(&buf)).map(DynamicImage::ImageRgb32F),
        ColorType::Rgba32F => ImageBuffer::from_raw(width, height, floats(&buf)).map(DynamicImage::ImageRgba32F),
        other => {
            return Err(DerivativeError::TransformFailed(format!(
                "Unsupported pixel layout {:?}",
                other
            )))
        }
    };
    img.ok_or_else(|| DerivativeError::TransformFailed("Decoded buffer does not match image size".to_string()))
}

/// Decode guard sized for the function's memory.
fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_BYTES);
    limits
}

fn looks_like_svg(source: &[u8]) -> bool {
    let head = &source[..source.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    (text.starts_with("<svg") || text.starts_with("<?xml") || text.starts_with("<!--")) && text.contains("<svg")
}

fn rasterize_svg(source: &[u8]) -> Result<DynamicImage, DerivativeError> {
    use resvg::{tiny_skia, usvg};

    let tree = usvg::Tree::from_data(source, &usvg::Options::default())
        .map_err(|e| DerivativeError::TransformFailed(format!("Failed to parse SVG: {}", e)))?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| DerivativeError::TransformFailed("SVG has no drawable area".to_string()))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let mut rgba = Vec::with_capacity(pixmap.pixels().len() * 4);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let buffer = RgbaImage::from_raw(size.width(), size.height(), rgba)
        .ok_or_else(|| DerivativeError::TransformFailed("SVG raster buffer size mismatch".to_string()))?;
    Ok(DynamicImage::ImageRgba8(buffer))
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, DerivativeError> {
    let failed = |e: &dyn std::fmt::Display| {
        DerivativeError::TransformFailed(format!("Failed to encode {}: {}", format.as_str(), e))
    };
    let mut buf = Cursor::new(Vec::new());

    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality)
                .encode_image(&rgb)
                .map_err(|e| failed(&e))?;
        }
        OutputFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut buf))
                .map_err(|e| failed(&e))?;
        }
        OutputFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut buf, ImageFormat::Gif)
                .map_err(|e| failed(&e))?;
        }
        OutputFormat::Avif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality))
                .map_err(|e| failed(&e))?;
        }
        OutputFormat::WebP => {
            // libwebp only takes 8-bit RGB(A)
            let normalized = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            let encoder = webp::Encoder::from_image(&normalized).map_err(|e| failed(&e))?;
            return Ok(encoder.encode(quality as f32).to_vec());
        }
    }

    Ok(buf.into_inner())
}
