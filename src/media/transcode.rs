/// Media transcoding: byte-signature detection and canonicalization
///
/// Every accepted upload is normalized to one canonical encoding before
/// hashing: raster images become lossy WebP, animated GIFs stay GIF,
/// vector images stay SVG after a structural optimization pass. The
/// whole module is a pure function of (bytes, options); deduplication
/// downstream depends on byte-identical output for byte-identical input.
use crate::error::{MediaError, MediaResult};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, Frame, ImageDecoder, ImageFormat};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// Quality used for canonical renditions
pub const PRIMARY_QUALITY: u8 = 100;
/// Quality used for preview renditions
pub const PREVIEW_QUALITY: u8 = 20;

/// Requested raster dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

/// Resize fit policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fit {
    /// Stretch to the exact target dimensions
    #[default]
    Fill,
    /// Fit within the target, preserving aspect ratio
    Contain,
    /// Cover the target, cropping overflow
    Cover,
}

/// Transcoding options
#[derive(Debug, Clone, Default)]
pub struct TranscodeOptions {
    pub size: Option<TargetSize>,
    pub quality: Option<u8>,
    pub fit: Fit,
}

impl TranscodeOptions {
    /// Options for the low-fidelity preview rendition
    pub fn preview() -> Self {
        Self {
            quality: Some(PREVIEW_QUALITY),
            ..Self::default()
        }
    }

    /// Options with a fixed target size
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            size: Some(TargetSize { width, height }),
            ..Self::default()
        }
    }
}

/// Result of a transcoding pass
#[derive(Debug, Clone)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    /// Canonical extension: webp, gif or svg
    pub format: String,
    /// Raster dimensions; absent for vector output without a target size
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Transcoded {
    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }
}

/// Format detected from the byte signature, never from a filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Svg,
}

/// Detect the real format of uploaded bytes.
pub fn detect(data: &[u8]) -> Option<DetectedFormat> {
    if let Some(kind) = infer::get(data) {
        return match kind.extension() {
            "png" => Some(DetectedFormat::Png),
            "jpg" => Some(DetectedFormat::Jpeg),
            "webp" => Some(DetectedFormat::Webp),
            "gif" => Some(DetectedFormat::Gif),
            _ => None,
        };
    }

    // SVG carries no magic number; sniff for a root <svg> element
    if let Ok(text) = std::str::from_utf8(data) {
        let head: String = text.chars().take(4096).collect();
        if head.contains("<svg") {
            return Some(DetectedFormat::Svg);
        }
    }

    None
}

/// Transcode uploaded bytes to their canonical form.
pub fn transcode(data: &[u8], options: &TranscodeOptions) -> MediaResult<Transcoded> {
    let quality = options.quality.unwrap_or(PRIMARY_QUALITY);
    if quality == 0 || quality > 100 {
        return Err(MediaError::Validation(format!(
            "Quality must be within 1..=100, got {}",
            quality
        )));
    }
    if let Some(size) = &options.size {
        if size.width == 0 || size.height == 0 {
            return Err(MediaError::Validation(
                "Resize dimensions must be non-zero".to_string(),
            ));
        }
    }

    match detect(data) {
        Some(DetectedFormat::Png) | Some(DetectedFormat::Jpeg) | Some(DetectedFormat::Webp) => {
            encode_webp(data, options, quality)
        }
        Some(DetectedFormat::Gif) => recode_gif(data, options),
        Some(DetectedFormat::Svg) => optimize_svg(data, options),
        None => Err(MediaError::UnsupportedFormat(
            "Unrecognized byte signature".to_string(),
        )),
    }
}

/// Re-encode stored canonical WebP bytes into a requested delivery format.
///
/// Used by the read path only; never mutates stored bytes.
pub fn convert_from_webp(data: &[u8], target: &str) -> MediaResult<Vec<u8>> {
    let img = image::load_from_memory(data)
        .map_err(|e| MediaError::Internal(format!("Stored bytes failed to decode: {}", e)))?;

    let mut out = Cursor::new(Vec::new());
    match target {
        "jpg" | "jpeg" => {
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut out, ImageFormat::Jpeg)
                .map_err(|e| MediaError::Internal(format!("JPEG encode failed: {}", e)))?;
        }
        "png" => {
            img.write_to(&mut out, ImageFormat::Png)
                .map_err(|e| MediaError::Internal(format!("PNG encode failed: {}", e)))?;
        }
        other => {
            return Err(MediaError::Validation(format!(
                "No conversion from webp to {}",
                other
            )));
        }
    }

    Ok(out.into_inner())
}

fn apply_fit(img: DynamicImage, size: &TargetSize, fit: Fit) -> DynamicImage {
    match fit {
        Fit::Fill => img.resize_exact(size.width, size.height, FilterType::Lanczos3),
        Fit::Contain => img.resize(size.width, size.height, FilterType::Lanczos3),
        Fit::Cover => img.resize_to_fill(size.width, size.height, FilterType::Lanczos3),
    }
}

fn encode_webp(data: &[u8], options: &TranscodeOptions, quality: u8) -> MediaResult<Transcoded> {
    let img = image::load_from_memory(data)
        .map_err(|e| MediaError::UnsupportedFormat(format!("Image decode failed: {}", e)))?;

    let img = match &options.size {
        Some(size) => apply_fit(img, size, options.fit),
        None => img,
    };

    let width = img.width();
    let height = img.height();

    // The webp encoder only accepts RGB8/RGBA8 layouts
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba)
        .map_err(|e| MediaError::Internal(format!("WebP encoder rejected image: {}", e)))?;
    let bytes = encoder.encode(quality as f32).to_vec();

    Ok(Transcoded {
        bytes,
        format: "webp".to_string(),
        width: Some(width),
        height: Some(height),
    })
}

fn recode_gif(data: &[u8], options: &TranscodeOptions) -> MediaResult<Transcoded> {
    let decoder = GifDecoder::new(Cursor::new(data))
        .map_err(|e| MediaError::UnsupportedFormat(format!("GIF decode failed: {}", e)))?;
    let (src_width, src_height) = decoder.dimensions();

    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| MediaError::UnsupportedFormat(format!("GIF frame decode failed: {}", e)))?;

    let (width, height) = match &options.size {
        Some(size) => gif_canvas(src_width, src_height, size, options.fit),
        None => (src_width, src_height),
    };
    let scale_x = f64::from(width) / f64::from(src_width);
    let scale_y = f64::from(height) / f64::from(src_height);

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| MediaError::Internal(format!("GIF encode failed: {}", e)))?;

        for frame in frames {
            let frame = match &options.size {
                Some(_) => {
                    let buffer = frame.buffer();
                    let frame_width = scaled_dim(buffer.width(), scale_x);
                    let frame_height = scaled_dim(buffer.height(), scale_y);
                    let resized = image::imageops::resize(
                        buffer,
                        frame_width,
                        frame_height,
                        FilterType::Lanczos3,
                    );
                    // Partial frames keep their canvas position, scaled
                    // and clamped to the new canvas
                    let left = scaled_offset(frame.left(), scale_x)
                        .min(width.saturating_sub(frame_width));
                    let top = scaled_offset(frame.top(), scale_y)
                        .min(height.saturating_sub(frame_height));
                    Frame::from_parts(resized, left, top, frame.delay())
                }
                None => frame,
            };
            encoder
                .encode_frame(frame)
                .map_err(|e| MediaError::Internal(format!("GIF encode failed: {}", e)))?;
        }
    }

    Ok(Transcoded {
        bytes,
        format: "gif".to_string(),
        width: Some(width),
        height: Some(height),
    })
}

/// Canvas dimensions for a resized animation. `Contain` and `Cover` scale
/// uniformly (shrinking to fit or growing to cover the target); animations
/// are never cropped.
fn gif_canvas(src_width: u32, src_height: u32, size: &TargetSize, fit: Fit) -> (u32, u32) {
    let ratio_x = f64::from(size.width) / f64::from(src_width);
    let ratio_y = f64::from(size.height) / f64::from(src_height);

    let (scale_x, scale_y) = match fit {
        Fit::Fill => (ratio_x, ratio_y),
        Fit::Contain => {
            let scale = ratio_x.min(ratio_y);
            (scale, scale)
        }
        Fit::Cover => {
            let scale = ratio_x.max(ratio_y);
            (scale, scale)
        }
    };

    (scaled_dim(src_width, scale_x), scaled_dim(src_height, scale_y))
}

fn scaled_dim(value: u32, scale: f64) -> u32 {
    ((f64::from(value) * scale).round() as u32).max(1)
}

fn scaled_offset(value: u32, scale: f64) -> u32 {
    (f64::from(value) * scale).round() as u32
}

/// Safe structural SVG optimization.
///
/// Drops comments, doctype, processing instructions, `<metadata>` subtrees
/// and `id` attributes, and normalizes attribute order. With a target size
/// the intrinsic width/height of the root element are replaced by explicit
/// ones.
fn optimize_svg(data: &[u8], options: &TranscodeOptions) -> MediaResult<Transcoded> {
    let text = std::str::from_utf8(data)
        .map_err(|_| MediaError::UnsupportedFormat("SVG is not valid UTF-8".to_string()))?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut skip_depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| MediaError::UnsupportedFormat(format!("Invalid SVG: {}", e)))?;

        match event {
            Event::Eof => break,
            Event::Comment(_) | Event::DocType(_) | Event::Decl(_) | Event::PI(_) => {}
            Event::Start(e) => {
                if skip_depth > 0 || e.local_name().as_ref() == b"metadata" {
                    skip_depth += 1;
                    continue;
                }
                let is_root = !seen_root;
                seen_root = true;
                let rebuilt = rebuild_element(&e, is_root, options.size.as_ref());
                writer
                    .write_event(Event::Start(rebuilt))
                    .map_err(|e| MediaError::Internal(format!("SVG write failed: {}", e)))?;
            }
            Event::Empty(e) => {
                if skip_depth > 0 || e.local_name().as_ref() == b"metadata" {
                    continue;
                }
                // A self-closing <svg .../> is a valid root
                let is_root = !seen_root;
                seen_root = true;
                let rebuilt = rebuild_element(&e, is_root, options.size.as_ref());
                writer
                    .write_event(Event::Empty(rebuilt))
                    .map_err(|e| MediaError::Internal(format!("SVG write failed: {}", e)))?;
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(|e| MediaError::Internal(format!("SVG write failed: {}", e)))?;
            }
            other => {
                if skip_depth > 0 {
                    continue;
                }
                writer
                    .write_event(other)
                    .map_err(|e| MediaError::Internal(format!("SVG write failed: {}", e)))?;
            }
        }
    }

    if !seen_root {
        return Err(MediaError::UnsupportedFormat(
            "SVG without a root element".to_string(),
        ));
    }

    let bytes = writer.into_inner().into_inner();
    let (width, height) = match &options.size {
        Some(size) => (Some(size.width), Some(size.height)),
        None => (None, None),
    };

    Ok(Transcoded {
        bytes,
        format: "svg".to_string(),
        width,
        height,
    })
}

fn rebuild_element(
    element: &BytesStart<'_>,
    is_root: bool,
    size: Option<&TargetSize>,
) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let strip_dims = is_root && size.is_some();

    let mut attrs: Vec<(String, String)> = element
        .attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&a.value).into_owned(),
            )
        })
        .filter(|(key, _)| key != "id")
        .filter(|(key, _)| !strip_dims || (key != "width" && key != "height"))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut rebuilt = BytesStart::new(name);
    for (key, value) in &attrs {
        rebuilt.push_attribute((key.as_str(), value.as_str()));
    }
    if is_root {
        if let Some(size) = size {
            rebuilt.push_attribute(("width", size.width.to_string().as_str()));
            rebuilt.push_attribute(("height", size.height.to_string().as_str()));
        }
    }
    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn gif_fixture(frames: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            for i in 0..frames {
                let buffer = image::RgbaImage::from_pixel(
                    16,
                    16,
                    image::Rgba([(i * 40) as u8, 0, 0, 255]),
                );
                encoder.encode_frame(Frame::new(buffer)).unwrap();
            }
        }
        bytes
    }

    #[test]
    fn test_detects_formats_from_signature() {
        assert_eq!(detect(&png_fixture(2, 2)), Some(DetectedFormat::Png));
        assert_eq!(detect(&gif_fixture(1)), Some(DetectedFormat::Gif));
        assert_eq!(
            detect(b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>"),
            Some(DetectedFormat::Svg)
        );
        assert_eq!(detect(b"plain text, not an image"), None);
    }

    #[test]
    fn test_png_becomes_webp_with_dimensions() {
        let result = transcode(&png_fixture(8, 6), &TranscodeOptions::default()).unwrap();
        assert_eq!(result.format, "webp");
        assert_eq!(result.width, Some(8));
        assert_eq!(result.height, Some(6));
        assert_eq!(detect(&result.bytes), Some(DetectedFormat::Webp));
    }

    #[test]
    fn test_transcode_is_deterministic() {
        let data = png_fixture(10, 10);
        let first = transcode(&data, &TranscodeOptions::default()).unwrap();
        let second = transcode(&data, &TranscodeOptions::default()).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn test_resize_fill() {
        let result = transcode(&png_fixture(20, 10), &TranscodeOptions::sized(8, 8)).unwrap();
        assert_eq!(result.width, Some(8));
        assert_eq!(result.height, Some(8));
    }

    #[test]
    fn test_preview_differs_from_primary() {
        let data = png_fixture(32, 32);
        let primary = transcode(&data, &TranscodeOptions::default()).unwrap();
        let preview = transcode(&data, &TranscodeOptions::preview()).unwrap();
        assert!(preview.bytes.len() <= primary.bytes.len());
    }

    #[test]
    fn test_gif_preserves_frame_count() {
        let result = transcode(&gif_fixture(3), &TranscodeOptions::default()).unwrap();
        assert_eq!(result.format, "gif");

        let decoder = GifDecoder::new(Cursor::new(result.bytes.as_slice())).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_gif_resize() {
        let result = transcode(&gif_fixture(2), &TranscodeOptions::sized(8, 8)).unwrap();
        assert_eq!(result.width, Some(8));
        assert_eq!(result.height, Some(8));
    }

    #[test]
    fn test_gif_resize_honors_fit_policy() {
        // 16x16 source into an 8x4 target
        let contain = TranscodeOptions {
            size: Some(TargetSize {
                width: 8,
                height: 4,
            }),
            fit: Fit::Contain,
            ..Default::default()
        };
        let result = transcode(&gif_fixture(2), &contain).unwrap();
        assert_eq!(result.width, Some(4));
        assert_eq!(result.height, Some(4));

        let decoder = GifDecoder::new(Cursor::new(result.bytes.as_slice())).unwrap();
        assert_eq!(decoder.dimensions(), (4, 4));

        let cover = TranscodeOptions {
            size: Some(TargetSize {
                width: 8,
                height: 4,
            }),
            fit: Fit::Cover,
            ..Default::default()
        };
        let result = transcode(&gif_fixture(2), &cover).unwrap();
        assert_eq!(result.width, Some(8));
        assert_eq!(result.height, Some(8));
    }

    #[test]
    fn test_svg_optimization_strips_noise() {
        let svg = br#"<?xml version="1.0"?>
<!-- a comment -->
<svg xmlns="http://www.w3.org/2000/svg" id="icon" viewBox="0 0 24 24">
  <metadata><something>junk</something></metadata>
  <path id="p1" d="M0 0h24v24H0z"/>
</svg>"#;
        let result = transcode(svg, &TranscodeOptions::default()).unwrap();
        assert_eq!(result.format, "svg");
        assert_eq!(result.width, None);
        assert_eq!(result.height, None);

        let text = String::from_utf8(result.bytes).unwrap();
        assert!(!text.contains("comment"));
        assert!(!text.contains("metadata"));
        assert!(!text.contains("id="));
        assert!(text.contains("viewBox=\"0 0 24 24\""));
    }

    #[test]
    fn test_svg_size_injection() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50"><path d="M0 0"/></svg>"#;
        let result = transcode(svg, &TranscodeOptions::sized(24, 24)).unwrap();
        let text = String::from_utf8(result.bytes).unwrap();
        assert!(text.contains("width=\"24\""));
        assert!(text.contains("height=\"24\""));
        assert!(!text.contains("width=\"100\""));
        assert_eq!(result.width, Some(24));
    }

    #[test]
    fn test_self_closing_svg_root() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#;
        let result = transcode(svg, &TranscodeOptions::default()).unwrap();
        assert_eq!(result.format, "svg");

        let sized = transcode(svg, &TranscodeOptions::sized(24, 24)).unwrap();
        let text = String::from_utf8(sized.bytes).unwrap();
        assert!(text.contains("width=\"24\""));
        assert!(text.contains("height=\"24\""));
        assert!(!text.contains("width=\"10\""));
        assert_eq!(sized.width, Some(24));
    }

    #[test]
    fn test_unsupported_input_rejected() {
        let result = transcode(b"not an image at all", &TranscodeOptions::default());
        assert!(matches!(result, Err(MediaError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_invalid_quality_rejected() {
        let options = TranscodeOptions {
            quality: Some(0),
            ..Default::default()
        };
        let result = transcode(&png_fixture(2, 2), &options);
        assert!(matches!(result, Err(MediaError::Validation(_))));
    }

    #[test]
    fn test_invalid_size_rejected() {
        let result = transcode(&png_fixture(2, 2), &TranscodeOptions::sized(0, 10));
        assert!(matches!(result, Err(MediaError::Validation(_))));
    }

    #[test]
    fn test_convert_webp_to_jpg_and_png() {
        let canonical = transcode(&png_fixture(12, 9), &TranscodeOptions::default()).unwrap();

        let jpg = convert_from_webp(&canonical.bytes, "jpg").unwrap();
        let decoded = image::load_from_memory(&jpg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 9));
        assert_ne!(jpg, canonical.bytes);

        let png = convert_from_webp(&canonical.bytes, "png").unwrap();
        assert_eq!(detect(&png), Some(DetectedFormat::Png));
    }

    #[test]
    fn test_convert_rejects_unknown_target() {
        let canonical = transcode(&png_fixture(4, 4), &TranscodeOptions::default()).unwrap();
        let result = convert_from_webp(&canonical.bytes, "bmp");
        assert!(matches!(result, Err(MediaError::Validation(_))));
    }
}
