use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageBuffer, ImageEncoder};
use img_parts::{Bytes, ImageEXIF};

pub const JPEG_MIME: &str = "image/jpeg";
const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("image encode failed: {0}")]
    Encode(String),
    #[error("not a base64 data url")]
    DataUrl,
    #[error("invalid image dimensions")]
    Dimensions,
}

/// Thresholds for the upload stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeConfig {
    /// Files up to this many bytes are embedded as-is.
    pub direct_max_bytes: usize,
    pub max_width: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            direct_max_bytes: 768 * 1024,
            max_width: 800,
            jpeg_quality: 70,
        }
    }
}

/// Thresholds for the pre-save stage. Upstream cells hold about 50k chars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageConfig {
    pub max_chars: usize,
    pub max_width: u32,
    pub jpeg_quality: u8,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_chars: 40_000,
            max_width: 300,
            jpeg_quality: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Original bytes, wrapped unchanged.
    Direct,
    /// Decoded, scaled and re-encoded as JPEG.
    Reencoded,
    /// Re-encoding failed; original bytes wrapped unchanged.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub data_url: String,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePayload {
    pub data_url: String,
    pub strategy: Strategy,
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    let mime = if mime.trim().is_empty() {
        "application/octet-stream"
    } else {
        mime.trim()
    };
    format!("{DATA_URL_PREFIX}{mime}{BASE64_MARKER}{}", STANDARD.encode(bytes))
}

/// Splits a base64 data URL into its MIME type and decoded bytes.
pub fn parse_data_url(data_url: &str) -> Result<(String, Vec<u8>), PipelineError> {
    let rest = data_url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or(PipelineError::DataUrl)?;
    let (mime, payload) = rest.split_once(BASE64_MARKER).ok_or(PipelineError::DataUrl)?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| PipelineError::DataUrl)?;
    Ok((mime.to_string(), bytes))
}

/// Turns an uploaded file into an embeddable data URL. Never fails; anything
/// that cannot be re-encoded is embedded as uploaded.
pub fn normalize_upload(bytes: &[u8], mime: &str, config: &NormalizeConfig) -> NormalizedImage {
    if bytes.len() <= config.direct_max_bytes {
        return NormalizedImage {
            data_url: encode_data_url(mime, bytes),
            strategy: Strategy::Direct,
        };
    }
    match reencode_jpeg(bytes, config.max_width, config.jpeg_quality) {
        Ok(jpeg) => NormalizedImage {
            data_url: encode_data_url(JPEG_MIME, &jpeg),
            strategy: Strategy::Reencoded,
        },
        Err(_) => NormalizedImage {
            data_url: encode_data_url(mime, bytes),
            strategy: Strategy::Fallback,
        },
    }
}

/// Shrinks an already-normalised data URL so it fits one storage cell.
pub fn compress_for_storage(data_url: &str, config: &StorageConfig) -> StoragePayload {
    if data_url.chars().count() <= config.max_chars {
        return StoragePayload {
            data_url: data_url.to_string(),
            strategy: Strategy::Direct,
        };
    }
    let compressed = parse_data_url(data_url)
        .and_then(|(_, bytes)| reencode_jpeg(&bytes, config.max_width, config.jpeg_quality));
    match compressed {
        Ok(jpeg) => StoragePayload {
            data_url: encode_data_url(JPEG_MIME, &jpeg),
            strategy: Strategy::Reencoded,
        },
        Err(_) => StoragePayload {
            data_url: data_url.to_string(),
            strategy: Strategy::Fallback,
        },
    }
}

/// Decodes with EXIF orientation applied, as a browser bitmap decode does.
pub fn decode_oriented(bytes: &[u8]) -> Result<image::RgbaImage, PipelineError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|err| PipelineError::Decode(err.to_string()))?;
    let rgba = decoded.to_rgba8();
    Ok(apply_exif_orientation(rgba, extract_exif_orientation(bytes)))
}

pub fn reencode_jpeg(bytes: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let oriented = decode_oriented(bytes)?;
    let scaled = resize_to_max_width(oriented, max_width);
    let rgb = rgba8_to_rgb8(scaled)?;
    let (width, height) = rgb.dimensions();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|err| PipelineError::Encode(err.to_string()))?;
    Ok(out.into_inner())
}

pub fn extract_exif(bytes: &[u8]) -> Option<Vec<u8>> {
    let data = Bytes::copy_from_slice(bytes);

    if let Ok(jpeg) = img_parts::jpeg::Jpeg::from_bytes(data.clone()) {
        if let Some(exif) = jpeg.exif() {
            return Some(exif.as_ref().to_vec());
        }
    }
    if let Ok(png) = img_parts::png::Png::from_bytes(data.clone()) {
        if let Some(exif) = png.exif() {
            return Some(exif.as_ref().to_vec());
        }
    }
    if let Ok(webp) = img_parts::webp::WebP::from_bytes(data) {
        if let Some(exif) = webp.exif() {
            return Some(exif.as_ref().to_vec());
        }
    }
    None
}

pub fn extract_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = extract_exif(bytes)?;
    parse_exif_orientation(&exif)
}

#[derive(Clone, Copy)]
enum ExifEndian {
    Little,
    Big,
}

fn parse_exif_orientation(exif: &[u8]) -> Option<u16> {
    let data = if exif.starts_with(b"Exif\0\0") {
        exif.get(6..)?
    } else {
        exif
    };
    if data.len() < 8 {
        return None;
    }
    let endian = match &data[..2] {
        b"II" => ExifEndian::Little,
        b"MM" => ExifEndian::Big,
        _ => return None,
    };
    if read_exif_u16(data, 2, endian)? != 42 {
        return None;
    }
    let ifd_offset = read_exif_u32(data, 4, endian)? as usize;
    let entries = read_exif_u16(data, ifd_offset, endian)? as usize;
    (0..entries)
        .map(|index| ifd_offset + 2 + index * 12)
        .take_while(|offset| offset + 12 <= data.len())
        .find(|offset| read_exif_u16(data, *offset, endian) == Some(0x0112))
        .and_then(|offset| {
            // SHORT, stored inline in the first two value bytes.
            if read_exif_u16(data, offset + 2, endian)? != 3 {
                return None;
            }
            read_exif_u16(data, offset + 8, endian).filter(|value| (1..=8).contains(value))
        })
}

fn read_exif_u16(data: &[u8], offset: usize, endian: ExifEndian) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(match endian {
        ExifEndian::Little => u16::from_le_bytes([bytes[0], bytes[1]]),
        ExifEndian::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
    })
}

fn read_exif_u32(data: &[u8], offset: usize, endian: ExifEndian) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(match endian {
        ExifEndian::Little => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        ExifEndian::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    })
}

/// Scales down proportionally so the width fits; never upscales.
fn resize_to_max_width(rgba: image::RgbaImage, max_width: u32) -> image::RgbaImage {
    let (width, height) = rgba.dimensions();
    if max_width == 0 || width <= max_width {
        return rgba;
    }
    let scale = max_width as f32 / width as f32;
    let next_height = ((height as f32) * scale).round().max(1.0) as u32;
    image::imageops::resize(&rgba, max_width, next_height, FilterType::Triangle)
}

fn apply_exif_orientation<P>(
    image: ImageBuffer<P, Vec<P::Subpixel>>,
    orientation: Option<u16>,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: image::Pixel + 'static,
    P::Subpixel: 'static,
{
    match orientation {
        Some(2) => image::imageops::flip_horizontal(&image),
        Some(3) => image::imageops::rotate180(&image),
        Some(4) => image::imageops::flip_vertical(&image),
        Some(5) => {
            let flipped = image::imageops::flip_horizontal(&image);
            image::imageops::rotate270(&flipped)
        }
        Some(6) => image::imageops::rotate90(&image),
        Some(7) => {
            let flipped = image::imageops::flip_horizontal(&image);
            image::imageops::rotate90(&flipped)
        }
        Some(8) => image::imageops::rotate270(&image),
        _ => image,
    }
}

/// JPEG has no alpha; transparent areas end up black like a canvas export.
fn rgba8_to_rgb8(image: image::RgbaImage) -> Result<image::RgbImage, PipelineError> {
    let (width, height) = image.dimensions();
    let mut out = Vec::with_capacity((width as usize) * (height as usize) * 3);
    for chunk in image.into_raw().chunks_exact(4) {
        let alpha = u16::from(chunk[3]);
        out.extend(chunk[..3].iter().map(|c| ((u16::from(*c) * alpha + 127) / 255) as u8));
    }
    image::RgbImage::from_raw(width, height, out).ok_or(PipelineError::Dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic noise so encoded sizes stay large.
    fn noise_image(width: u32, height: u32) -> image::RgbImage {
        let mut state = 0x2545_f491_u32;
        image::RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            };
            image::Rgb([next(), next(), next()])
        })
    }

    fn encode_png(image: &image::RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("png");
        out.into_inner()
    }

    fn encode_jpeg(image: &image::RgbImage, quality: u8) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, quality)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .expect("jpeg");
        out.into_inner()
    }

    fn decoded_dimensions(data_url: &str) -> (u32, u32) {
        let (_, bytes) = parse_data_url(data_url).expect("data url");
        let image = image::load_from_memory(&bytes).expect("decode");
        (image.width(), image.height())
    }

    #[test]
    fn small_upload_is_embedded_unchanged() {
        let bytes = vec![7u8; 500 * 1024];
        let normalized = normalize_upload(&bytes, "image/png", &NormalizeConfig::default());
        assert_eq!(normalized.strategy, Strategy::Direct);
        let (mime, decoded) = parse_data_url(&normalized.data_url).expect("data url");
        assert_eq!(mime, "image/png");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn large_upload_is_scaled_to_max_width() {
        let png = encode_png(&noise_image(1200, 900));
        assert!(png.len() > 768 * 1024);
        let normalized = normalize_upload(&png, "image/png", &NormalizeConfig::default());
        assert_eq!(normalized.strategy, Strategy::Reencoded);
        assert!(normalized.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decoded_dimensions(&normalized.data_url), (800, 600));
    }

    #[test]
    fn narrow_large_upload_is_not_upscaled() {
        let png = encode_png(&noise_image(500, 700));
        assert!(png.len() > 768 * 1024);
        let normalized = normalize_upload(&png, "image/png", &NormalizeConfig::default());
        assert_eq!(decoded_dimensions(&normalized.data_url), (500, 700));
    }

    #[test]
    fn undecodable_large_upload_falls_back_to_original() {
        let bytes = vec![1u8; 800 * 1024];
        let normalized = normalize_upload(&bytes, "image/heic", &NormalizeConfig::default());
        assert_eq!(normalized.strategy, Strategy::Fallback);
        assert_eq!(normalized.data_url, encode_data_url("image/heic", &bytes));
    }

    #[test]
    fn oversized_payload_is_recompressed_for_storage() {
        let data_url = encode_data_url(JPEG_MIME, &encode_jpeg(&noise_image(640, 480), 90));
        assert!(data_url.len() > 45_000);
        let payload = compress_for_storage(&data_url, &StorageConfig::default());
        assert_eq!(payload.strategy, Strategy::Reencoded);
        let (width, height) = decoded_dimensions(&payload.data_url);
        assert_eq!(width, 300);
        assert_eq!(height, 225);
    }

    #[test]
    fn payload_under_limit_is_kept() {
        let data_url = format!("data:image/jpeg;base64,{}", "A".repeat(30_000 - 23));
        assert_eq!(data_url.len(), 30_000);
        let payload = compress_for_storage(&data_url, &StorageConfig::default());
        assert_eq!(payload.strategy, Strategy::Direct);
        assert_eq!(payload.data_url, data_url);
    }

    #[test]
    fn broken_oversized_payload_is_returned_as_is() {
        let data_url = format!("data:image/jpeg;base64,{}", "A".repeat(45_000));
        let payload = compress_for_storage(&data_url, &StorageConfig::default());
        assert_eq!(payload.strategy, Strategy::Fallback);
        assert_eq!(payload.data_url, data_url);
    }

    #[test]
    fn exif_orientation_is_applied_on_decode() {
        let jpeg = encode_jpeg(&noise_image(40, 20), 80);
        let tiff: Vec<u8> = [
            b"MM\0\x2a\0\0\0\x08".as_slice(),
            &[0, 1],
            &[0x01, 0x12, 0, 3, 0, 0, 0, 1, 0, 6, 0, 0],
            &[0, 0, 0, 0],
        ]
        .concat();
        let mut parts = img_parts::jpeg::Jpeg::from_bytes(Bytes::from(jpeg)).expect("parts");
        parts.set_exif(Some(Bytes::from(tiff)));
        let tagged = parts.encoder().bytes();

        assert_eq!(extract_exif_orientation(&tagged), Some(6));
        let decoded = decode_oriented(&tagged).expect("decode");
        assert_eq!(decoded.dimensions(), (20, 40));
    }

    #[test]
    fn data_url_parsing_rejects_plain_urls() {
        assert!(parse_data_url("https://example.com/a.png").is_err());
        assert!(parse_data_url("data:image/png,rawtext").is_err());
        assert!(is_image_mime("image/webp"));
        assert!(!is_image_mime("text/plain"));
    }
}
