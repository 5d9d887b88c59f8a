use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{
    codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder},
    imageops::{self, FilterType},
    DynamicImage, ImageReader, Rgb, RgbImage,
};
use std::io::Cursor;

pub const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Longest diagnostic kept in a failure reason.
const MAX_DIAGNOSTIC: usize = 80;

/// Why a record ended up without a thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("http error: {0}")]
    Http(String),
    #[error("request timed out")]
    Timeout,
}

impl FailureReason {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(short(err))
    }

    pub fn http(err: impl std::fmt::Display) -> Self {
        Self::Http(short(err))
    }

    /// Stable taxonomy name, used as a counter key in the index stats.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::TooLarge { .. } => "too_large",
            Self::Http(_) => "http_error",
            Self::Timeout => "timeout",
        }
    }
}

fn short(err: impl std::fmt::Display) -> String {
    let msg = err.to_string();
    match msg.char_indices().nth(MAX_DIAGNOSTIC) {
        Some((idx, _)) => format!("{}...", &msg[..idx]),
        None => msg,
    }
}

/// A flattened, bounded PNG preview ready to embed in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailNormalizer {
    max_width: u32,
    max_height: u32,
}

impl ThumbnailNormalizer {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self { max_width: max_width.max(1), max_height: max_height.max(1) }
    }

    /// Decode -> flatten onto white -> shrink into the bounding box -> PNG -> data URI.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Thumbnail, FailureReason> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(FailureReason::decode)?
            .decode()
            .map_err(FailureReason::decode)?;

        let flat = flatten_onto_white(&img);
        let (nw, nh) = fit_within(flat.width(), flat.height(), self.max_width, self.max_height);
        let resized = if (nw, nh) == flat.dimensions() {
            flat
        } else {
            imageops::resize(&flat, nw, nh, FilterType::Lanczos3)
        };

        let mut png = Vec::new();
        let encoder = PngEncoder::new_with_quality(&mut png, CompressionType::Best, PngFilter::Adaptive);
        DynamicImage::ImageRgb8(resized)
            .write_with_encoder(encoder)
            .map_err(FailureReason::decode)?;

        Ok(Thumbnail {
            data_uri: format!("{DATA_URI_PREFIX}{}", STANDARD.encode(&png)),
            width: nw,
            height: nh,
        })
    }
}

/// Composite anything with an alpha channel over opaque white; everything
/// else is just widened/narrowed to RGB8.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut canvas = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        canvas.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    canvas
}

/// Largest size with the same aspect ratio that fits the box. Never enlarges.
pub fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w <= max_w && h <= max_h {
        return (w, h);
    }
    let ratio = f64::min(max_w as f64 / w as f64, max_h as f64 / h as f64);
    let nw = ((w as f64 * ratio).round() as u32).clamp(1, max_w);
    let nh = ((h as f64 * ratio).round() as u32).clamp(1, max_h);
    (nw, nh)
}

/// Bytes of an embedded `Image` field; accepts a bare payload or a full data URI.
pub fn decode_embedded(text: &str) -> Result<Vec<u8>, FailureReason> {
    let payload = match text.split_once("base64,") {
        Some((_, rest)) => rest,
        None => text,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(FailureReason::decode)
}

/// Inverse of the wrapping done by `normalize`.
#[cfg(test)]
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FailureReason> {
    let payload = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| FailureReason::Decode("not a png data uri".into()))?;
    STANDARD.decode(payload).map_err(FailureReason::decode)
}
