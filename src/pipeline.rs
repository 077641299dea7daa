//! Pipeline Adapter — the thin shim between an `Operation` and the
//! third-party `image`/`webp` codec libraries. Decodes once, applies one
//! operation, encodes once; cross-operation chaining is forbidden by
//! construction (every call gets a fresh `&[u8]` source, never a previous
//! adapter's intermediate buffer).

use image::{imageops::FilterType, DynamicImage, ImageFormat};

use crate::error::{AppError, AppResult};
use crate::operation::{OpParams, Operation};

/// Quality used when a non-COMPRESS operation happens to re-encode a JPEG
/// source (rotate/flip/resize on a JPEG still needs *some* JPEG quality).
/// COMPRESS supplies its own quality and ignores this constant.
const JPEG_PRESERVE_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mime {
    Jpeg,
    Png,
}

impl Mime {
    pub fn as_str(self) -> &'static str {
        match self {
            Mime::Jpeg => "image/jpeg",
            Mime::Png => "image/png",
        }
    }

    pub fn ext(self) -> &'static str {
        match self {
            Mime::Jpeg => "jpg",
            Mime::Png => "png",
        }
    }

    pub fn from_str(s: &str) -> Option<Mime> {
        match s {
            "image/jpeg" | "image/jpg" => Some(Mime::Jpeg),
            "image/png" => Some(Mime::Png),
            _ => None,
        }
    }

    fn from_image_format(fmt: ImageFormat) -> Option<Mime> {
        match fmt {
            ImageFormat::Jpeg => Some(Mime::Jpeg),
            ImageFormat::Png => Some(Mime::Png),
            _ => None,
        }
    }
}

pub struct Output {
    pub bytes: Vec<u8>,
    pub mime: Mime,
}

/// Decodes `src_bytes`, applies `op`, and re-encodes. The output mime is
/// JPEG for COMPRESS regardless of source, and the source mime otherwise.
pub fn apply(op: &Operation, src_bytes: &[u8]) -> AppResult<Output> {
    let format = image::guess_format(src_bytes)
        .map_err(|e| AppError::CodecError(format!("unrecognized image format: {e}")))?;
    let source_mime = Mime::from_image_format(format)
        .ok_or_else(|| AppError::CodecError(format!("unsupported source format {format:?}")))?;

    let img = image::load_from_memory_with_format(src_bytes, format)
        .map_err(|e| AppError::CodecError(format!("failed to decode source image: {e}")))?;

    match op.0 {
        OpParams::Rotate { degrees } => {
            let rotated = match degrees {
                90 => img.rotate90(),
                180 => img.rotate180(),
                270 => img.rotate270(),
                other => {
                    return Err(AppError::ValidationError(format!(
                        "unsupported rotation {other}"
                    )))
                }
            };
            encode(&rotated, source_mime)
        }
        OpParams::Flip {
            horizontal,
            vertical,
        } => {
            // Applied as two independent flips (never a 180 rotation) so the
            // "both" case is bit-identical to flip_h then flip_v in sequence.
            let mut out = img;
            if horizontal {
                out = out.fliph();
            }
            if vertical {
                out = out.flipv();
            }
            encode(&out, source_mime)
        }
        OpParams::Resize { width, height } => {
            let (target_w, target_h) =
                fit_inside_dims(img.width(), img.height(), width, height);
            let resized = img.resize(target_w, target_h, FilterType::Lanczos3);
            encode(&resized, source_mime)
        }
        OpParams::Compress { quality } => {
            // "quality" is only meaningful for a lossy codec, so COMPRESS
            // always transcodes to JPEG — including PNG sources.
            let mut bytes = Vec::new();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
            encoder
                .encode_image(&img)
                .map_err(|e| AppError::CodecError(format!("jpeg encode failed: {e}")))?;
            Ok(Output {
                bytes,
                mime: Mime::Jpeg,
            })
        }
    }
}

/// Computes the fit-inside target dimensions for RESIZE. When both bounds
/// are given, scales to fit within both while preserving aspect ratio. When
/// only one is given, scales by that dimension alone.
fn fit_inside_dims(
    orig_w: u32,
    orig_h: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = ((orig_h as u64 * w as u64) / orig_w as u64).max(1) as u32;
            (w, h)
        }
        (None, Some(h)) => {
            let w = ((orig_w as u64 * h as u64) / orig_h as u64).max(1) as u32;
            (w, h)
        }
        (None, None) => (orig_w, orig_h),
    }
}

fn encode(img: &DynamicImage, mime: Mime) -> AppResult<Output> {
    let mut bytes = Vec::new();
    match mime {
        Mime::Jpeg => {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_PRESERVE_QUALITY);
            encoder
                .encode_image(img)
                .map_err(|e| AppError::CodecError(format!("jpeg encode failed: {e}")))?;
        }
        Mime::Png => {
            img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
                .map_err(|e| AppError::CodecError(format!("png encode failed: {e}")))?;
        }
    }
    Ok(Output { bytes, mime })
}

/// Produces a WebP thumbnail fit inside `max_w` x `max_h` at the given
/// quality, used by the Image Service's `derive_thumbnail`. Lives alongside
/// the rest of the adapter since it is the same decode-apply-encode shape,
/// just with a fixed "operation" (resize + webp encode) instead of a
/// client-supplied one.
pub fn derive_thumbnail(src_bytes: &[u8], max_w: u32, max_h: u32, quality: f32) -> AppResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| AppError::CodecError(format!("failed to decode source image: {e}")))?;
    let resized = img.resize(max_w, max_h, FilterType::Lanczos3);
    let rgba = resized.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    Ok(encoder.encode(quality).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_inside_scales_missing_dimension_by_aspect_ratio() {
        assert_eq!(fit_inside_dims(100, 200, Some(200), None), (200, 400));
        assert_eq!(fit_inside_dims(200, 100, None, Some(50)), (100, 50));
        assert_eq!(fit_inside_dims(100, 200, Some(200), Some(100)), (200, 100));
    }

    #[test]
    fn mime_ext_round_trips() {
        assert_eq!(Mime::from_str("image/png").unwrap().ext(), "png");
        assert_eq!(Mime::from_str("image/jpeg").unwrap().ext(), "jpg");
        assert!(Mime::from_str("image/gif").is_none());
    }
}
