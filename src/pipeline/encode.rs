//! Image encoding: raw bytes → bounded-size base64 JPEG payload.
//!
//! The remote API takes the image inline in the JSON request body, so the
//! payload size is bounded here, before any network call: decode, downscale
//! to a maximum dimension, re-encode as JPEG at modest quality, base64. A
//! phone photo of a receipt shrinks from several megabytes to a few hundred
//! kilobytes without hurting OCR accuracy.
//!
//! Encoding failures (unreadable file, unsupported format) are terminal for
//! the item and never reach the extractor's retry loop — retrying a local
//! decode error cannot help.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// A transmittable extraction payload: base64 of a resized JPEG.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub base64: String,
}

/// Encode raw image bytes into a bounded-size payload.
///
/// Downscales so the longest side is at most `max_dimension` pixels,
/// preserving aspect ratio; images already within bounds are only
/// re-encoded. JPEG over lossless: the vision model tolerates mild
/// compression artefacts, and request bodies must stay small.
pub fn encode_image(
    bytes: &[u8],
    max_dimension: u32,
    jpeg_quality: u8,
) -> Result<EncodedImage, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (w, h) = (img.width(), img.height());

    let img = if w > max_dimension || h > max_dimension {
        let resized = img.resize(max_dimension, max_dimension, FilterType::Triangle);
        debug!(
            "Resized image {}x{} → {}x{}",
            w,
            h,
            resized.width(),
            resized.height()
        );
        resized
    } else {
        img
    };

    // JPEG has no alpha channel; flatten before encoding.
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
    img.write_with_encoder(encoder)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(EncodedImage { base64: b64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([200, 40, 40, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    fn decode_payload(payload: &EncodedImage) -> DynamicImage {
        let jpeg = STANDARD.decode(&payload.base64).expect("valid base64");
        image::load_from_memory(&jpeg).expect("valid jpeg")
    }

    #[test]
    fn small_image_is_not_resized() {
        let payload = encode_image(&png_bytes(10, 10), 1920, 60).expect("encode");
        let round = decode_payload(&payload);
        assert_eq!((round.width(), round.height()), (10, 10));
    }

    #[test]
    fn oversized_image_is_scaled_to_max_dimension() {
        let payload = encode_image(&png_bytes(64, 32), 16, 60).expect("encode");
        let round = decode_payload(&payload);
        assert_eq!(round.width(), 16, "longest side capped");
        assert_eq!(round.height(), 8, "aspect ratio preserved");
    }

    #[test]
    fn garbage_bytes_fail_to_encode() {
        assert!(encode_image(b"definitely not an image", 1920, 60).is_err());
    }
}
