//! [`Codec`] implementation backed by the `image` crate.

use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame};
use towebp_core::format::{EncodeParams, TargetFormat};

use crate::codec::{Codec, CodecError, Encoded};

/// Maximum preview height in pixels. Smaller images are never upscaled.
pub const THUMBNAIL_MAX_HEIGHT: u32 = 480;

/// JPEG quality used for previews (1-100).
pub const THUMBNAIL_JPEG_QUALITY: u8 = 65;

/// Raster codec using the pure-Rust decoders and encoders of `image`.
///
/// Inputs whose container cannot even be identified (for example SVG) are
/// reported as [`CodecError::UnsupportedInput`] so a pool worker hands them
/// to the fallback path. AVIF output is not compiled in and fails as an
/// encode error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode(&self, input: &[u8]) -> Result<DynamicImage, CodecError> {
        let format = image::guess_format(input)
            .map_err(|e| CodecError::UnsupportedInput(e.to_string()))?;
        image::load_from_memory_with_format(input, format)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}

impl Codec for ImageCodec {
    fn encode(&self, input: &[u8], params: &EncodeParams) -> Result<Encoded, CodecError> {
        let img = self.decode(input)?;
        let mut out = Cursor::new(Vec::new());

        match params.format {
            TargetFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality(params.quality));
                rgb.write_with_encoder(encoder).map_err(encode_error)?;
            }
            TargetFormat::Png => {
                let encoder =
                    PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
                img.write_with_encoder(encoder).map_err(encode_error)?;
            }
            TargetFormat::Webp => {
                // The pure-Rust encoder is lossless only; quality has no effect.
                let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
                let encoder = WebPEncoder::new_lossless(&mut out);
                rgba.write_with_encoder(encoder).map_err(encode_error)?;
            }
            TargetFormat::Gif => {
                // The encoder writes the trailer on drop, so scope it.
                let mut encoder = GifEncoder::new_with_speed(&mut out, params.gif_speed());
                encoder
                    .encode_frame(Frame::new(img.to_rgba8()))
                    .map_err(encode_error)?;
            }
            TargetFormat::Avif => {
                return Err(CodecError::Encode(
                    "AVIF encoding is not available in this build".to_string(),
                ));
            }
        }

        let encoded = Encoded::new(out.into_inner());
        tracing::trace!(
            format = %params.format,
            width = img.width(),
            height = img.height(),
            input_size = input.len(),
            output_size = encoded.size,
            "Image encoded",
        );
        Ok(encoded)
    }

    fn thumbnail(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let img = self.decode(input)?;
        let preview = if img.height() > THUMBNAIL_MAX_HEIGHT {
            let scale = THUMBNAIL_MAX_HEIGHT as f64 / img.height() as f64;
            let width = ((img.width() as f64 * scale).round() as u32).max(1);
            img.resize_exact(width, THUMBNAIL_MAX_HEIGHT, FilterType::Triangle)
        } else {
            img
        };

        let mut out = Cursor::new(Vec::new());
        let rgb = DynamicImage::ImageRgb8(preview.to_rgb8());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(
            &mut out,
            THUMBNAIL_JPEG_QUALITY,
        ))
        .map_err(encode_error)?;
        Ok(out.into_inner())
    }
}

/// Map `0.0..=1.0` to the JPEG encoder's `1..=100`.
fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn encode_error(e: image::ImageError) -> CodecError {
    CodecError::Encode(e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn params(format: TargetFormat) -> EncodeParams {
        EncodeParams::new(format, 0.8).unwrap()
    }

    #[test]
    fn jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn encodes_png_to_each_supported_format() {
        let input = png_bytes(16, 12);
        let codec = ImageCodec::new();
        for (format, expected) in [
            (TargetFormat::Jpeg, ImageFormat::Jpeg),
            (TargetFormat::Png, ImageFormat::Png),
            (TargetFormat::Webp, ImageFormat::WebP),
            (TargetFormat::Gif, ImageFormat::Gif),
        ] {
            let encoded = codec.encode(&input, &params(format)).unwrap();
            assert_eq!(encoded.size, encoded.data.len() as u64);
            assert_eq!(image::guess_format(&encoded.data).unwrap(), expected);
        }
    }

    #[test]
    fn avif_output_is_an_encode_failure() {
        let result = ImageCodec::new().encode(&png_bytes(4, 4), &params(TargetFormat::Avif));
        assert_matches!(result, Err(CodecError::Encode(_)));
    }

    #[test]
    fn unidentifiable_input_is_unsupported() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"/>"#;
        let result = ImageCodec::new().encode(svg, &params(TargetFormat::Webp));
        assert_matches!(result, Err(CodecError::UnsupportedInput(_)));
    }

    #[test]
    fn truncated_input_is_a_decode_failure() {
        let mut input = png_bytes(32, 32);
        input.truncate(40);
        let result = ImageCodec::new().encode(&input, &params(TargetFormat::Jpeg));
        assert_matches!(result, Err(CodecError::Decode(_)));
    }

    #[test]
    fn thumbnail_caps_height_without_upscaling() {
        let codec = ImageCodec::new();

        let tall = codec.thumbnail(&png_bytes(100, 960)).unwrap();
        let tall = image::load_from_memory(&tall).unwrap();
        assert_eq!(tall.height(), THUMBNAIL_MAX_HEIGHT);
        assert_eq!(tall.width(), 50);

        let small = codec.thumbnail(&png_bytes(20, 10)).unwrap();
        let small = image::load_from_memory(&small).unwrap();
        assert_eq!((small.width(), small.height()), (20, 10));
    }
}
