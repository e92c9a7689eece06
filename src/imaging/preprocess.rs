//! Photo decoding and preparation of the grayscale canvas.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageReader};
use tracing::debug;

use super::CanvasSize;

/// Share of darkest/brightest pixels ignored when stretching contrast.
const CLIP_FRACTION: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Source image is empty")]
    Empty,

    #[error("Failed to read image data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unrecognized or malformed image data: {0}")]
    Malformed(#[from] image::ImageError),
}

/// Decode photo bytes into a grayscale canvas of exactly `size`.
///
/// The photo is scaled to cover the whole canvas with overflow cropped
/// evenly from both sides, converted to luma, and contrast-stretched.
pub fn prepare(bytes: &[u8], size: CanvasSize) -> Result<GrayImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let photo = decode(bytes)?;
    debug!(
        source_width = photo.width(),
        source_height = photo.height(),
        width = size.width,
        height = size.height,
        "Preparing grayscale canvas"
    );

    let gray = photo
        .resize_to_fill(size.width, size.height, FilterType::Lanczos3)
        .to_luma8();

    Ok(normalize(gray))
}

/// Decode and apply the EXIF orientation phones attach to selfies.
fn decode(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut photo = DynamicImage::from_decoder(decoder)?;
    photo.apply_orientation(orientation);
    Ok(photo)
}

/// Stretch the observed intensity range to span [0, 255].
///
/// The darkest and brightest 1% of pixels are clipped so a few specular
/// highlights do not flatten the stretch. A flat canvas is returned as is.
pub fn normalize(mut canvas: GrayImage) -> GrayImage {
    let total = canvas.len();
    if total == 0 {
        return canvas;
    }

    let mut histogram = [0usize; 256];
    for &v in canvas.iter() {
        histogram[v as usize] += 1;
    }

    let clip = (total as f64 * CLIP_FRACTION).floor() as usize;
    let low = percentile_from_bottom(&histogram, clip);
    let high = percentile_from_top(&histogram, clip);
    if high <= low {
        return canvas;
    }

    let span = f32::from(high - low);
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        let stretched = (v as f32 - f32::from(low)) * 255.0 / span;
        *slot = stretched.round().clamp(0.0, 255.0) as u8;
    }

    for v in canvas.iter_mut() {
        *v = lut[*v as usize];
    }
    canvas
}

/// Smallest intensity with more than `skip` pixels at or below it.
fn percentile_from_bottom(histogram: &[usize; 256], skip: usize) -> u8 {
    let mut seen = 0;
    for (v, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > skip {
            return v as u8;
        }
    }
    u8::MAX
}

/// Largest intensity with more than `skip` pixels at or above it.
fn percentile_from_top(histogram: &[usize; 256], skip: usize) -> u8 {
    let mut seen = 0;
    for (v, &count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > skip {
            return v as u8;
        }
    }
    0
}
