//! Floyd-Steinberg error diffusion to pure black and white.
//!
//! Pixels are visited in raster order. Each one is snapped to 0 or 255 at a
//! hard threshold of 128 and its quantization error is pushed into the four
//! neighbours that have not been visited yet:
//!
//! ```text
//!            (x, y)   7/16
//!   3/16     5/16     1/16
//! ```
//!
//! Running values live in an `f32` buffer so the four fractions add back to
//! the full error; each neighbour is clamped to [0, 255] after every
//! contribution. The result depends only on the input samples.

use image::GrayImage;
use tracing::debug;

/// Values strictly below this become black.
pub const THRESHOLD: f32 = 128.0;

const BLACK: u8 = 0;
const WHITE: u8 = 255;

/// Dither a grayscale canvas in place.
pub fn floyd_steinberg(canvas: &mut GrayImage) {
    let (width, height) = canvas.dimensions();
    debug!(width, height, "Applying Floyd-Steinberg dithering");
    dither_samples(&mut **canvas, width as usize, height as usize);
}

/// Dither a row-major buffer of `width * height` luma samples in place.
///
/// # Panics
///
/// If `samples.len()` is not `width * height`.
pub fn dither_samples(samples: &mut [u8], width: usize, height: usize) {
    assert_eq!(
        samples.len(),
        width * height,
        "canvas buffer does not match {width}x{height}"
    );

    let mut work: Vec<f32> = samples.iter().map(|&v| f32::from(v)).collect();

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let old = work[i];
            let new = if old < THRESHOLD { BLACK } else { WHITE };
            samples[i] = new;

            let error = old - f32::from(new);
            work[i] = f32::from(new);

            // Right: 7/16
            if x + 1 < width {
                diffuse(&mut work, i + 1, error * 7.0 / 16.0);
            }
            if y + 1 < height {
                let below = i + width;
                // Bottom-left: 3/16
                if x > 0 {
                    diffuse(&mut work, below - 1, error * 3.0 / 16.0);
                }
                // Bottom: 5/16
                diffuse(&mut work, below, error * 5.0 / 16.0);
                // Bottom-right: 1/16
                if x + 1 < width {
                    diffuse(&mut work, below + 1, error / 16.0);
                }
            }
        }
    }
}

#[inline]
fn diffuse(work: &mut [f32], index: usize, amount: f32) {
    work[index] = (work[index] + amount).clamp(0.0, 255.0);
}

/// True when every sample is pure black or pure white.
pub fn is_binary(canvas: &GrayImage) -> bool {
    canvas.iter().all(|&v| v == BLACK || v == WHITE)
}
