//! Sticker rasterization for thermal label printers.
//!
//! A customer photo goes through three canvases of identical size:
//! grayscale ([`preprocess`]), 1-bit ([`dither`]) and composite ([`overlay`]),
//! the last of which is written to disk as a PNG for the print spooler.

pub mod dither;
pub mod overlay;
pub mod preprocess;
pub mod text;

use std::path::Path;

use image::{GrayImage, ImageFormat};

use crate::models::sticker::StickerText;

pub use dither::floyd_steinberg;
pub use overlay::{composite_over, Overlay, STICKER_GEOMETRY};
pub use preprocess::{prepare, DecodeError};
pub use text::TextError;

/// Printable label area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for CanvasSize {
    /// 384 dots: the print width of common 58 mm thermal heads.
    fn default() -> Self {
        Self::new(384, 384)
    }
}

/// Encoding or writing of the finished raster failed.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to write sticker raster: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode sticker raster: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Text(#[from] TextError),
}

/// Photo bytes to finished sticker: preprocess, dither, then composite the
/// frame and footer text on top.
pub fn render_sticker(
    bytes: &[u8],
    size: CanvasSize,
    text: &StickerText,
) -> Result<GrayImage, RenderError> {
    let mut canvas = prepare(bytes, size)?;
    floyd_steinberg(&mut canvas);
    let overlay = Overlay::sticker(size, text, &STICKER_GEOMETRY).rasterize()?;
    Ok(composite_over(&canvas, &overlay))
}

/// Write the composite canvas as a PNG, creating parent directories.
pub fn write_png(canvas: &GrayImage, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
