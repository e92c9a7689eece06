//! Sticker frame and footer band.
//!
//! The overlay is declared as a list of shapes, rasterized onto a transparent
//! RGBA layer, then blended "over" the dithered photo. Geometry matches the
//! booth's original SVG template for a 384×384 label:
//!
//! ```text
//! <rect x=5 y=5 width=W-10 height=H-10 rx=40 stroke-width=10 fill=none/>
//! <path d="M 5,H-80 L W-5,H-80 L W-5,H-45 Q W-5,H-5 W-45,H-5
//!          L 45,H-5 Q 5,H-5 5,H-45 Z" fill=black/>
//! <text y=H-50 bold 24px>Order #1042</text>
//! <text y=H-25 monospace 16px>Rani • 10:30</text>
//! ```

use image::{GrayImage, Rgba, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use super::text::{render_line, TextError, TextStyle};
use super::CanvasSize;
use crate::models::sticker::StickerText;

/// Segments used to flatten each quadratic curve.
const CURVE_SEGMENTS: usize = 16;

/// Fixed layout constants, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    /// Distance of the frame's centre line from the canvas edge.
    pub frame_inset: f32,
    pub frame_radius: f32,
    pub frame_stroke: f32,
    /// Distance of the band's top edge from the bottom of the canvas.
    pub band_height: f32,
    /// Radius-like extent of the band's two bottom curves.
    pub band_corner: f32,
    /// Baselines, measured up from the bottom of the canvas.
    pub headline_baseline: f32,
    pub caption_baseline: f32,
}

pub const STICKER_GEOMETRY: OverlayGeometry = OverlayGeometry {
    frame_inset: 5.0,
    frame_radius: 40.0,
    frame_stroke: 10.0,
    band_height: 80.0,
    band_corner: 40.0,
    headline_baseline: 50.0,
    caption_baseline: 25.0,
};

/// Opaque overlay colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ink {
    Black,
    White,
}

impl Ink {
    fn rgba(self) -> Rgba<u8> {
        match self {
            Ink::Black => Rgba([0, 0, 0, 255]),
            Ink::White => Rgba([255, 255, 255, 255]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Rounded rectangle outline; the stroke is centred on the edge.
    StrokedRoundedRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
        stroke: f32,
        ink: Ink,
    },
    /// Closed polygon, already flattened.
    FilledPath { points: Vec<(f32, f32)>, ink: Ink },
    /// Single line of text centred on `center_x`, sitting on `baseline`.
    Text {
        text: String,
        style: TextStyle,
        center_x: f32,
        baseline: f32,
        ink: Ink,
    },
}

/// Declarative overlay for one canvas.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub size: CanvasSize,
    pub shapes: Vec<Shape>,
}

impl Overlay {
    /// Frame, footer band and the two footer lines for a sticker.
    pub fn sticker(size: CanvasSize, text: &StickerText, geometry: &OverlayGeometry) -> Self {
        let w = size.width as f32;
        let h = size.height as f32;
        let g = geometry;

        let frame = Shape::StrokedRoundedRect {
            x: g.frame_inset,
            y: g.frame_inset,
            width: w - 2.0 * g.frame_inset,
            height: h - 2.0 * g.frame_inset,
            radius: g.frame_radius,
            stroke: g.frame_stroke,
            ink: Ink::Black,
        };

        let left = g.frame_inset;
        let right = w - g.frame_inset;
        let bottom = h - g.frame_inset;
        let band = PathBuilder::move_to(left, h - g.band_height)
            .line_to(right, h - g.band_height)
            .line_to(right, bottom - g.band_corner)
            .quad_to(right, bottom, right - g.band_corner, bottom)
            .line_to(left + g.band_corner, bottom)
            .quad_to(left, bottom, left, bottom - g.band_corner)
            .close();

        // Text stays clear of the band's curved corners.
        let text_room = (w - 2.0 * (g.frame_inset + g.band_corner)).max(0.0) as u32;
        let line = |content: &str, style: TextStyle, from_bottom: f32| Shape::Text {
            text: style.fit(content, text_room).to_string(),
            style,
            center_x: w / 2.0,
            baseline: h - from_bottom,
            ink: Ink::White,
        };

        Self {
            size,
            shapes: vec![
                frame,
                Shape::FilledPath {
                    points: band,
                    ink: Ink::Black,
                },
                line(&text.headline, TextStyle::Bold, g.headline_baseline),
                line(&text.caption, TextStyle::Mono, g.caption_baseline),
            ],
        }
    }

    /// Paint all shapes, in order, onto a transparent layer.
    pub fn rasterize(&self) -> Result<RgbaImage, TextError> {
        let mut layer = RgbaImage::new(self.size.width, self.size.height);
        for shape in &self.shapes {
            paint(&mut layer, shape)?;
        }
        Ok(layer)
    }
}

fn paint(layer: &mut RgbaImage, shape: &Shape) -> Result<(), TextError> {
    match shape {
        Shape::StrokedRoundedRect {
            x,
            y,
            width,
            height,
            radius,
            stroke,
            ink,
        } => {
            let half = stroke / 2.0;
            let color = ink.rgba();
            for (px, py, pixel) in layer.enumerate_pixels_mut() {
                let d = rounded_rect_distance(
                    px as f32 + 0.5,
                    py as f32 + 0.5,
                    (*x, *y, *width, *height),
                    *radius,
                );
                if d.abs() <= half {
                    *pixel = color;
                }
            }
        }
        Shape::FilledPath { points, ink } => {
            let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
            for &(px, py) in points {
                let p = Point::new(px.round() as i32, py.round() as i32);
                if poly.last() != Some(&p) {
                    poly.push(p);
                }
            }
            // draw_polygon_mut rejects an explicitly closed ring.
            while poly.len() > 1 && poly.first() == poly.last() {
                poly.pop();
            }
            if poly.len() >= 3 {
                draw_polygon_mut(layer, &poly, ink.rgba());
            }
        }
        Shape::Text {
            text,
            style,
            center_x,
            baseline,
            ink,
        } => {
            let run = render_line(text, *style)?;
            let left = (center_x - run.width as f32 / 2.0).round() as i64;
            let top = (baseline - style.baseline() as f32).round() as i64;
            let color = ink.rgba();
            for gy in 0..run.height {
                for gx in 0..run.width {
                    if !run.covers(gx, gy) {
                        continue;
                    }
                    let (x, y) = (left + i64::from(gx), top + i64::from(gy));
                    if x >= 0 && y >= 0 && x < i64::from(layer.width()) && y < i64::from(layer.height()) {
                        layer.put_pixel(x as u32, y as u32, color);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Signed distance from a point to a rounded rectangle's edge (negative inside).
fn rounded_rect_distance(px: f32, py: f32, rect: (f32, f32, f32, f32), radius: f32) -> f32 {
    let (x, y, width, height) = rect;
    let (hw, hh) = (width / 2.0, height / 2.0);
    let r = radius.min(hw).min(hh).max(0.0);
    let qx = (px - (x + hw)).abs() - hw + r;
    let qy = (py - (y + hh)).abs() - hh + r;
    qx.max(0.0).hypot(qy.max(0.0)) + qx.max(qy).min(0.0) - r
}

/// Minimal SVG-like path builder that flattens curves as it goes.
struct PathBuilder {
    points: Vec<(f32, f32)>,
}

impl PathBuilder {
    fn move_to(x: f32, y: f32) -> Self {
        Self {
            points: vec![(x, y)],
        }
    }

    fn current(&self) -> (f32, f32) {
        self.points.last().copied().unwrap_or((0.0, 0.0))
    }

    fn line_to(mut self, x: f32, y: f32) -> Self {
        self.points.push((x, y));
        self
    }

    fn quad_to(mut self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        let (x0, y0) = self.current();
        for step in 1..=CURVE_SEGMENTS {
            let t = step as f32 / CURVE_SEGMENTS as f32;
            let mt = 1.0 - t;
            self.points.push((
                mt * mt * x0 + 2.0 * mt * t * cx + t * t * x,
                mt * mt * y0 + 2.0 * mt * t * cy + t * t * y,
            ));
        }
        self
    }

    fn close(self) -> Vec<(f32, f32)> {
        self.points
    }
}

/// "Over" blend of an RGBA layer onto a grayscale canvas.
///
/// Transparent overlay pixels leave the canvas untouched; opaque ones replace
/// it. Overlay inks are neutral, so the red channel carries their gray value.
///
/// # Panics
///
/// If the two images differ in size.
pub fn composite_over(background: &GrayImage, overlay: &RgbaImage) -> GrayImage {
    assert_eq!(
        background.dimensions(),
        overlay.dimensions(),
        "overlay does not match canvas size"
    );

    let mut out = background.clone();
    for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
        let alpha = u32::from(src.0[3]);
        if alpha == 0 {
            continue;
        }
        let ink = u32::from(src.0[0]);
        let base = u32::from(dst.0[0]);
        dst.0[0] = ((ink * alpha + base * (255 - alpha) + 127) / 255) as u8;
    }
    out
}
