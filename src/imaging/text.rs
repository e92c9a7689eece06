//! Bitmap text for the sticker footer, rendered from the Spleen fonts.
//!
//! Spleen cells match the footer's font sizes exactly: 12×24 for the bold
//! order line (double-struck one pixel to the right) and 8×16 for the
//! monospaced caption.

use spleen_font::{PSF2Font, FONT_12X24, FONT_8X16};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    /// 24 px, emboldened by double striking.
    Bold,
    /// 16 px monospace.
    Mono,
}

impl TextStyle {
    fn font_data(self) -> &'static [u8] {
        match self {
            TextStyle::Bold => FONT_12X24,
            TextStyle::Mono => FONT_8X16,
        }
    }

    /// Glyph cell size in pixels.
    pub fn cell(self) -> (u32, u32) {
        match self {
            TextStyle::Bold => (12, 24),
            TextStyle::Mono => (8, 16),
        }
    }

    /// Row of the cell that sits on the text baseline.
    pub fn baseline(self) -> u32 {
        match self {
            TextStyle::Bold => 19,
            TextStyle::Mono => 12,
        }
    }

    fn extra_width(self) -> u32 {
        match self {
            TextStyle::Bold => 1,
            TextStyle::Mono => 0,
        }
    }

    /// Pixel width of `text` once rendered.
    pub fn measure(self, text: &str) -> u32 {
        let chars = text.chars().count() as u32;
        if chars == 0 {
            return 0;
        }
        chars * self.cell().0 + self.extra_width()
    }

    /// Longest prefix of `text` that renders within `max_width` pixels.
    pub fn fit<'a>(self, text: &'a str, max_width: u32) -> &'a str {
        if self.measure(text) <= max_width {
            return text;
        }
        let cell = self.cell().0;
        let room = max_width.saturating_sub(self.extra_width()) / cell;
        match text.char_indices().nth(room as usize) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("Embedded bitmap font could not be parsed")]
    Font,
}

/// A rendered line of text as a coverage mask.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub width: u32,
    pub height: u32,
    mask: Vec<bool>,
}

impl GlyphRun {
    pub fn covers(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.mask[(y * self.width + x) as usize]
    }

    pub fn ink_count(&self) -> usize {
        self.mask.iter().filter(|&&on| on).count()
    }
}

/// Render one line of text. Characters missing from the font leave a blank cell.
pub fn render_line(text: &str, style: TextStyle) -> Result<GlyphRun, TextError> {
    let mut font = PSF2Font::new(style.font_data()).map_err(|_| TextError::Font)?;
    let (cell_w, cell_h) = style.cell();
    let width = style.measure(text);
    let height = if width == 0 { 0 } else { cell_h };
    let mut mask = vec![false; (width * height) as usize];

    let mut utf8 = [0u8; 4];
    for (index, ch) in text.chars().enumerate() {
        let origin = index as u32 * cell_w;
        let Some(glyph) = font.glyph_for_utf8(ch.encode_utf8(&mut utf8).as_bytes()) else {
            continue;
        };
        for (row_y, row) in glyph.enumerate() {
            for (col_x, on) in row.enumerate() {
                if !on || row_y as u32 >= cell_h || col_x as u32 >= cell_w {
                    continue;
                }
                let x = origin + col_x as u32;
                let y = row_y as u32;
                mask[(y * width + x) as usize] = true;
                if style == TextStyle::Bold {
                    mask[(y * width + x + 1) as usize] = true;
                }
            }
        }
    }

    Ok(GlyphRun {
        width,
        height,
        mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure() {
        assert_eq!(TextStyle::Mono.measure("Booth"), 40);
        assert_eq!(TextStyle::Bold.measure("Order #1"), 8 * 12 + 1);
        assert_eq!(TextStyle::Bold.measure(""), 0);
    }

    #[test]
    fn test_render_has_ink() {
        let run = render_line("Order #1042", TextStyle::Bold).unwrap();
        assert_eq!(run.width, TextStyle::Bold.measure("Order #1042"));
        assert_eq!(run.height, 24);
        assert!(run.ink_count() > 0);
    }

    #[test]
    fn test_bold_is_heavier_than_single_strike() {
        let run = render_line("I", TextStyle::Bold).unwrap();
        let single: usize = (0..run.height)
            .map(|y| (0..12).filter(|&x| run.covers(x, y) && !run.covers(x + 1, y)).count())
            .sum();
        // Every lit run ends in the pixel added by the second strike.
        assert!(single > 0);
        assert!(run.ink_count() > single);
    }

    #[test]
    fn test_space_renders_blank() {
        let run = render_line("   ", TextStyle::Mono).unwrap();
        assert_eq!(run.width, 24);
        assert_eq!(run.ink_count(), 0);
    }

    #[test]
    fn test_fit_truncates_to_width() {
        assert_eq!(TextStyle::Mono.fit("abcdef", 100), "abcdef");
        assert_eq!(TextStyle::Mono.fit("abcdef", 24), "abc");
        assert_eq!(TextStyle::Bold.fit("abcdef", 24), "a");
        assert_eq!(TextStyle::Mono.fit("ééééé", 16), "éé");
    }

    #[test]
    fn test_covers_out_of_range() {
        let run = render_line("A", TextStyle::Mono).unwrap();
        assert!(!run.covers(8, 0));
        assert!(!run.covers(0, 16));
    }
}
