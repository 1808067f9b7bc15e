//! Pixel-level drawing on the card raster.
//!
//! Text uses the 8x8 public-domain bitmap glyphs from `font8x8`, scaled by an
//! integer factor. Characters outside basic Latin are drawn as `?`.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

pub const GLYPH_SIZE: u32 = 8;

const REPLACEMENT: char = '?';

pub fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(width).min(canvas.width());
    let y_end = y.saturating_add(height).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, color);
        }
    }
}

/// Outline drawn inward from the given bounds
pub fn stroke_rect(
    canvas: &mut RgbImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    thickness: u32,
    color: Rgb<u8>,
) {
    if width == 0 || height == 0 {
        return;
    }
    let t = thickness.min(width / 2).min(height / 2).max(1);
    fill_rect(canvas, x, y, width, t, color);
    fill_rect(canvas, x, y + height - t, width, t, color);
    fill_rect(canvas, x, y, t, height, color);
    fill_rect(canvas, x + width - t, y, t, height, color);
}

pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale
}

/// Cuts `text` so it fits in `max_width` pixels, marking the cut with `..`
pub fn fit_text(text: &str, max_width: u32, scale: u32) -> String {
    let max_chars = (max_width / (GLYPH_SIZE * scale)) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(2);
    let mut cut: String = text.chars().take(keep).collect();
    if max_chars >= 2 {
        cut.push_str("..");
    }
    cut
}

/// Draws `text` with its top-left corner at `(x, y)`; pixels off the canvas are clipped
pub fn draw_text(canvas: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let advance = GLYPH_SIZE * scale;

    for (index, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get(REPLACEMENT))
            .unwrap_or([0; 8]);
        let origin_x = x + index as u32 * advance;
        if origin_x >= canvas.width() {
            break;
        }

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // Bit 0 is the leftmost pixel of the row
                if bits & (1 << col) != 0 {
                    fill_rect(
                        canvas,
                        origin_x + col * scale,
                        y + row as u32 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
    }
}

/// Draws `text` horizontally centred on the canvas
pub fn draw_text_centered(canvas: &mut RgbImage, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    let width = text_width(text, scale);
    let x = canvas.width().saturating_sub(width) / 2;
    draw_text(canvas, x, y, text, scale, color);
}
