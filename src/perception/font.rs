/// Minimal 5×5 bitmap font for grid index labels and the cursor readout.
///
/// Each glyph: 5 rows, each row is a u8 where bit4=leftmost pixel, bit0=rightmost.
use image::{Rgba, RgbaImage};

const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

fn glyph(c: char) -> Option<[u8; 5]> {
    match c {
        '0'..='9' => Some(DIGITS[(c as u8 - b'0') as usize]),
        '(' => Some([0b00010, 0b00100, 0b00100, 0b00100, 0b00010]),
        ')' => Some([0b01000, 0b00100, 0b00100, 0b00100, 0b01000]),
        ',' => Some([0b00000, 0b00000, 0b00000, 0b00100, 0b01000]),
        '-' => Some([0b00000, 0b00000, 0b01110, 0b00000, 0b00000]),
        'G' => Some([0b01110, 0b10000, 0b10011, 0b10001, 0b01110]),
        'L' => Some([0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
        ' ' => Some([0; 5]),
        _ => None,
    }
}

/// Pixel width of `text` rendered at `scale` (1px gap between glyphs).
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    n * 5 * scale + (n - 1)
}

pub fn text_height(scale: u32) -> u32 {
    5 * scale
}

/// Draw `text` with its top-left at (px, py). Pixels outside the canvas are skipped.
pub fn draw_text(
    canvas: &mut RgbaImage,
    text: &str,
    px: i32,
    py: i32,
    scale: u32,
    fg: Rgba<u8>,
    bg: Option<Rgba<u8>>,
) {
    if let Some(bg) = bg {
        let w = text_width(text, scale) as i32;
        let h = text_height(scale) as i32;
        fill_rect(canvas, px - 1, py - 1, w + 2, h + 2, bg);
    }

    let step = (5 * scale + 1) as i32;
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let gx = px + i as i32 * step;
        for (row, &bits) in rows.iter().enumerate() {
            for col in 0..5u32 {
                if (bits >> (4 - col)) & 1 == 0 {
                    continue;
                }
                fill_rect(
                    canvas,
                    gx + (col * scale) as i32,
                    py + (row as u32 * scale) as i32,
                    scale as i32,
                    scale as i32,
                    fg,
                );
            }
        }
    }
}

pub fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: i32, h: i32, col: Rgba<u8>) {
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    for yy in y.max(0)..(y + h).min(ch) {
        for xx in x.max(0)..(x + w).min(cw) {
            canvas.put_pixel(xx as u32, yy as u32, col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_accounts_for_gaps() {
        assert_eq!(text_width("07", 2), 21);
        assert_eq!(text_width("", 2), 0);
    }

    #[test]
    fn drawing_clips_at_canvas_edge() {
        let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        draw_text(&mut canvas, "(1,2)", 4, 4, 1, Rgba([255, 0, 0, 255]), None);
        // Top-left glyph pixel of '(' is at column 3 of the glyph.
        assert_eq!(canvas.get_pixel(7, 4), &Rgba([255, 0, 0, 255]));
    }
}
