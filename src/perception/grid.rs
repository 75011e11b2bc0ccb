/// Dual-view grid overlay.
///
/// Produces a coarse global view of the whole screen and a fine local view
/// around the cursor. Every grid intersection gets an id the model can cite
/// instead of raw pixels:
///   - Global: `G-cc-rr` at (c·step, r·step)
///   - Local:  `L-cc-rr` at (crop_left + c·local_step, crop_top + r·local_step)
///
/// Column indices are printed along the top and bottom margins, row indices
/// along the left and right margins, so no label covers screen content.
use image::{Rgba, RgbaImage};

use crate::config::VisionConfig;
use crate::errors::{GridClawError, GridClawResult};
use crate::perception::font::{draw_text, fill_rect, text_height, text_width};
use crate::perception::types::{
    point_id, CoordinateMap, GridPrefix, PerceptionViews, Pixel, ScreenGeometry,
};

const MARGIN_BG: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_FG: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CURSOR_RADIUS: i32 = 15;

#[derive(Debug, Clone)]
pub struct GridStyle {
    pub global_step: u32,
    pub local_step: u32,
    pub crop_size: u32,
    pub grid_color: Rgba<u8>,
    pub grid_width: u32,
    pub mouse_color: Rgba<u8>,
    pub mouse_width: u32,
    pub margin: u32,
}

impl GridStyle {
    pub fn from_config(cfg: &VisionConfig) -> GridClawResult<Self> {
        Ok(Self {
            global_step: cfg.grid_step,
            local_step: cfg.local_grid_step,
            crop_size: cfg.crop_size,
            grid_color: parse_color(&cfg.grid_color)?,
            grid_width: cfg.grid_width.max(1),
            mouse_color: parse_color(&cfg.mouse_color)?,
            mouse_width: cfg.mouse_width.max(1),
            margin: cfg.label_margin,
        })
    }
}

impl Default for GridStyle {
    fn default() -> Self {
        Self {
            global_step: 100,
            local_step: 30,
            crop_size: 500,
            grid_color: Rgba([255, 0, 0, 255]),
            grid_width: 1,
            mouse_color: Rgba([0, 0, 255, 255]),
            mouse_width: 5,
            margin: 24,
        }
    }
}

/// Accepts a handful of colour names or `#rrggbb`.
pub fn parse_color(raw: &str) -> GridClawResult<Rgba<u8>> {
    let s = raw.trim().to_ascii_lowercase();
    let rgb = match s.as_str() {
        "red" => [255, 0, 0],
        "green" => [0, 200, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 220, 0],
        "magenta" => [255, 0, 255],
        "cyan" => [0, 255, 255],
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        hex if hex.starts_with('#') && hex.len() == 7 => {
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|_| GridClawError::Config(format!("invalid colour: {raw}")))
            };
            [channel(1)?, channel(3)?, channel(5)?]
        }
        _ => return Err(GridClawError::Config(format!("unknown colour: {raw}"))),
    };
    Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

/// Build both annotated views and the merged coordinate map.
///
/// `cursor` is in image pixels. It may lie outside the image (multi-monitor
/// setups); the crop then hugs the nearest edge.
pub fn build_views(
    image: &RgbaImage,
    cursor: Pixel,
    style: &GridStyle,
) -> PerceptionViews {
    let (w, h) = image.dimensions();

    let mut map = grid_points(w, h, style.global_step, GridPrefix::Global, (0, 0));
    let global = render_view(image, style.global_step, cursor, cursor, style);

    let (left, top, cw, ch) = crop_rect(w, h, cursor, style.crop_size);
    let crop = image::imageops::crop_imm(image, left, top, cw, ch).to_image();
    map.extend(grid_points(cw, ch, style.local_step, GridPrefix::Local, (left, top)));
    let rel_cursor = (cursor.0 - left as i32, cursor.1 - top as i32);
    let local = render_view(&crop, style.local_step, rel_cursor, cursor, style);

    tracing::debug!(
        width = w,
        height = h,
        crop_left = left,
        crop_top = top,
        points = map.len(),
        "grid views built"
    );

    PerceptionViews {
        global,
        local,
        map,
        crop_origin: (left, top),
        cursor,
        geometry: ScreenGeometry::default(),
        degraded: false,
    }
}

/// Crop rectangle of at most `size`×`size`, centred on the cursor and shifted
/// inward so it never leaves the image.
pub fn crop_rect(w: u32, h: u32, cursor: Pixel, size: u32) -> (u32, u32, u32, u32) {
    let cw = size.min(w);
    let ch = size.min(h);
    let axis = |c: i32, extent: u32, len: u32| -> u32 {
        let ideal = c as i64 - (size / 2) as i64;
        ideal.clamp(0, (extent - len) as i64) as u32
    };
    (axis(cursor.0, w, cw), axis(cursor.1, h, ch), cw, ch)
}

/// Intersections at multiples of `step`, `floor(w/step)` columns by `floor(h/step)` rows.
fn grid_points(w: u32, h: u32, step: u32, prefix: GridPrefix, offset: (u32, u32)) -> CoordinateMap {
    let mut map = CoordinateMap::new();
    for c in 0..w / step {
        for r in 0..h / step {
            map.insert(
                point_id(prefix, c, r),
                ((offset.0 + c * step) as i32, (offset.1 + r * step) as i32),
            );
        }
    }
    map
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn render_view(
    src: &RgbaImage,
    step: u32,
    cursor_rel: Pixel,
    cursor_abs: Pixel,
    style: &GridStyle,
) -> RgbaImage {
    let (w, h) = src.dimensions();
    let m = style.margin;
    let mut canvas = RgbaImage::from_pixel(w + 2 * m, h + 2 * m, MARGIN_BG);
    image::imageops::overlay(&mut canvas, src, m as i64, m as i64);

    let scale = label_scale(step, m);
    let th = text_height(scale) as i32;
    let (mi, wi, hi) = (m as i32, w as i32, h as i32);
    let lw = style.grid_width as i32;

    for c in 0..w / step {
        let x = mi + (c * step) as i32;
        fill_rect(&mut canvas, x, mi, lw, hi, style.grid_color);
        if m > 0 {
            let label = format!("{c:02}");
            let tw = text_width(&label, scale) as i32;
            let lx = (x - tw / 2).clamp(0, (canvas.width() as i32 - tw).max(0));
            draw_text(&mut canvas, &label, lx, (mi - th) / 2, scale, LABEL_FG, None);
            draw_text(&mut canvas, &label, lx, mi + hi + (mi - th) / 2, scale, LABEL_FG, None);
        }
    }

    for r in 0..h / step {
        let y = mi + (r * step) as i32;
        fill_rect(&mut canvas, mi, y, wi, lw, style.grid_color);
        if m > 0 {
            let label = format!("{r:02}");
            let tw = text_width(&label, scale) as i32;
            let ly = (y - th / 2).clamp(0, (canvas.height() as i32 - th).max(0));
            draw_text(&mut canvas, &label, (mi - tw) / 2, ly, scale, LABEL_FG, None);
            draw_text(&mut canvas, &label, mi + wi + (mi - tw) / 2, ly, scale, LABEL_FG, None);
        }
    }

    draw_cursor(&mut canvas, (cursor_rel.0 + mi, cursor_rel.1 + mi), cursor_abs, style);
    canvas
}

/// Largest font scale whose two-digit label fits both the margin and a cell.
fn label_scale(step: u32, margin: u32) -> u32 {
    for scale in [2, 1] {
        if text_width("00", scale) < step && text_height(scale) + 2 <= margin.max(1) {
            return scale;
        }
    }
    1
}

/// Circle plus crosshair at `at`, with the absolute coordinate printed below.
fn draw_cursor(canvas: &mut RgbaImage, at: Pixel, label_pos: Pixel, style: &GridStyle) {
    let (cx, cy) = at;
    let thick = style.mouse_width as i32;
    let col = style.mouse_color;

    let outer = (CURSOR_RADIUS + thick / 2).pow(2);
    let inner = (CURSOR_RADIUS - (thick - thick / 2)).max(0).pow(2);
    for dy in -CURSOR_RADIUS - thick..=CURSOR_RADIUS + thick {
        for dx in -CURSOR_RADIUS - thick..=CURSOR_RADIUS + thick {
            let d = dx * dx + dy * dy;
            if d <= outer && d >= inner {
                fill_rect(canvas, cx + dx, cy + dy, 1, 1, col);
            }
        }
    }

    let arm = CURSOR_RADIUS + 5;
    let bar = (thick / 2).max(1);
    fill_rect(canvas, cx - arm, cy - bar / 2, 2 * arm + 1, bar, col);
    fill_rect(canvas, cx - bar / 2, cy - arm, bar, 2 * arm + 1, col);

    let label = format!("({},{})", label_pos.0, label_pos.1);
    let scale = 2;
    let tw = text_width(&label, scale) as i32;
    let th = text_height(scale) as i32;
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    let mut ly = cy + arm + 4;
    if ly + th > ch {
        ly = cy - arm - 4 - th;
    }
    let lx = (cx - tw / 2).clamp(1, (cw - tw - 1).max(1));
    let ly = ly.clamp(1, (ch - th - 1).max(1));
    draw_text(canvas, &label, lx, ly, scale, col, Some(MARGIN_BG));
}
