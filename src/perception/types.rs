use std::collections::BTreeMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Absolute pixel position inside the captured image.
pub type Pixel = (i32, i32);

/// Placement of the captured monitor in desktop space.
///
/// Captures are in physical pixels. The input layer on Windows and macOS
/// works in logical points, so coordinates are scaled on the way in and out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub origin_x: i32,
    pub origin_y: i32,
    pub scale_factor: f64,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            origin_x: 0,
            origin_y: 0,
            scale_factor: 1.0,
        }
    }
}

impl ScreenGeometry {
    fn effective_scale(&self) -> f64 {
        if cfg!(any(target_os = "windows", target_os = "macos")) && self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        }
    }

    /// Desktop (input-layer) coordinates → image pixel.
    pub fn to_image(&self, x: i32, y: i32) -> Pixel {
        let s = self.effective_scale();
        (
            ((x - self.origin_x) as f64 * s).round() as i32,
            ((y - self.origin_y) as f64 * s).round() as i32,
        )
    }

    /// Image pixel → desktop (input-layer) coordinates.
    pub fn to_screen(&self, x: i32, y: i32) -> Pixel {
        let s = self.effective_scale();
        (
            (x as f64 / s).round() as i32 + self.origin_x,
            (y as f64 / s).round() as i32 + self.origin_y,
        )
    }
}

/// One raw capture: full-screen image plus the cursor position in image pixels.
pub struct ScreenCapture {
    pub image: RgbaImage,
    pub cursor: Pixel,
    pub geometry: ScreenGeometry,
}

impl ScreenCapture {
    /// Black stand-in used when the capture primitive fails.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255])),
            cursor: (0, 0),
            geometry: ScreenGeometry::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridPrefix {
    Global,
    Local,
}

impl GridPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridPrefix::Global => "G",
            GridPrefix::Local => "L",
        }
    }
}

/// `G-05-03`, `L-00-12`, …
pub fn point_id(prefix: GridPrefix, col: u32, row: u32) -> String {
    format!("{}-{:02}-{:02}", prefix.as_str(), col, row)
}

/// Point id → pixel, rebuilt on every perception pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateMap {
    points: BTreeMap<String, Pixel>,
}

impl CoordinateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: String, pixel: Pixel) {
        self.points.insert(id, pixel);
    }

    pub fn get(&self, id: &str) -> Option<Pixel> {
        self.points.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Ids carrying the given prefix.
    pub fn count_prefix(&self, prefix: GridPrefix) -> usize {
        let p = format!("{}-", prefix.as_str());
        self.points.keys().filter(|k| k.starts_with(&p)).count()
    }

    /// Merge another map in. Global and local ids never collide.
    pub fn extend(&mut self, other: CoordinateMap) {
        self.points.extend(other.points);
    }
}

/// Output of one perception pass.
pub struct PerceptionViews {
    /// Full screen with the coarse grid and border labels.
    pub global: RgbaImage,
    /// Cursor-centred crop with the fine grid.
    pub local: RgbaImage,
    pub map: CoordinateMap,
    /// Top-left of the crop in image pixels; local ids resolve relative to it.
    pub crop_origin: (u32, u32),
    pub cursor: Pixel,
    pub geometry: ScreenGeometry,
    /// True when the capture failed and a blank fallback was used.
    pub degraded: bool,
}
