use enigo::{Enigo, Mouse, Settings};
use xcap::Monitor;

use crate::errors::{GridClawError, GridClawResult};
use crate::perception::types::{ScreenCapture, ScreenGeometry};

/// Anything that can produce a full-screen image plus cursor position.
pub trait ScreenSource {
    fn capture(&mut self) -> GridClawResult<ScreenCapture>;
}

/// Primary monitor via xcap; cursor position via enigo.
pub struct XcapScreen {
    enigo: Enigo,
}

impl XcapScreen {
    pub fn new() -> GridClawResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| GridClawError::Perception(format!("cursor query init failed: {e:?}")))?;
        Ok(Self { enigo })
    }
}

fn primary_monitor() -> GridClawResult<Monitor> {
    let monitors = Monitor::all()
        .map_err(|e| GridClawError::Perception(format!("monitor enumeration failed: {e}")))?;
    let count = monitors.len();
    let mut iter = monitors.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| GridClawError::Perception("no monitor found".to_string()))?;
    if first.is_primary() {
        return Ok(first);
    }
    tracing::trace!(count, "scanning for primary monitor");
    Ok(iter.find(|m| m.is_primary()).unwrap_or(first))
}

/// Geometry of the primary monitor, for mapping image pixels to input coordinates.
pub fn primary_geometry() -> GridClawResult<ScreenGeometry> {
    Ok(geometry_of(&primary_monitor()?))
}

fn geometry_of(monitor: &Monitor) -> ScreenGeometry {
    ScreenGeometry {
        origin_x: monitor.x(),
        origin_y: monitor.y(),
        scale_factor: monitor.scale_factor() as f64,
    }
}

impl ScreenSource for XcapScreen {
    fn capture(&mut self) -> GridClawResult<ScreenCapture> {
        let monitor = primary_monitor()?;
        let geometry = geometry_of(&monitor);
        let image = monitor
            .capture_image()
            .map_err(|e| GridClawError::Perception(format!("screen capture failed: {e}")))?;

        let (mx, my) = self
            .enigo
            .location()
            .map_err(|e| GridClawError::Perception(format!("cursor query failed: {e:?}")))?;
        let cursor = geometry.to_image(mx, my);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            cursor_x = cursor.0,
            cursor_y = cursor.1,
            "screen captured"
        );

        Ok(ScreenCapture {
            image,
            cursor,
            geometry,
        })
    }
}
