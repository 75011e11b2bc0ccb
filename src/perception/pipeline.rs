use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use image::{ImageFormat, RgbaImage};

use crate::config::VisionConfig;
use crate::errors::GridClawResult;
use crate::memory::turn::{ImageAttachment, ImageDetail};
use crate::perception::grid::{build_views, GridStyle};
use crate::perception::guard::{CaptureGuard, GuardScope};
use crate::perception::screenshot::ScreenSource;
use crate::perception::types::{PerceptionViews, ScreenCapture};

/// Capture → fallback → grid → optional debug archive.
pub struct Perceiver {
    source: Box<dyn ScreenSource>,
    guard: Box<dyn CaptureGuard>,
    style: GridStyle,
    fallback: (u32, u32),
    settle: Duration,
    debug_dir: Option<PathBuf>,
}

impl Perceiver {
    pub fn new(
        source: Box<dyn ScreenSource>,
        guard: Box<dyn CaptureGuard>,
        vision: &VisionConfig,
    ) -> GridClawResult<Self> {
        Ok(Self {
            source,
            guard,
            style: GridStyle::from_config(vision)?,
            fallback: (vision.fallback_width, vision.fallback_height),
            settle: Duration::from_millis(vision.capture_settle_ms),
            debug_dir: None,
        })
    }

    /// Archive every pair of views as PNGs under `dir`.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// One perception pass. Never fails: a broken capture degrades to a blank frame.
    pub fn perceive(&mut self) -> PerceptionViews {
        let (capture, degraded) = self.capture();
        let mut views = build_views(&capture.image, capture.cursor, &self.style);
        views.geometry = capture.geometry;
        views.degraded = degraded;

        if let Some(dir) = &self.debug_dir {
            if let Err(e) = archive_views(dir, &views) {
                tracing::warn!("debug archive failed: {e}");
            }
        }
        views
    }

    fn capture(&mut self) -> (ScreenCapture, bool) {
        let result = {
            let _scope = GuardScope::enter(self.guard.as_ref());
            if !self.settle.is_zero() {
                std::thread::sleep(self.settle);
            }
            self.source.capture()
        };

        match result {
            Ok(capture) => (capture, false),
            Err(e) => {
                tracing::warn!(
                    width = self.fallback.0,
                    height = self.fallback.1,
                    "capture failed, using blank frame: {e}"
                );
                (ScreenCapture::blank(self.fallback.0, self.fallback.1), true)
            }
        }
    }
}

fn archive_views(dir: &Path, views: &PerceptionViews) -> GridClawResult<()> {
    std::fs::create_dir_all(dir)?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    views
        .global
        .save_with_format(dir.join(format!("global_{ts}.png")), ImageFormat::Png)?;
    views
        .local
        .save_with_format(dir.join(format!("local_{ts}.png")), ImageFormat::Png)?;
    tracing::debug!(dir = %dir.display(), "views archived");
    Ok(())
}

/// PNG-encode and wrap as a `data:` URI.
pub fn encode_png_data_uri(img: &RgbaImage) -> GridClawResult<String> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    Ok(format!("data:image/png;base64,{b64}"))
}

/// Global then local, both high detail.
pub fn encode_views(views: &PerceptionViews) -> GridClawResult<[ImageAttachment; 2]> {
    Ok([
        ImageAttachment::new(encode_png_data_uri(&views.global)?, ImageDetail::High),
        ImageAttachment::new(encode_png_data_uri(&views.local)?, ImageDetail::High),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GridClawError;
    use crate::perception::guard::NoopGuard;
    use crate::perception::types::GridPrefix;

    struct FailingScreen;

    impl ScreenSource for FailingScreen {
        fn capture(&mut self) -> GridClawResult<ScreenCapture> {
            Err(GridClawError::Perception("no display".into()))
        }
    }

    struct FixedScreen;

    impl ScreenSource for FixedScreen {
        fn capture(&mut self) -> GridClawResult<ScreenCapture> {
            let mut capture = ScreenCapture::blank(400, 300);
            capture.cursor = (200, 150);
            Ok(capture)
        }
    }

    fn vision() -> VisionConfig {
        VisionConfig {
            capture_settle_ms: 0,
            ..VisionConfig::default()
        }
    }

    #[test]
    fn failed_capture_degrades_to_blank_frame() {
        let mut p = Perceiver::new(Box::new(FailingScreen), Box::new(NoopGuard), &vision()).unwrap();
        let views = p.perceive();

        assert!(views.degraded);
        assert_eq!(views.cursor, (0, 0));
        assert_eq!(views.map.count_prefix(GridPrefix::Global), 19 * 10);
        assert_eq!(views.map.get("L-00-00"), Some((0, 0)));
    }

    #[test]
    fn debug_mode_archives_both_views() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = Perceiver::new(Box::new(FixedScreen), Box::new(NoopGuard), &vision())
            .unwrap()
            .with_debug_dir(dir.path().to_path_buf());
        let views = p.perceive();
        assert!(!views.degraded);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("global_") && n.ends_with(".png")));
        assert!(names.iter().any(|n| n.starts_with("local_") && n.ends_with(".png")));
    }

    #[test]
    fn views_encode_as_png_data_uris() {
        let mut p = Perceiver::new(Box::new(FixedScreen), Box::new(NoopGuard), &vision()).unwrap();
        let [global, local] = encode_views(&p.perceive()).unwrap();
        assert!(global.data_uri.starts_with("data:image/png;base64,"));
        assert_eq!(local.detail, ImageDetail::High);
    }
}
