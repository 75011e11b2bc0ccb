use crate::display::DisplayHandle;

/// Hooks run around every screen capture, so the agent's own output stays out
/// of the screenshot.
pub trait CaptureGuard {
    fn enter(&self);
    fn exit(&self);
}

pub struct NoopGuard;

impl CaptureGuard for NoopGuard {
    fn enter(&self) {}
    fn exit(&self) {}
}

/// Holds the display sink's output while a capture is in flight.
pub struct DisplaySuppressGuard {
    display: DisplayHandle,
}

impl DisplaySuppressGuard {
    pub fn new(display: DisplayHandle) -> Self {
        Self { display }
    }
}

impl CaptureGuard for DisplaySuppressGuard {
    fn enter(&self) {
        self.display.pause();
    }

    fn exit(&self) {
        self.display.resume();
    }
}

/// `enter` now, `exit` on drop, including early returns.
pub(crate) struct GuardScope<'a> {
    guard: &'a dyn CaptureGuard,
}

impl<'a> GuardScope<'a> {
    pub(crate) fn enter(guard: &'a dyn CaptureGuard) -> Self {
        guard.enter();
        Self { guard }
    }
}

impl Drop for GuardScope<'_> {
    fn drop(&mut self) {
        self.guard.exit();
    }
}
