use std::thread;
use std::time::Duration;

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{GridClawError, GridClawResult};
use crate::executor::resolver::{MouseButton, ScrollAxis};
use crate::perception::types::ScreenGeometry;

/// Pointer motion is split into frames of this length.
const FRAME: Duration = Duration::from_millis(16);
/// Pause between key presses while typing, and after a multi-click.
const SETTLE: Duration = Duration::from_millis(50);
/// Longest eased move, in frames (about ten seconds).
const MAX_FRAMES: usize = 625;

/// Low-level mouse and keyboard. Coordinates are image pixels of the last capture.
pub trait InputInjector {
    /// Adopt the geometry of the latest capture.
    fn calibrate(&mut self, _geometry: ScreenGeometry) {}

    fn move_to(&mut self, x: i32, y: i32, duration: f64) -> GridClawResult<()>;
    fn click(&mut self, button: MouseButton, count: u32) -> GridClawResult<()>;
    fn button_down(&mut self, button: MouseButton) -> GridClawResult<()>;
    fn button_up(&mut self, button: MouseButton) -> GridClawResult<()>;
    /// `sign` is +1 for down/right, -1 for up/left.
    fn scroll(&mut self, axis: ScrollAxis, magnitude: u32, sign: i32) -> GridClawResult<()>;
    fn type_text(&mut self, text: &str, submit: bool) -> GridClawResult<()>;
    fn hotkey(&mut self, keys: &[String]) -> GridClawResult<()>;

    fn wait(&mut self, seconds: f64) -> GridClawResult<()> {
        let pause = Duration::try_from_secs_f64(seconds.max(0.0))
            .map_err(|e| GridClawError::Executor(format!("invalid wait of {seconds}s: {e}")))?;
        thread::sleep(pause);
        Ok(())
    }
}

fn input_err<E: std::fmt::Debug>(what: &str) -> impl FnOnce(E) -> GridClawError + '_ {
    move |e| GridClawError::Executor(format!("{what} failed: {e:?}"))
}

fn map_button(btn: MouseButton) -> Button {
    match btn {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

pub fn map_key(key: &str) -> GridClawResult<Key> {
    let k = key.trim().to_lowercase();
    let mapped = match k.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "backspace" => Key::Backspace,
        "control" | "ctrl" => Key::Control,
        "shift" => Key::Shift,
        "alt" | "option" => Key::Alt,
        "meta" | "command" | "cmd" | "super" | "win" | "windows" => Key::Meta,
        "delete" | "del" => Key::Delete,
        "space" => Key::Space,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" => Key::PageUp,
        "pagedown" | "page_down" => Key::PageDown,
        "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = k.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(GridClawError::Executor(format!("unsupported key: {key}"))),
            }
        }
    };
    Ok(mapped)
}

/// Ease-in-out quadratic on `t ∈ [0, 1]`.
fn ease_in_out_quad(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Intermediate pointer positions for an eased move, ending exactly at `to`.
pub fn eased_path(from: (i32, i32), to: (i32, i32), duration: f64) -> Vec<(i32, i32)> {
    let frames = (duration.max(0.0) / FRAME.as_secs_f64()).round();
    let frames = if frames.is_finite() { (frames as usize).min(MAX_FRAMES) } else { MAX_FRAMES };
    if frames <= 1 {
        return vec![to];
    }
    (1..=frames)
        .map(|i| {
            let p = ease_in_out_quad(i as f64 / frames as f64);
            (
                from.0 + ((to.0 - from.0) as f64 * p).round() as i32,
                from.1 + ((to.1 - from.1) as f64 * p).round() as i32,
            )
        })
        .collect()
}

/// enigo-backed injector. Image pixels are converted to desktop coordinates
/// through the geometry of the latest capture.
pub struct EnigoInjector {
    enigo: Enigo,
    geometry: ScreenGeometry,
}

impl EnigoInjector {
    pub fn new(geometry: ScreenGeometry) -> GridClawResult<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(input_err("input init"))?;
        Ok(Self { enigo, geometry })
    }
}

impl InputInjector for EnigoInjector {
    fn calibrate(&mut self, geometry: ScreenGeometry) {
        self.geometry = geometry;
    }

    fn move_to(&mut self, x: i32, y: i32, duration: f64) -> GridClawResult<()> {
        let target = self.geometry.to_screen(x, y);
        let from = self.enigo.location().map_err(input_err("cursor query"))?;
        tracing::debug!(x, y, screen_x = target.0, screen_y = target.1, duration, "moving pointer");

        for (px, py) in eased_path(from, target, duration) {
            self.enigo
                .move_mouse(px, py, Coordinate::Abs)
                .map_err(input_err("mouse move"))?;
            thread::sleep(FRAME);
        }
        Ok(())
    }

    fn click(&mut self, button: MouseButton, count: u32) -> GridClawResult<()> {
        let btn = map_button(button);
        for _ in 0..count {
            self.enigo
                .button(btn, Direction::Click)
                .map_err(input_err("mouse click"))?;
        }
        thread::sleep(SETTLE);
        Ok(())
    }

    fn button_down(&mut self, button: MouseButton) -> GridClawResult<()> {
        self.enigo
            .button(map_button(button), Direction::Press)
            .map_err(input_err("mouse down"))
    }

    fn button_up(&mut self, button: MouseButton) -> GridClawResult<()> {
        self.enigo
            .button(map_button(button), Direction::Release)
            .map_err(input_err("mouse up"))
    }

    fn scroll(&mut self, axis: ScrollAxis, magnitude: u32, sign: i32) -> GridClawResult<()> {
        let axis = match axis {
            ScrollAxis::Vertical => Axis::Vertical,
            ScrollAxis::Horizontal => Axis::Horizontal,
        };
        let length = (magnitude.min(i32::MAX as u32) as i32) * sign.signum();
        self.enigo.scroll(length, axis).map_err(input_err("scroll"))
    }

    fn type_text(&mut self, text: &str, submit: bool) -> GridClawResult<()> {
        self.enigo.text(text).map_err(input_err("typing"))?;
        if submit {
            thread::sleep(SETTLE);
            self.enigo
                .key(Key::Return, Direction::Click)
                .map_err(input_err("enter"))?;
        }
        Ok(())
    }

    /// Press in order, release in reverse.
    fn hotkey(&mut self, keys: &[String]) -> GridClawResult<()> {
        let mapped = keys.iter().map(|k| map_key(k)).collect::<GridClawResult<Vec<_>>>()?;
        let mut pressed = Vec::with_capacity(mapped.len());
        let mut result = Ok(());
        for key in &mapped {
            if let Err(e) = self.enigo.key(*key, Direction::Press) {
                result = Err(input_err("key press")(e));
                break;
            }
            pressed.push(*key);
        }
        for key in pressed.iter().rev() {
            if let Err(e) = self.enigo.key(*key, Direction::Release) {
                tracing::warn!(?key, "key release failed: {e:?}");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eased_path_ends_on_target() {
        let path = eased_path((0, 0), (100, 50), 0.5);
        assert!(path.len() > 10);
        assert_eq!(path.last(), Some(&(100, 50)));
        // Eased: the first step is shorter than the middle one.
        let mid = path.len() / 2;
        assert!(path[0].0 <= path[mid].0 - path[mid - 1].0);
    }

    #[test]
    fn zero_duration_jumps() {
        assert_eq!(eased_path((5, 5), (10, 10), 0.0), vec![(10, 10)]);
    }

    #[test]
    fn huge_duration_is_capped() {
        assert_eq!(eased_path((0, 0), (10, 10), 1e20).len(), MAX_FRAMES);
        assert_eq!(eased_path((0, 0), (10, 10), f64::INFINITY).last(), Some(&(10, 10)));
    }

    struct NoopInjector;

    impl InputInjector for NoopInjector {
        fn move_to(&mut self, _x: i32, _y: i32, _duration: f64) -> GridClawResult<()> {
            Ok(())
        }
        fn click(&mut self, _button: MouseButton, _count: u32) -> GridClawResult<()> {
            Ok(())
        }
        fn button_down(&mut self, _button: MouseButton) -> GridClawResult<()> {
            Ok(())
        }
        fn button_up(&mut self, _button: MouseButton) -> GridClawResult<()> {
            Ok(())
        }
        fn scroll(&mut self, _axis: ScrollAxis, _magnitude: u32, _sign: i32) -> GridClawResult<()> {
            Ok(())
        }
        fn type_text(&mut self, _text: &str, _submit: bool) -> GridClawResult<()> {
            Ok(())
        }
        fn hotkey(&mut self, _keys: &[String]) -> GridClawResult<()> {
            Ok(())
        }
    }

    #[test]
    fn default_wait_rejects_unrepresentable_pause() {
        let mut injector = NoopInjector;
        assert!(injector.wait(1e20).is_err());
        assert!(injector.wait(0.0).is_ok());
    }

    #[test]
    fn key_names_map() {
        assert!(matches!(map_key("Ctrl"), Ok(Key::Control)));
        assert!(matches!(map_key("a"), Ok(Key::Unicode('a'))));
        assert!(matches!(map_key("pagedown"), Ok(Key::PageDown)));
        assert!(map_key("hyper").is_err());
    }
}
