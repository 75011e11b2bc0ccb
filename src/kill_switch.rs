use std::str::FromStr;
use std::time::{Duration, Instant};

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

use crate::config::KillSwitchConfig;
use crate::errors::{GridClawError, GridClawResult};

/// Counts a streak of presses where each one follows the previous within
/// `window`. A longer gap starts a new streak.
#[derive(Debug)]
pub struct PressDebouncer {
    required: u32,
    window: Duration,
    streak: u32,
    last: Option<Instant>,
}

impl PressDebouncer {
    pub fn new(required: u32, window: Duration) -> Self {
        Self {
            required: required.max(1),
            window,
            streak: 0,
            last: None,
        }
    }

    /// Register a press at `at`. Returns true when the streak is long enough.
    pub fn press(&mut self, at: Instant) -> bool {
        self.streak = match self.last {
            Some(prev) if at.saturating_duration_since(prev) < self.window => self.streak + 1,
            _ => 1,
        };
        self.last = Some(at);
        self.streak >= self.required
    }
}

/// System-wide hotkey watcher. Events are pulled with [`KillSwitch::poll`]
/// from the thread that installed it.
pub struct KillSwitch {
    // Dropping the manager unregisters the hotkey.
    _manager: GlobalHotKeyManager,
    hotkey_id: u32,
    debouncer: PressDebouncer,
}

impl KillSwitch {
    pub fn install(cfg: &KillSwitchConfig) -> GridClawResult<Self> {
        let hotkey = HotKey::from_str(&cfg.hotkey)
            .map_err(|e| GridClawError::Config(format!("invalid kill_switch.hotkey '{}': {e}", cfg.hotkey)))?;
        let hotkey_id = hotkey.id();
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| GridClawError::Agent(format!("hotkey manager unavailable: {e}")))?;
        manager
            .register(hotkey)
            .map_err(|e| GridClawError::Agent(format!("cannot register '{}': {e}", cfg.hotkey)))?;
        tracing::info!(hotkey = %cfg.hotkey, presses = cfg.presses, window_ms = cfg.window_ms, "kill switch armed");

        Ok(Self {
            _manager: manager,
            hotkey_id,
            debouncer: PressDebouncer::new(cfg.presses, Duration::from_millis(cfg.window_ms)),
        })
    }

    /// Drain pending hotkey events. Returns true once the press streak is reached.
    pub fn poll(&mut self) -> bool {
        let mut fired = false;
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if event.id() == self.hotkey_id && event.state() == HotKeyState::Pressed {
                fired |= self.debouncer.press(Instant::now());
            }
        }
        fired
    }
}

/// Terminate the whole process, worker thread included, without unwinding.
pub fn terminate() -> ! {
    tracing::warn!("kill switch triggered, exiting");
    crate::display::print_boxed("Stop Triggered!");
    std::process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_quick_presses_fire() {
        let t0 = Instant::now();
        let mut d = PressDebouncer::new(3, Duration::from_millis(1000));
        assert!(!d.press(t0));
        assert!(!d.press(t0 + Duration::from_millis(400)));
        assert!(d.press(t0 + Duration::from_millis(800)));
    }

    #[test]
    fn slow_press_restarts_the_streak() {
        let t0 = Instant::now();
        let mut d = PressDebouncer::new(3, Duration::from_millis(1000));
        d.press(t0);
        d.press(t0 + Duration::from_millis(500));
        assert!(!d.press(t0 + Duration::from_millis(2000)));
        assert!(!d.press(t0 + Duration::from_millis(2300)));
        assert!(d.press(t0 + Duration::from_millis(2600)));
    }

    #[test]
    fn single_press_config() {
        let mut d = PressDebouncer::new(1, Duration::from_millis(10));
        assert!(d.press(Instant::now()));
    }
}
