/// Turns a parsed action block into a typed [`ActionIntent`].
///
/// Point ids are looked up in the coordinate map built by the same step's
/// perception pass; nothing here touches the screen or the input devices.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::perception::types::{CoordinateMap, Pixel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }

    pub fn axis(&self) -> ScrollAxis {
        match self {
            ScrollDirection::Up | ScrollDirection::Down => ScrollAxis::Vertical,
            ScrollDirection::Left | ScrollDirection::Right => ScrollAxis::Horizontal,
        }
    }

    /// Down and right are positive on both axes.
    pub fn sign(&self) -> i32 {
        match self {
            ScrollDirection::Down | ScrollDirection::Right => 1,
            ScrollDirection::Up | ScrollDirection::Left => -1,
        }
    }
}

/// A grid point the model referred to, with the pixel it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPoint {
    pub id: String,
    pub pixel: Pixel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionIntent {
    Move { target: ResolvedPoint, duration: f64 },
    Click { button: MouseButton, count: u32 },
    DoubleClick { button: MouseButton },
    MouseDown { button: MouseButton },
    MouseUp { button: MouseButton },
    Drag { from: Option<ResolvedPoint>, to: ResolvedPoint, duration: f64 },
    Hover { seconds: f64 },
    Scroll { direction: ScrollDirection, notches: u32, label: String },
    Type { text: String, submit: bool },
    Hotkey { keys: Vec<String> },
    Wait { seconds: f64 },
    FinalAnswer { answer: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Move,
    Click,
    DoubleClick,
    MouseDown,
    MouseUp,
    Drag,
    Hover,
    Scroll,
    Type,
    Hotkey,
    Wait,
    FinalAnswer,
}

impl ActionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim().to_ascii_lowercase().as_str() {
            "move" => ActionKind::Move,
            "click" => ActionKind::Click,
            "double_click" => ActionKind::DoubleClick,
            "mouse_down" => ActionKind::MouseDown,
            "mouse_up" => ActionKind::MouseUp,
            "drag" => ActionKind::Drag,
            "hover" => ActionKind::Hover,
            "scroll" => ActionKind::Scroll,
            "type" => ActionKind::Type,
            "hotkey" => ActionKind::Hotkey,
            "wait" => ActionKind::Wait,
            "final_answer" => ActionKind::FinalAnswer,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::MouseDown => "mouse_down",
            ActionKind::MouseUp => "mouse_up",
            ActionKind::Drag => "drag",
            ActionKind::Hover => "hover",
            ActionKind::Scroll => "scroll",
            ActionKind::Type => "type",
            ActionKind::Hotkey => "hotkey",
            ActionKind::Wait => "wait",
            ActionKind::FinalAnswer => "final_answer",
        }
    }
}

impl ActionIntent {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionIntent::Move { .. } => ActionKind::Move,
            ActionIntent::Click { .. } => ActionKind::Click,
            ActionIntent::DoubleClick { .. } => ActionKind::DoubleClick,
            ActionIntent::MouseDown { .. } => ActionKind::MouseDown,
            ActionIntent::MouseUp { .. } => ActionKind::MouseUp,
            ActionIntent::Drag { .. } => ActionKind::Drag,
            ActionIntent::Hover { .. } => ActionKind::Hover,
            ActionIntent::Scroll { .. } => ActionKind::Scroll,
            ActionIntent::Type { .. } => ActionKind::Type,
            ActionIntent::Hotkey { .. } => ActionKind::Hotkey,
            ActionIntent::Wait { .. } => ActionKind::Wait,
            ActionIntent::FinalAnswer { .. } => ActionKind::FinalAnswer,
        }
    }
}

/// Why an action block could not become an intent. Displayed text is fed
/// back to the model verbatim.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionFault {
    #[error("Error: action block must be a JSON object.")]
    NotAnObject,

    #[error("Error: action block has no 'action_type'.")]
    MissingKind,

    #[error("Error: Unknown action type '{0}'.")]
    UnknownKind(String),

    #[error("Error: Unknown point id '{0}'. Use an id that is printed on the current grid.")]
    UnknownPointId(String),

    #[error("Error: action {kind} requires '{param}'.")]
    MissingParam { kind: &'static str, param: &'static str },

    #[error("Error: invalid '{param}' for action {kind}: {value}")]
    InvalidParam {
        kind: &'static str,
        param: &'static str,
        value: String,
    },
}

const LINE_NOTCHES: u32 = 1;
const HALF_NOTCHES: u32 = 5;
const PAGE_NOTCHES: u32 = 10;

/// Upper bounds on model-supplied numbers. Anything above is rejected as a fault.
const MAX_WAIT_SECS: f64 = 60.0;
const MAX_MOTION_SECS: f64 = 10.0;
const MAX_CLICK_REPEAT: u32 = 3;
const MAX_SCROLL_NOTCHES: u32 = 50;

fn point_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*([GgLl])\s*[-_ ]?\s*(\d{1,3})\s*[-_ ,]\s*(\d{1,3})\s*$").ok())
        .as_ref()
}

/// `g-5-3`, `G_05_03`, `G 5 3` → `G-05-03`. Unrecognised shapes are upper-cased as-is.
pub fn normalize_point_id(raw: &str) -> String {
    if let Some(caps) = point_id_pattern().and_then(|re| re.captures(raw)) {
        let col: u32 = caps[2].parse().unwrap_or_default();
        let row: u32 = caps[3].parse().unwrap_or_default();
        return format!("{}-{:02}-{:02}", caps[1].to_ascii_uppercase(), col, row);
    }
    raw.trim().to_ascii_uppercase()
}

// ── Field coercion ───────────────────────────────────────────────────────────

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Reads fields of one action block on behalf of one action kind.
struct Fields<'a> {
    obj: &'a serde_json::Map<String, Value>,
    kind: ActionKind,
}

impl<'a> Fields<'a> {
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, param: &'static str, v: &Value) -> ResolutionFault {
        ResolutionFault::InvalidParam {
            kind: self.kind.as_str(),
            param,
            value: v.to_string(),
        }
    }

    fn missing(&self, param: &'static str) -> ResolutionFault {
        ResolutionFault::MissingParam {
            kind: self.kind.as_str(),
            param,
        }
    }

    fn seconds(&self, param: &'static str, default: f64, max: f64) -> Result<f64, ResolutionFault> {
        match self.get(param) {
            None => Ok(default),
            Some(v) => match as_f64(v) {
                Some(s) if s.is_finite() && (0.0..=max).contains(&s) => Ok(s),
                _ => Err(self.invalid(param, v)),
            },
        }
    }

    fn count(&self, param: &'static str, default: u32, max: u32) -> Result<u32, ResolutionFault> {
        match self.get(param) {
            None => Ok(default),
            Some(v) => match as_f64(v) {
                Some(n) if n >= 1.0 && n.fract() == 0.0 && n <= f64::from(max) => Ok(n as u32),
                _ => Err(self.invalid(param, v)),
            },
        }
    }

    fn flag(&self, param: &'static str) -> Result<bool, ResolutionFault> {
        match self.get(param) {
            None => Ok(false),
            Some(v) => as_bool(v).ok_or_else(|| self.invalid(param, v)),
        }
    }

    fn text(&self, params: &[&'static str]) -> Option<String> {
        params.iter().find_map(|p| match self.get(p)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
    }

    fn button(&self) -> Result<MouseButton, ResolutionFault> {
        let Some(v) = self.get("button") else {
            return Ok(MouseButton::Left);
        };
        match v.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("left") => Ok(MouseButton::Left),
            Some("right") => Ok(MouseButton::Right),
            Some("middle") => Ok(MouseButton::Middle),
            _ => Err(self.invalid("button", v)),
        }
    }

    fn point(&self, param: &'static str, map: &CoordinateMap) -> Result<Option<ResolvedPoint>, ResolutionFault> {
        let Some(v) = self.get(param) else {
            return Ok(None);
        };
        let Some(raw) = v.as_str() else {
            return Err(self.invalid(param, v));
        };
        let id = normalize_point_id(raw);
        match map.get(&id) {
            Some(pixel) => Ok(Some(ResolvedPoint { id, pixel })),
            None => Err(ResolutionFault::UnknownPointId(raw.trim().to_string())),
        }
    }
}

pub struct ActionResolver;

impl ActionResolver {
    pub fn resolve(block: &Value, map: &CoordinateMap) -> Result<ActionIntent, ResolutionFault> {
        let obj = block.as_object().ok_or(ResolutionFault::NotAnObject)?;
        let raw_kind = obj
            .get("action_type")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .ok_or(ResolutionFault::MissingKind)?;
        let kind = ActionKind::parse(raw_kind)
            .ok_or_else(|| ResolutionFault::UnknownKind(raw_kind.to_string()))?;
        let f = Fields { obj, kind };

        let intent = match kind {
            ActionKind::Move => ActionIntent::Move {
                target: f.point("point_id", map)?.ok_or_else(|| f.missing("point_id"))?,
                duration: f.seconds("duration", 0.5, MAX_MOTION_SECS)?,
            },
            ActionKind::Click => ActionIntent::Click {
                button: f.button()?,
                count: f.count("repeat", 1, MAX_CLICK_REPEAT)?,
            },
            ActionKind::DoubleClick => ActionIntent::DoubleClick { button: f.button()? },
            ActionKind::MouseDown => ActionIntent::MouseDown { button: f.button()? },
            ActionKind::MouseUp => ActionIntent::MouseUp { button: f.button()? },
            ActionKind::Drag => ActionIntent::Drag {
                from: f.point("from_point_id", map)?,
                to: f.point("to_point_id", map)?.ok_or_else(|| f.missing("to_point_id"))?,
                duration: f.seconds("duration", 1.0, MAX_MOTION_SECS)?,
            },
            ActionKind::Hover => ActionIntent::Hover {
                seconds: f.seconds("duration", 1.0, MAX_WAIT_SECS)?,
            },
            ActionKind::Scroll => Self::scroll(&f)?,
            ActionKind::Type => ActionIntent::Type {
                text: f.text(&["text"]).ok_or_else(|| f.missing("text"))?,
                submit: f.flag("submit")?,
            },
            ActionKind::Hotkey => ActionIntent::Hotkey { keys: Self::keys(&f)? },
            ActionKind::Wait => ActionIntent::Wait {
                seconds: f.seconds("seconds", 1.0, MAX_WAIT_SECS)?,
            },
            ActionKind::FinalAnswer => ActionIntent::FinalAnswer {
                answer: f.text(&["answer", "summary", "text"]).unwrap_or_default(),
            },
        };
        Ok(intent)
    }

    fn scroll(f: &Fields<'_>) -> Result<ActionIntent, ResolutionFault> {
        let direction = match f.get("direction") {
            None => ScrollDirection::Down,
            Some(v) => match v.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
                Some("up") => ScrollDirection::Up,
                Some("down") => ScrollDirection::Down,
                Some("left") => ScrollDirection::Left,
                Some("right") => ScrollDirection::Right,
                _ => return Err(f.invalid("direction", v)),
            },
        };
        let (notches, label) = match f.get("amount") {
            None => (LINE_NOTCHES, "line".to_string()),
            Some(v) => match v.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
                Some("line") => (LINE_NOTCHES, "line".to_string()),
                Some("half") => (HALF_NOTCHES, "half".to_string()),
                Some("page") => (PAGE_NOTCHES, "page".to_string()),
                _ => {
                    let n = f.count("amount", LINE_NOTCHES, MAX_SCROLL_NOTCHES)?;
                    (n, n.to_string())
                }
            },
        };
        Ok(ActionIntent::Scroll {
            direction,
            notches,
            label,
        })
    }

    fn keys(f: &Fields<'_>) -> Result<Vec<String>, ResolutionFault> {
        let v = f.get("keys").ok_or_else(|| f.missing("keys"))?;
        let keys: Vec<String> = match v {
            Value::Array(items) => items
                .iter()
                .map(|k| k.as_str().map(|s| s.trim().to_string()).ok_or_else(|| f.invalid("keys", v)))
                .collect::<Result<_, _>>()?,
            Value::String(s) => s.split('+').map(|k| k.trim().to_string()).collect(),
            _ => return Err(f.invalid("keys", v)),
        };
        let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
        if keys.is_empty() {
            return Err(f.invalid("keys", v));
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid() -> CoordinateMap {
        let mut map = CoordinateMap::new();
        map.insert("G-05-03".into(), (500, 300));
        map.insert("L-00-01".into(), (710, 320));
        map
    }

    #[test]
    fn move_resolves_against_current_map() {
        let intent = ActionResolver::resolve(&json!({"action_type": "move", "point_id": "G-05-03"}), &grid()).unwrap();
        assert_eq!(
            intent,
            ActionIntent::Move {
                target: ResolvedPoint {
                    id: "G-05-03".into(),
                    pixel: (500, 300)
                },
                duration: 0.5
            }
        );
    }

    #[test]
    fn point_ids_are_normalized() {
        assert_eq!(normalize_point_id("g-5-3"), "G-05-03");
        assert_eq!(normalize_point_id(" L_0_1 "), "L-00-01");
        let intent = ActionResolver::resolve(&json!({"type": "move", "point_id": "g-5-3"}), &grid()).unwrap();
        assert_eq!(intent.kind(), ActionKind::Move);
    }

    #[test]
    fn unknown_point_is_named_in_fault() {
        let err = ActionResolver::resolve(&json!({"action_type": "move", "point_id": "G-99-99"}), &grid()).unwrap_err();
        assert_eq!(err, ResolutionFault::UnknownPointId("G-99-99".into()));
        assert!(err.to_string().contains("G-99-99"));
    }

    #[test]
    fn unknown_kind_and_non_object() {
        assert_eq!(
            ActionResolver::resolve(&json!({"action_type": "teleport"}), &grid()),
            Err(ResolutionFault::UnknownKind("teleport".into()))
        );
        assert_eq!(ActionResolver::resolve(&json!([1, 2]), &grid()), Err(ResolutionFault::NotAnObject));
    }

    #[test]
    fn scroll_amounts_and_signs() {
        let page = ActionResolver::resolve(&json!({"action_type": "scroll", "direction": "up", "amount": "page"}), &grid()).unwrap();
        match page {
            ActionIntent::Scroll { direction, notches, .. } => {
                assert_eq!(notches, 10);
                assert_eq!(direction.sign(), -1);
                assert_eq!(direction.axis(), ScrollAxis::Vertical);
            }
            other => panic!("unexpected intent: {other:?}"),
        }
        let right = ActionResolver::resolve(&json!({"action_type": "scroll", "direction": "right", "amount": "3"}), &grid()).unwrap();
        match right {
            ActionIntent::Scroll { direction, notches, .. } => {
                assert_eq!(notches, 3);
                assert_eq!(direction.sign(), 1);
                assert_eq!(direction.axis(), ScrollAxis::Horizontal);
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn numeric_and_boolean_strings_are_accepted() {
        let click = ActionResolver::resolve(&json!({"action_type": "click", "button": "right", "repeat": "2"}), &grid()).unwrap();
        assert_eq!(
            click,
            ActionIntent::Click {
                button: MouseButton::Right,
                count: 2
            }
        );
        let typed = ActionResolver::resolve(&json!({"action_type": "type", "text": "hi", "submit": "true"}), &grid()).unwrap();
        assert_eq!(
            typed,
            ActionIntent::Type {
                text: "hi".into(),
                submit: true
            }
        );
    }

    #[test]
    fn hotkey_accepts_list_or_plus_string() {
        let a = ActionResolver::resolve(&json!({"action_type": "hotkey", "keys": ["ctrl", "c"]}), &grid()).unwrap();
        let b = ActionResolver::resolve(&json!({"action_type": "hotkey", "keys": "ctrl+c"}), &grid()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn drag_resolves_both_ends() {
        let intent = ActionResolver::resolve(
            &json!({"action_type": "drag", "from_point_id": "G-05-03", "to_point_id": "L-00-01"}),
            &grid(),
        )
        .unwrap();
        match intent {
            ActionIntent::Drag { from, to, duration } => {
                assert_eq!(from.map(|p| p.pixel), Some((500, 300)));
                assert_eq!(to.pixel, (710, 320));
                assert_eq!(duration, 1.0);
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn final_answer_reads_fallback_fields() {
        let intent = ActionResolver::resolve(&json!({"action_type": "final_answer", "summary": "done"}), &grid()).unwrap();
        assert_eq!(intent, ActionIntent::FinalAnswer { answer: "done".into() });
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let cases = [
            (json!({"action_type": "wait", "seconds": 1e20}), "wait", "seconds"),
            (json!({"action_type": "hover", "duration": 1e20}), "hover", "duration"),
            (json!({"action_type": "move", "point_id": "G-05-03", "duration": 1e20}), "move", "duration"),
            (json!({"action_type": "drag", "to_point_id": "L-00-01", "duration": 1e20}), "drag", "duration"),
        ];
        for (block, kind, param) in cases {
            match ActionResolver::resolve(&block, &grid()) {
                Err(ResolutionFault::InvalidParam { kind: k, param: p, .. }) => {
                    assert_eq!((k, p), (kind, param));
                }
                other => panic!("{kind}: expected InvalidParam, got {other:?}"),
            }
        }
        let ok = ActionResolver::resolve(&json!({"action_type": "wait", "seconds": 60}), &grid()).unwrap();
        assert_eq!(ok, ActionIntent::Wait { seconds: 60.0 });
        assert!(ActionResolver::resolve(&json!({"action_type": "move", "point_id": "G-05-03", "duration": 11}), &grid()).is_err());
    }

    #[test]
    fn click_repeat_and_scroll_amount_are_bounded() {
        let click = ActionResolver::resolve(&json!({"action_type": "click", "repeat": 3}), &grid()).unwrap();
        assert_eq!(
            click,
            ActionIntent::Click {
                button: MouseButton::Left,
                count: 3
            }
        );
        let err = ActionResolver::resolve(&json!({"action_type": "click", "repeat": 1000000}), &grid()).unwrap_err();
        assert!(matches!(err, ResolutionFault::InvalidParam { param: "repeat", .. }));

        let scroll = ActionResolver::resolve(&json!({"action_type": "scroll", "amount": 50}), &grid()).unwrap();
        assert!(matches!(scroll, ActionIntent::Scroll { notches: 50, .. }));
        let err = ActionResolver::resolve(&json!({"action_type": "scroll", "amount": 51}), &grid()).unwrap_err();
        assert!(matches!(err, ResolutionFault::InvalidParam { param: "amount", .. }));
    }

    #[test]
    fn move_without_point_is_missing_param() {
        let err = ActionResolver::resolve(&json!({"action_type": "move"}), &grid()).unwrap_err();
        assert_eq!(
            err,
            ResolutionFault::MissingParam {
                kind: "move",
                param: "point_id"
            }
        );
    }
}
