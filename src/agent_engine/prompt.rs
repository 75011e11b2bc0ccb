use crate::agent_engine::scanner::{CLOSE_TAG, OPEN_TAG};
use crate::agent_engine::state::TASK_COMPLETED_SENTINEL;
use crate::config::{CompletionProtocol, VisionConfig};

/// User turn appended to every step, after the two views.
pub const STEP_QUERY: &str = "\
## Current Step
1. Analyze the Global View to understand the overall screen layout.
2. Analyze the Local View to verify the precise mouse position.
3. Based on the task history and current visual state, determine the next action.";

const ROLE: &str = "\
## Role
You are GridClaw, a desktop automation agent. You complete the user's task by \
operating the mouse and keyboard, one action at a time, observing the screen \
after every action.";

const VOCABULARY: &str = r#"### Actions
Pointer:
- move: `point_id` (required), `duration` (seconds, default 0.5, at most 10)
  {"action_type": "move", "point_id": "G-05-03"}
- click: `button` ("left"|"right"|"middle", default "left"), `repeat` (1 to 3, default 1)
  {"action_type": "click", "button": "left", "repeat": 1}
- double_click: `button` (default "left")
- mouse_down / mouse_up: `button` (default "left")
- drag: `to_point_id` (required), `from_point_id` (optional, default: current position), `duration` (default 1.0, at most 10)
  {"action_type": "drag", "from_point_id": "L-03-04", "to_point_id": "G-08-02"}
- hover: stay still for `duration` seconds (default 1.0, at most 60), e.g. to reveal a tooltip
- scroll: `direction` ("up"|"down"|"left"|"right", default "down"), `amount` ("line"|"half"|"page" or 1 to 50 wheel notches)
  {"action_type": "scroll", "direction": "down", "amount": "page"}
Keyboard:
- type: `text` (required), `submit` (press Enter afterwards, default false)
  {"action_type": "type", "text": "hello world", "submit": true}
- hotkey: `keys` (list of key names, pressed in order and released in reverse)
  {"action_type": "hotkey", "keys": ["ctrl", "c"]}
Other:
- wait: `seconds` (default 1.0, at most 60)
  {"action_type": "wait", "seconds": 2}"#;

/// Build the system prompt for the configured grid and completion protocol.
pub fn system_prompt(vision: &VisionConfig, protocol: CompletionProtocol) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(ROLE);
    out.push_str("\n\n");
    out.push_str(&perception_section(vision));
    out.push_str("\n\n");
    out.push_str(&format_section());
    out.push_str("\n\n");
    out.push_str(VOCABULARY);
    out.push('\n');
    out.push_str(&completion_section(protocol));
    out.push_str("\n\n");
    out.push_str(RULES);
    out
}

fn perception_section(v: &VisionConfig) -> String {
    format!(
        "## What you see\n\
         Each step carries two images.\n\
         - Global View: the whole screen with a {grid_color} grid every {g}px. \
         Every intersection is a point with an id `G-cc-rr` (column, row; two digits, \
         zero-based). The column index is printed along the top and bottom edges, \
         the row index along the left and right edges.\n\
         - Local View: a {crop}x{crop} crop around the mouse cursor with a finer grid \
         every {l}px, ids `L-cc-rr`. The cursor is drawn as a {mouse_color} circle \
         labelled with its position.\n\
         You never give raw coordinates. Every pointer target is a point id that \
         is printed on the current step's images; ids from earlier steps may no \
         longer exist.",
        grid_color = v.grid_color,
        g = v.grid_step,
        l = v.local_grid_step,
        crop = v.crop_size,
        mouse_color = v.mouse_color,
    )
}

fn format_section() -> String {
    format!(
        "## Response format\n\
         Reason briefly about the screen and the task, then emit exactly one \
         action as JSON between tags:\n\
         {OPEN_TAG}\n{{\"action_type\": \"click\", \"button\": \"left\"}}\n{CLOSE_TAG}\n\
         Anything after the closing tag is ignored."
    )
}

fn completion_section(protocol: CompletionProtocol) -> String {
    let finish = match protocol {
        CompletionProtocol::FinalAnswerAction | CompletionProtocol::Either => {
            "When the task is done, emit `final_answer`. Do not emit it earlier."
        }
        CompletionProtocol::FeedbackSentinel => {
            "When the task is done, emit `final_answer`; the run ends once an \
             Execution Result starts with the completion marker."
        }
    };
    format!(
        "- final_answer: `answer` (short summary of the outcome)\n  \
         {{\"action_type\": \"final_answer\", \"answer\": \"The file is saved.\"}}\n\n\
         ## Finishing\n{finish} Its Execution Result reads `{TASK_COMPLETED_SENTINEL} <answer>`."
    )
}

const RULES: &str = "\
## Rules
- One action per response. The screen is captured again before your next turn.
- Check the Local View before clicking. If the cursor is not over the target, \
move first and click on the next step.
- Prefer Local View ids for small targets near the cursor.
- If an action fails, read the Execution Result and try a different approach.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_reflects_grid_settings() {
        let mut v = VisionConfig::default();
        v.grid_step = 80;
        v.local_grid_step = 25;
        let p = system_prompt(&v, CompletionProtocol::Either);
        assert!(p.contains("every 80px"));
        assert!(p.contains("every 25px"));
        assert!(p.contains("<action>"));
        assert!(p.contains("drag"));
        assert!(p.contains("final_answer"));
    }

    #[test]
    fn every_protocol_documents_the_marker() {
        for protocol in [
            CompletionProtocol::FinalAnswerAction,
            CompletionProtocol::FeedbackSentinel,
            CompletionProtocol::Either,
        ] {
            let p = system_prompt(&VisionConfig::default(), protocol);
            assert!(p.contains(TASK_COMPLETED_SENTINEL));
        }
    }
}
