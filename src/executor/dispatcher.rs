use crate::agent_engine::state::TASK_COMPLETED_SENTINEL;
use crate::errors::GridClawResult;
use crate::executor::input::InputInjector;
use crate::executor::resolver::{ActionIntent, MouseButton};

/// Grab-confirm pause between pressing the button and starting a drag.
const DRAG_GRAB_SECS: f64 = 0.1;

/// Execute one intent and describe the outcome for the model.
/// Injection errors become feedback text; nothing here is fatal.
pub fn dispatch(intent: &ActionIntent, injector: &mut dyn InputInjector) -> String {
    let kind = intent.kind().as_str();
    tracing::info!(action = kind, "dispatching action");
    match execute(intent, injector) {
        Ok(feedback) => feedback,
        Err(e) => {
            tracing::warn!(action = kind, "action failed: {e}");
            format!("Error executing action {kind}: {e}")
        }
    }
}

fn execute(intent: &ActionIntent, inj: &mut dyn InputInjector) -> GridClawResult<String> {
    let feedback = match intent {
        ActionIntent::Move { target, duration } => {
            inj.move_to(target.pixel.0, target.pixel.1, *duration)?;
            format!(
                "Action move to {} ({}, {}) executed.",
                target.id, target.pixel.0, target.pixel.1
            )
        }
        ActionIntent::Click { button, count } => {
            inj.click(*button, *count)?;
            format!("Action click ({}, repeat={}) executed.", button.as_str(), count)
        }
        ActionIntent::DoubleClick { button } => {
            inj.click(*button, 2)?;
            format!("Action double_click ({}) executed.", button.as_str())
        }
        ActionIntent::MouseDown { button } => {
            inj.button_down(*button)?;
            format!("Action mouse_down ({}) executed.", button.as_str())
        }
        ActionIntent::MouseUp { button } => {
            inj.button_up(*button)?;
            format!("Action mouse_up ({}) executed.", button.as_str())
        }
        ActionIntent::Drag { from, to, duration } => {
            if let Some(from) = from {
                inj.move_to(from.pixel.0, from.pixel.1, 0.2)?;
            }
            inj.button_down(MouseButton::Left)?;
            let moved = inj
                .wait(DRAG_GRAB_SECS)
                .and_then(|_| inj.move_to(to.pixel.0, to.pixel.1, *duration));
            // Release even when the move failed, so the button is never left held.
            let released = inj.button_up(MouseButton::Left);
            moved?;
            released?;
            format!(
                "Action drag to {} ({}, {}) executed.",
                to.id, to.pixel.0, to.pixel.1
            )
        }
        ActionIntent::Hover { seconds } => {
            inj.wait(*seconds)?;
            format!("Action hover for {seconds}s executed.")
        }
        ActionIntent::Scroll {
            direction,
            notches,
            label,
        } => {
            inj.scroll(direction.axis(), *notches, direction.sign())?;
            format!("Action scroll {} {} executed.", direction.as_str(), label)
        }
        ActionIntent::Type { text, submit } => {
            inj.type_text(text, *submit)?;
            if *submit {
                format!("Action type '{text}' and submit executed.")
            } else {
                format!("Action type '{text}' executed.")
            }
        }
        ActionIntent::Hotkey { keys } => {
            inj.hotkey(keys)?;
            format!("Action hotkey {} executed.", keys.join("+"))
        }
        ActionIntent::Wait { seconds } => {
            inj.wait(*seconds)?;
            format!("Action wait {seconds}s executed.")
        }
        ActionIntent::FinalAnswer { answer } => format!("{TASK_COMPLETED_SENTINEL} {answer}"),
    };
    Ok(feedback)
}
