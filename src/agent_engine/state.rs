use serde::{Deserialize, Serialize};

/// Feedback returned once the step budget is spent.
pub const MAX_STEPS_SENTINEL: &str = "[Max Steps Reached]";
/// Marks feedback that ends the task.
pub const TASK_COMPLETED_SENTINEL: &str = "[Task Completed]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps,
    Completed,
}

/// Where the orchestrator is within the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepPhase {
    Idle,
    Perceiving,
    Reasoning,
    Parsing,
    Resolving,
    Recording,
    Stopped { reason: StopReason },
}

/// Outcome of one perceive → reason → act cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub feedback: String,
    pub terminal: Option<StopReason>,
}

impl StepResult {
    pub fn running(feedback: String) -> Self {
        Self {
            feedback,
            terminal: None,
        }
    }

    pub fn stopped(feedback: String, reason: StopReason) -> Self {
        Self {
            feedback,
            terminal: Some(reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}
