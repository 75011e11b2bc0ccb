pub mod engine;
pub mod history;
pub mod loop_control;
pub mod prompt;
pub mod repair;
pub mod scanner;
pub mod state;
