pub mod agent_engine;
pub mod cli;
pub mod config;
pub mod display;
pub mod errors;
pub mod executor;
pub mod kill_switch;
pub mod llm;
pub mod memory;
pub mod perception;

use std::thread;
use std::time::Duration;

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::state::StepResult;
use crate::config::AppConfig;
use crate::display::{run_display_loop, DisplayHandle, TerminalSink};
use crate::errors::{GridClawError, GridClawResult};
use crate::kill_switch::KillSwitch;

/// Structured logs go to stderr; stdout belongs to the display sink.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Run one task to completion.
///
/// The step loop runs on a worker thread with its own current-thread runtime.
/// The calling thread drains the display mailbox and watches the kill switch
/// until the worker is done.
pub fn run(config: AppConfig, task: String) -> GridClawResult<StepResult> {
    let mut hotkey = match KillSwitch::install(&config.kill_switch) {
        Ok(k) => Some(k),
        Err(e @ GridClawError::Config(_)) => return Err(e),
        Err(e) => {
            tracing::warn!("kill switch unavailable, stop with Ctrl+C instead: {e}");
            None
        }
    };

    let (display, rx) = DisplayHandle::channel();
    let tick = Duration::from_millis(config.display.tick_ms);
    let worker = thread::Builder::new()
        .name("gridclaw-agent".into())
        .spawn(move || run_worker(config, task, display))?;

    let mut sink = TerminalSink::stdout();
    run_display_loop(rx, &mut sink, tick, || {
        if hotkey.as_mut().is_some_and(KillSwitch::poll) {
            kill_switch::terminate();
        }
    });

    worker
        .join()
        .map_err(|_| GridClawError::Agent("agent thread panicked".into()))?
}

fn run_worker(config: AppConfig, task: String, display: DisplayHandle) -> GridClawResult<StepResult> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        let mut engine = AgentEngine::from_config(&config, &task, display.clone())?;
        display.log(format!("Starting task: {task}"));
        Ok::<_, GridClawError>(engine.run().await)
    });

    match &result {
        Ok(r) => display.banner(format!("Final Result:\n{}", r.feedback)),
        Err(e) => {
            tracing::error!(error = %e, "agent failed to start");
            display.banner(format!("Error: {e}"));
        }
    }
    display.shutdown();
    result
}
