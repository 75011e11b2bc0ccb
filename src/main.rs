use std::process::ExitCode;

use clap::Parser;

use gridclaw_lib::cli::{countdown, print_task_instructions, read_task, Cli};
use gridclaw_lib::config::load_config;
use gridclaw_lib::display::print_boxed;

fn main() -> ExitCode {
    let cli = Cli::parse();
    gridclaw_lib::init_tracing();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let task = match cli.task {
        Some(task) => task.trim().to_string(),
        None => {
            print_task_instructions();
            read_task(std::io::stdin().lock())
        }
    };
    if task.is_empty() {
        print_boxed("No task entered, nothing to do.");
        return ExitCode::SUCCESS;
    }

    countdown(cli.countdown);

    match gridclaw_lib::run(config, task) {
        Ok(result) => {
            tracing::info!(reason = ?result.terminal, "run complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
