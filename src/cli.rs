use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use crate::display::print_boxed;

/// Line that ends interactive task entry.
pub const START_MARKER: &str = "[START]";

#[derive(Parser, Clone, Debug)]
#[command(name = "gridclaw", version, about = "Grid-indexed desktop automation agent")]
pub struct Cli {
    /// Path to config.toml (defaults: next to the executable, then the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Task to perform; when omitted it is read from stdin
    #[arg(long)]
    pub task: Option<String>,

    /// Seconds to arrange the screen before the first step; Enter skips the wait
    #[arg(long, default_value_t = 5)]
    pub countdown: u64,
}

pub fn print_task_instructions() {
    print_boxed(&format!(
        "Enter the task (multiple lines are fine).\nFinish with a line containing {START_MARKER}."
    ));
}

/// Collect lines until one contains the start marker or input ends.
/// Text before the marker on that line is kept.
pub fn read_task(input: impl BufRead) -> String {
    let mut lines = Vec::new();
    for line in input.lines() {
        let Ok(line) = line else { break };
        if let Some((head, _)) = line.split_once(START_MARKER) {
            if !head.trim().is_empty() {
                lines.push(head.to_string());
            }
            break;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

/// Give the user `seconds` to prepare the screen. Pressing Enter starts at once.
pub fn countdown(seconds: u64) {
    if seconds == 0 {
        return;
    }
    print_boxed(&format!(
        "You have {seconds} seconds to bring the screen to the task's start state.\n\
         Press Enter to start immediately."
    ));

    let (tx, rx) = mpsc::channel();
    // The reader stays blocked on stdin if the time runs out; it is detached.
    thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_ok() {
            let _ = tx.send(());
        }
    });

    for remaining in (1..=seconds).rev() {
        println!("Starting in {remaining}...");
        if rx.recv_timeout(Duration::from_secs(1)).is_ok() {
            print_boxed("Enter detected, starting now.");
            return;
        }
    }
    print_boxed("Time is up, starting the task.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn task_ends_at_marker_line() {
        let input = Cursor::new("open the browser\nsearch for rust\n[START]\nignored\n");
        assert_eq!(read_task(input), "open the browser\nsearch for rust");
    }

    #[test]
    fn text_before_marker_is_kept() {
        let input = Cursor::new("open notepad [START]");
        assert_eq!(read_task(input), "open notepad");
    }

    #[test]
    fn empty_input_gives_empty_task() {
        assert_eq!(read_task(Cursor::new("\n\n[START]\n")), "");
        assert_eq!(read_task(Cursor::new("")), "");
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from(["gridclaw", "--task", "open mail", "--countdown", "0"]);
        assert_eq!(cli.task.as_deref(), Some("open mail"));
        assert_eq!(cli.countdown, 0);
        assert!(cli.config.is_none());
    }
}
