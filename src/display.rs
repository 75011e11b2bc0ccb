use std::io::Write;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Messages from the worker to the main-thread display.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// One complete line.
    Log(String),
    /// Part of a streamed model reply, printed without a newline.
    Fragment(String),
    /// The streamed reply ended; terminates the fragment line.
    EndStream,
    /// Boxed heading, e.g. the step number.
    Banner(String),
    /// Hold output back while the screen is being captured.
    Pause,
    Resume,
    Shutdown,
}

/// Worker-side sender. Sends never block and never fail loudly: once the
/// display is gone there is nobody left to tell.
#[derive(Debug, Clone)]
pub struct DisplayHandle {
    tx: UnboundedSender<DisplayEvent>,
}

impl DisplayHandle {
    pub fn channel() -> (Self, UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: DisplayEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("display closed, event dropped");
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(DisplayEvent::Log(line.into()));
    }

    pub fn fragment(&self, text: impl Into<String>) {
        self.send(DisplayEvent::Fragment(text.into()));
    }

    pub fn end_stream(&self) {
        self.send(DisplayEvent::EndStream);
    }

    pub fn banner(&self, title: impl Into<String>) {
        self.send(DisplayEvent::Banner(title.into()));
    }

    pub fn pause(&self) {
        self.send(DisplayEvent::Pause);
    }

    pub fn resume(&self) {
        self.send(DisplayEvent::Resume);
    }

    pub fn shutdown(&self) {
        self.send(DisplayEvent::Shutdown);
    }
}

/// Where display events end up.
pub trait DisplaySink {
    /// Returns `false` once the sink wants the loop to stop.
    fn apply(&mut self, event: DisplayEvent) -> bool;
}

/// Append-only text output. While paused, rendered text is buffered and
/// written out on resume.
pub struct TerminalSink<W: Write> {
    out: W,
    paused: bool,
    held: String,
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            paused: false,
            held: String::new(),
        }
    }

    fn emit(&mut self, text: &str) {
        if self.paused {
            self.held.push_str(text);
            return;
        }
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::warn!("display write failed: {e}");
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for TerminalSink<W> {
    fn apply(&mut self, event: DisplayEvent) -> bool {
        match event {
            DisplayEvent::Log(line) => self.emit(&format!("{line}\n")),
            DisplayEvent::Fragment(text) => self.emit(&text),
            DisplayEvent::EndStream => self.emit("\n"),
            DisplayEvent::Banner(title) => self.emit(&boxed(&title)),
            DisplayEvent::Pause => self.paused = true,
            DisplayEvent::Resume => {
                self.paused = false;
                let held = std::mem::take(&mut self.held);
                if !held.is_empty() {
                    self.emit(&held);
                }
            }
            DisplayEvent::Shutdown => {
                self.paused = false;
                let held = std::mem::take(&mut self.held);
                self.emit(&held);
                return false;
            }
        }
        true
    }
}

/// Frame `title` in a box, one line per input line.
pub fn boxed(title: &str) -> String {
    let width = title.lines().map(|l| l.chars().count()).max().unwrap_or(0);
    let rule = format!("+{}+\n", "-".repeat(width + 2));
    let mut out = rule.clone();
    for line in title.lines() {
        let pad = width - line.chars().count();
        out.push_str(&format!("| {line}{} |\n", " ".repeat(pad)));
    }
    out.push_str(&rule);
    out
}

pub fn print_boxed(title: &str) {
    print!("{}", boxed(title));
}

/// Drain the mailbox every `tick` until shutdown or until every handle is
/// dropped. `on_tick` runs once per idle tick on the calling thread.
pub fn run_display_loop(
    mut rx: UnboundedReceiver<DisplayEvent>,
    sink: &mut dyn DisplaySink,
    tick: Duration,
    mut on_tick: impl FnMut(),
) {
    loop {
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    if !sink.apply(event) {
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("display channel closed");
                    return;
                }
            }
        }
        on_tick();
        thread::sleep(tick);
    }
}
