// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::deploy::DeploymentStatus;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines, warnings, and the final result
    Normal,
    /// Only the final result and problems, for CI logs
    Quiet,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    started: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: None,
        }
    }

    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    fn elapsed(&self) -> Option<f64> {
        self.started.map(|t| t.elapsed().as_secs_f64())
    }

    /// Intermediate steps. Shown in normal mode only.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn warning(&self, message: &str) {
        self.report("warning", "Warning: ", message);
    }

    pub fn error(&self, message: &str) {
        self.report("error", "Error: ", message);
    }

    pub fn success(&self, message: &str) {
        match (self.mode, self.elapsed()) {
            (OutputMode::Json, _) => self.json_event("success", message, Stream::Stdout),
            (OutputMode::Normal, Some(secs)) => println!("{message} ({secs:.1}s)"),
            _ => println!("{message}"),
        }
    }

    /// One deployment: a summary line, or the full record in JSON mode.
    pub fn deployment(&self, status: &DeploymentStatus) {
        if self.mode == OutputMode::Json {
            write_json(status, Stream::Stdout);
            return;
        }

        let outcome = match status.outcome {
            Some(outcome) => outcome.to_string(),
            None => "in progress".to_string(),
        };
        let pools = match (status.previous_pool, status.target_pool) {
            (Some(from), Some(to)) => format!(" {from}->{to}"),
            _ => String::new(),
        };
        println!(
            "{} {} {}{} [{}] {}",
            status.id,
            status.image,
            status.phase,
            pools,
            outcome,
            status.reason.as_deref().unwrap_or("")
        );
    }

    /// Problems go to stderr in every mode.
    fn report(&self, event: &str, prefix: &str, message: &str) {
        match self.mode {
            OutputMode::Json => self.json_event(event, message, Stream::Stderr),
            OutputMode::Normal | OutputMode::Quiet => eprintln!("{prefix}{message}"),
        }
    }

    fn json_event(&self, event: &str, message: &str, stream: Stream) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.elapsed(),
        };
        write_json(&event, stream);
    }
}

fn write_json<T: Serialize>(value: &T, stream: Stream) {
    let Ok(json) = serde_json::to_string(value) else {
        return;
    };
    match stream {
        Stream::Stdout => println!("{json}"),
        Stream::Stderr => eprintln!("{json}"),
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
