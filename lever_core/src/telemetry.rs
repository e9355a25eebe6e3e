//! Trial telemetry lines.
//!
//! These are a wire contract read by the acquisition side, not log records:
//!
//! ```text
//! TRIAL,<CORRECT|TIMEOUT>,<reaction_time_ms>,<final_position>
//! EVENT,<NAME>,<trial_number>,<timestamp_us>
//! ```

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::event::EventCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Correct,
    Timeout,
}

impl TrialOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "CORRECT",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl core::fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn trial_line(outcome: TrialOutcome, reaction_time_ms: u64, final_position: i32) -> String {
    format!("TRIAL,{outcome},{reaction_time_ms},{final_position}")
}

pub fn event_line(code: EventCode, trial_number: u32, timestamp_us: u64) -> String {
    format!("EVENT,{code},{trial_number},{timestamp_us}")
}

pub trait TelemetrySink: Send {
    fn emit(&mut self, line: &str);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn emit(&mut self, line: &str) {
        (**self).emit(line);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl TelemetrySink for StdoutSink {
    fn emit(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "telemetry write to stdout failed");
        }
    }
}

/// Appends lines to a file, flushing each one.
#[derive(Debug)]
pub struct FileSink {
    file: std::fs::File,
}

impl FileSink {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }
}

impl TelemetrySink for FileSink {
    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.file, "{line}").and_then(|()| self.file.flush()) {
            tracing::warn!(error = %e, "telemetry write to file failed");
        }
    }
}

/// Keeps lines in memory; clones share the buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Lines starting with `prefix`, e.g. `"TRIAL,"`.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.starts_with(prefix))
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&mut self, line: &str) {
        if let Ok(mut v) = self.lines.lock() {
            v.push(line.to_owned());
        }
    }
}
