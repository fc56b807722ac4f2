//! Leveled status output
//!
//! Every component reports through an injected [`StatusReporter`] rather
//! than printing directly, so the same workflow can render for a terminal,
//! for CI as JSON lines, or into memory for tests.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use console::{StyledObject, style};
use serde::{Deserialize, Serialize};

/// Severity of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    fn symbol(&self) -> &'static str {
        match self {
            Level::Info => "ℹ",
            Level::Success => "✓",
            Level::Warning => "⚠",
            Level::Error => "✗",
        }
    }

    fn styled_symbol(&self) -> StyledObject<&'static str> {
        match self {
            Level::Info => style(self.symbol()).blue(),
            Level::Success => style(self.symbol()).green(),
            Level::Warning => style(self.symbol()).yellow(),
            Level::Error => style(self.symbol()).red(),
        }
    }
}

/// Sink for human-readable progress and results
pub trait StatusReporter: Send + Sync {
    /// Emit one leveled message
    fn report(&self, level: Level, message: &str);

    /// A workflow phase is starting
    fn phase_started(&self, name: &str, index: usize, total: usize);

    /// One polling interval passed without the condition holding
    fn progress(&self, description: &str, elapsed: Duration, timeout: Duration);

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.report(Level::Success, message);
    }

    fn warn(&self, message: &str) {
        self.report(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }
}

/// Reporter handle shared by all components of a run
pub type SharedReporter = Arc<dyn StatusReporter>;

/// Terminal reporter writing styled lines to stderr
pub struct ConsoleReporter {
    colors: bool,
    verbose: bool,
    /// Progress dots printed since the last full line
    dots_pending: AtomicBool,
}

impl ConsoleReporter {
    /// Create a reporter honoring the terminal's color support
    pub fn new() -> Self {
        Self {
            colors: console::colors_enabled_stderr(),
            verbose: false,
            dots_pending: AtomicBool::new(false),
        }
    }

    /// Force colors on or off
    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    /// Print one line per polling interval instead of a dot
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    fn paint<D>(&self, styled: StyledObject<D>) -> StyledObject<D> {
        styled.force_styling(self.colors)
    }

    fn finish_dots(&self) {
        if self.dots_pending.swap(false, Ordering::SeqCst) {
            let _ = writeln!(io::stderr());
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for ConsoleReporter {
    fn report(&self, level: Level, message: &str) {
        self.finish_dots();
        let _ = writeln!(
            io::stderr(),
            "  {} {}",
            self.paint(level.styled_symbol()),
            message
        );
    }

    fn phase_started(&self, name: &str, index: usize, total: usize) {
        self.finish_dots();
        let _ = writeln!(
            io::stderr(),
            "\n{} {} {}",
            self.paint(style("▶").cyan().bold()),
            self.paint(style(name).bold()),
            self.paint(style(format!("[{}/{}]", index + 1, total)).dim())
        );
    }

    fn progress(&self, description: &str, elapsed: Duration, timeout: Duration) {
        if self.verbose {
            self.finish_dots();
            let _ = writeln!(
                io::stderr(),
                "  {} {} ({}s/{}s)",
                self.paint(style("◕").yellow()),
                self.paint(style(format!("waiting for {}", description)).dim()),
                elapsed.as_secs(),
                timeout.as_secs()
            );
        } else {
            self.dots_pending.store(true, Ordering::SeqCst);
            let _ = write!(io::stderr(), "{}", self.paint(style(".").dim()));
            let _ = io::stderr().flush();
        }
    }
}

/// Reporter that only surfaces warnings and errors
pub struct QuietReporter;

impl QuietReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QuietReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for QuietReporter {
    fn report(&self, level: Level, message: &str) {
        match level {
            Level::Warning => eprintln!("Warning: {}", message),
            Level::Error => eprintln!("Error: {}", message),
            Level::Info | Level::Success => {}
        }
    }

    fn phase_started(&self, _name: &str, _index: usize, _total: usize) {}

    fn progress(&self, _description: &str, _elapsed: Duration, _timeout: Duration) {}
}

/// JSON-lines reporter for CI/CD integration
pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }

    fn emit(&self, event: serde_json::Value) {
        println!("{}", event);
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for JsonReporter {
    fn report(&self, level: Level, message: &str) {
        self.emit(serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
    }

    fn phase_started(&self, name: &str, index: usize, total: usize) {
        self.emit(serde_json::json!({
            "type": "phase",
            "name": name,
            "index": index,
            "total": total,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
    }

    fn progress(&self, description: &str, elapsed: Duration, timeout: Duration) {
        self.emit(serde_json::json!({
            "type": "progress",
            "condition": description,
            "elapsedSecs": elapsed.as_secs(),
            "timeoutSecs": timeout.as_secs(),
        }));
    }
}

/// One event captured by [`RecordingReporter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Message { level: Level, message: String },
    PhaseStarted { name: String },
    Progress { description: String, elapsed: Duration },
}

/// In-memory reporter for tests
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Messages reported at `level`
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Message { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Names of phases started, in order
    pub fn phases(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::PhaseStarted { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Number of progress markers emitted
    pub fn progress_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ReportEvent::Progress { .. }))
            .count()
    }

    fn push(&self, event: ReportEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, level: Level, message: &str) {
        self.push(ReportEvent::Message {
            level,
            message: message.to_string(),
        });
    }

    fn phase_started(&self, name: &str, _index: usize, _total: usize) {
        self.push(ReportEvent::PhaseStarted {
            name: name.to_string(),
        });
    }

    fn progress(&self, description: &str, elapsed: Duration, _timeout: Duration) {
        self.push(ReportEvent::Progress {
            description: description.to_string(),
            elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_symbols() {
        assert_eq!(Level::Info.symbol(), "ℹ");
        assert_eq!(Level::Success.symbol(), "✓");
        assert_eq!(Level::Error.symbol(), "✗");
    }

    #[test]
    fn test_recording_reporter_levels() {
        let reporter = RecordingReporter::new();
        reporter.info("starting");
        reporter.warn("slow");
        reporter.error("boom");
        reporter.success("done");

        assert_eq!(reporter.messages(Level::Warning), vec!["slow".to_string()]);
        assert_eq!(reporter.messages(Level::Error), vec!["boom".to_string()]);
        assert_eq!(reporter.events().len(), 4);
    }

    #[test]
    fn test_recording_reporter_phases_and_progress() {
        let reporter = RecordingReporter::new();
        reporter.phase_started("deploy", 0, 2);
        reporter.progress("pods ready", Duration::from_secs(2), Duration::from_secs(10));
        reporter.progress("pods ready", Duration::from_secs(4), Duration::from_secs(10));
        reporter.phase_started("verify", 1, 2);

        assert_eq!(reporter.phases(), vec!["deploy", "verify"]);
        assert_eq!(reporter.progress_count(), 2);
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Warning).unwrap(), "\"warning\"");
    }

    #[test]
    fn test_console_reporter_builders() {
        let reporter = ConsoleReporter::new().with_colors(false).verbose();
        assert!(!reporter.colors);
        assert!(reporter.verbose);
    }
}
