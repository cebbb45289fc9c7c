use chrono::{DateTime, Utc};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// LogLevel — detected from log line text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static LOG_LEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\b(trace|debug|info|warn(?:ing)?|error)\b"#).unwrap());

/// Detect log level from a line of text.
pub fn detect_log_level(text: &str) -> Option<LogLevel> {
    LOG_LEVEL_RE.find(text).and_then(|m| {
        let s = m.as_str().to_lowercase();
        match s.as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    })
}

// ---------------------------------------------------------------------------
// LogLine
// ---------------------------------------------------------------------------

/// One line of output captured from an instance process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub text: String,
    pub is_stderr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

impl LogLine {
    pub fn new(project: &str, text: String, is_stderr: bool) -> Self {
        let level = detect_log_level(&text);
        Self {
            timestamp: Utc::now(),
            project: project.to_string(),
            text,
            is_stderr,
            level,
        }
    }
}

// ---------------------------------------------------------------------------
// LogWriter — colored terminal output with owo-colors
// ---------------------------------------------------------------------------

pub struct LogWriter {
    rx: broadcast::Receiver<LogLine>,
    use_color: bool,
}

/// Color palette for project names (using owo-colors).
const PROJECT_COLORS: &[fn(&str) -> String] = &[
    |s| format!("{}", s.cyan()),
    |s| format!("{}", s.yellow()),
    |s| format!("{}", s.green()),
    |s| format!("{}", s.magenta()),
    |s| format!("{}", s.blue()),
];

fn format_level(level: &LogLevel, use_color: bool) -> String {
    if !use_color {
        return format!("{:>5} ", level.as_str());
    }
    match level {
        LogLevel::Trace => format!("{} ", level.as_str().dimmed()),
        LogLevel::Debug => format!("{} ", level.as_str().blue()),
        LogLevel::Info => format!("{} ", level.as_str().green()),
        LogLevel::Warn => format!("{} ", level.as_str().yellow()),
        LogLevel::Error => format!("{} ", level.as_str().red()),
    }
}

impl LogWriter {
    pub fn new(rx: broadcast::Receiver<LogLine>) -> Self {
        Self {
            rx,
            use_color: std::io::stdout().is_terminal(),
        }
    }

    /// Print lines until the channel closes.
    pub async fn run(mut self) {
        let mut color_map: BTreeMap<String, usize> = BTreeMap::new();
        let mut max_name_len = 0usize;

        loop {
            let line = match self.rx.recv().await {
                Ok(line) => line,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "log writer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let next_color = color_map.len() % PROJECT_COLORS.len();
            let color_idx = *color_map.entry(line.project.clone()).or_insert(next_color);
            max_name_len = max_name_len.max(line.project.len());

            println!("{}", self.render(&line, color_idx, max_name_len));
        }
    }

    fn render(&self, line: &LogLine, color_idx: usize, width: usize) -> String {
        let mut buf = String::new();

        if self.use_color {
            let padding = width.saturating_sub(line.project.len());
            buf.push_str(&" ".repeat(padding));
            buf.push_str(&PROJECT_COLORS[color_idx](&line.project));
            buf.push_str(&format!(" {} ", "|".dimmed()));
        } else {
            buf.push_str(&format!("{:>width$} | ", line.project, width = width));
        }

        if let Some(ref level) = line.level {
            buf.push_str(&format_level(level, self.use_color));
        }

        if self.use_color && line.is_stderr {
            buf.push_str(&format!("{}", line.text.red()));
        } else {
            buf.push_str(&line.text);
        }
        buf
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
