use std::time::Duration;

use crate::ui::buffer::render_output;
use crate::ui::logs::LogLine;

/// Why a lifecycle operation failed.
///
/// `Clone` so a single spawn outcome can be handed to every coalesced caller;
/// underlying causes are carried as strings for the same reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InstanceError {
    #[error("project '{project}' already has a running instance")]
    AlreadyRunning { project: String },

    #[error("project '{project}' has no running instance")]
    NotRunning { project: String },

    #[error("no available ports (max {max} concurrent instances)")]
    PortsExhausted { max: u16 },

    #[error("failed to start process for '{project}': {reason}")]
    ProcessSpawnFailed { project: String, reason: String },

    #[error("project '{project}' did not become ready within {}{}", format_timeout(.timeout), output_suffix(.output))]
    ReadinessTimeout {
        project: String,
        timeout: Duration,
        output: Vec<LogLine>,
    },

    #[error("process for '{project}' exited before becoming ready ({}){}", exit_reason(.code, .error), output_suffix(.output))]
    ProcessExited {
        project: String,
        code: Option<i32>,
        error: Option<String>,
        output: Vec<LogLine>,
    },

    #[error("process for '{project}' crashed ({}){}", exit_reason(.code, .error), output_suffix(.output))]
    ProcessCrashed {
        project: String,
        code: Option<i32>,
        error: Option<String>,
        output: Vec<LogLine>,
    },

    #[error("failed to initialize project files for '{project}': {reason}")]
    TemplateInitFailed { project: String, reason: String },

    #[error("spawn attempt for '{project}' ended without a result")]
    AttemptAbandoned { project: String },
}

impl InstanceError {
    /// Captured process output attached to this error, if any.
    pub fn output(&self) -> &[LogLine] {
        match self {
            InstanceError::ReadinessTimeout { output, .. }
            | InstanceError::ProcessExited { output, .. }
            | InstanceError::ProcessCrashed { output, .. } => output,
            _ => &[],
        }
    }

    /// The message without the inlined output tail.
    pub fn summary(&self) -> String {
        let message = self.to_string();
        match message.split_once("\n--- output ---") {
            Some((head, _)) => head.to_string(),
            None => message,
        }
    }
}

/// Number of trailing output lines inlined into error messages.
const MESSAGE_TAIL_LINES: usize = 20;

fn output_suffix(output: &[LogLine]) -> String {
    if output.is_empty() {
        return String::new();
    }
    let skip = output.len().saturating_sub(MESSAGE_TAIL_LINES);
    format!("\n--- output ---\n{}", render_output(&output[skip..]))
}

fn format_timeout(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

fn exit_reason(code: &Option<i32>, error: &Option<String>) -> String {
    describe_exit(*code, error.as_deref())
}

pub(crate) fn describe_exit(code: Option<i32>, error: Option<&str>) -> String {
    match (code, error) {
        (_, Some(err)) => format!("error: {}", err),
        (Some(code), None) => format!("exit code {}", code),
        (None, None) => "terminated by signal".to_string(),
    }
}
