use serde::Serialize;

use crate::ui::logs::LogLine;

use super::state::InstanceInfo;

/// Lifecycle notifications broadcast to subscribers (the launcher's
/// WebSocket relay, `open` mode).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Spawned {
        instance: InstanceInfo,
    },
    Stopped {
        project_id: String,
        exit_code: Option<i32>,
    },
    Crashed {
        project_id: String,
        exit_code: Option<i32>,
        error: String,
        output: Vec<LogLine>,
    },
    Initialized {
        project_id: String,
        files: Vec<String>,
    },
}

impl LifecycleEvent {
    pub fn project_id(&self) -> &str {
        match self {
            LifecycleEvent::Spawned { instance } => &instance.project_id,
            LifecycleEvent::Stopped { project_id, .. }
            | LifecycleEvent::Crashed { project_id, .. }
            | LifecycleEvent::Initialized { project_id, .. } => project_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Spawned { .. } => "spawned",
            LifecycleEvent::Stopped { .. } => "stopped",
            LifecycleEvent::Crashed { .. } => "crashed",
            LifecycleEvent::Initialized { .. } => "initialized",
        }
    }
}
