use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::PortPair;

/// Where a project's instance is in its lifecycle.
///
/// `Idle → Allocating → Spawning → Running → Stopping → Terminated`; a crash
/// while `Spawning` or `Running` jumps straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Idle,
    Allocating,
    Spawning,
    Running,
    Stopping,
    Terminated,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Idle => "idle",
            InstanceState::Allocating => "allocating",
            InstanceState::Spawning => "spawning",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public descriptor of a running instance. Carries no process handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub project_id: String,
    pub backend_port: u16,
    pub frontend_port: u16,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub state: InstanceState,
}

impl InstanceInfo {
    pub fn ports(&self) -> PortPair {
        PortPair {
            backend: self.backend_port,
            frontend: self.frontend_port,
        }
    }

    pub fn backend_url(&self) -> String {
        format!("http://localhost:{}", self.backend_port)
    }
}
