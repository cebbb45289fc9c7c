use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ProjdeckConfig {
    #[serde(default)]
    pub launcher: LauncherConfig,
    pub spawn: SpawnConfig,
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub termination: TerminationConfig,
    /// Relative path -> file contents. `{name}` and `{id}` are substituted.
    #[serde(default = "default_templates")]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_launcher_port() -> u16 {
    3100
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LauncherConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_launcher_port")]
    pub port: u16,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_launcher_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port_env() -> String {
    "PORT".to_string()
}

fn default_frontend_port_env() -> String {
    "FRONTEND_PORT".to_string()
}

fn default_project_path_env() -> String {
    "PROJECT_PATH".to_string()
}

fn default_capture_lines() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SpawnConfig {
    pub command: String,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_true")]
    pub auto_init: bool,
    #[serde(default = "default_port_env")]
    pub port_env: String,
    #[serde(default = "default_frontend_port_env")]
    pub frontend_port_env: String,
    #[serde(default = "default_project_path_env")]
    pub project_path_env: String,
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_backend_start() -> u16 {
    4000
}

fn default_frontend_start() -> u16 {
    5000
}

fn default_max_instances() -> u16 {
    20
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PortsConfig {
    #[serde(default = "default_backend_start")]
    pub backend_start: u16,
    #[serde(default = "default_frontend_start")]
    pub frontend_start: u16,
    #[serde(default = "default_max_instances")]
    pub max_instances: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            backend_start: default_backend_start(),
            frontend_start: default_frontend_start(),
            max_instances: default_max_instances(),
        }
    }
}

fn default_ready_timeout() -> String {
    "45s".to_string()
}

fn default_health_path() -> String {
    "/api/status".to_string()
}

fn default_health_grace() -> String {
    "1s".to_string()
}

fn default_health_interval() -> String {
    "500ms".to_string()
}

pub fn default_ready_patterns() -> Vec<String> {
    ["server running", "listening on", "ready on", "started server"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReadinessConfig {
    #[serde(default = "default_ready_timeout")]
    pub timeout: String,
    #[serde(default = "default_true")]
    pub health_probe: bool,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_health_grace")]
    pub health_grace: String,
    #[serde(default = "default_health_interval")]
    pub health_interval: String,
    #[serde(default = "default_ready_patterns")]
    pub patterns: Vec<String>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: default_ready_timeout(),
            health_probe: true,
            health_path: default_health_path(),
            health_grace: default_health_grace(),
            health_interval: default_health_interval(),
            patterns: default_ready_patterns(),
        }
    }
}

fn default_termination_grace() -> String {
    "3s".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TerminationConfig {
    #[serde(default = "default_termination_grace")]
    pub grace: String,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            grace: default_termination_grace(),
        }
    }
}

fn default_templates() -> BTreeMap<String, String> {
    let mut templates = BTreeMap::new();
    templates.insert(
        ".projdeck/project.toml".to_string(),
        "name = \"{name}\"\nid = \"{id}\"\n".to_string(),
    );
    templates
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProjectConfig {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Parse a humantime duration string such as `"45s"` or `"500ms"`.
pub fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| anyhow::anyhow!("invalid duration for {}: '{}' ({})", field, value, e))
}
