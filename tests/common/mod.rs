#![allow(dead_code)]
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub dir: TempDir,
    pub config_path: PathBuf,
}

impl TestProject {
    pub fn new(config_toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("projdeck.toml");
        std::fs::write(&config_path, config_toml).unwrap();
        Self { dir, config_path }
    }

    /// Create a project directory next to the config and return its path.
    pub fn project_dir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).unwrap();
        path
    }
}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// First port of `len` consecutive loopback ports that are currently free.
pub fn free_block(len: u16) -> u16 {
    for _ in 0..100 {
        let base = free_port();
        let Some(end) = base.checked_add(len) else {
            continue;
        };
        if (base..end).all(|p| TcpListener::bind(("127.0.0.1", p)).is_ok()) {
            return base;
        }
    }
    panic!("no block of {} free ports found", len);
}

/// A config with one launcher port, a fresh port pool and the given projects
/// (`id`, relative directory). Readiness relies on log patterns only.
pub fn deck_config(command: &str, launcher_port: u16, max_instances: u16, projects: &[(&str, &str)]) -> String {
    let base = free_block(max_instances * 2);
    let mut config = format!(
        r#"
[launcher]
port = {launcher_port}

[spawn]
command = '{command}'
auto_init = false

[ports]
backend_start = {base}
frontend_start = {frontend}
max_instances = {max_instances}

[readiness]
timeout = "10s"
health_probe = false

[termination]
grace = "1s"
"#,
        frontend = base + max_instances,
    );
    for (id, dir) in projects {
        config.push_str(&format!("\n[projects.{id}]\npath = \"{dir}\"\n"));
    }
    config
}

pub async fn wait_for_port(port: u16, timeout: std::time::Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
