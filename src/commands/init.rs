use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::CONFIG_FILENAME;

pub fn run() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = write_starter(&cwd)?;
    let command = detect_dashboard_command(&cwd);

    println!("Created {} in {}", CONFIG_FILENAME, cwd.display());
    println!();
    println!("  Dashboard command: {}", command);
    println!();
    println!(
        "Add your projects to {}, then run `projdeck serve`.",
        config_path.display()
    );
    Ok(())
}

/// Write a starter config into `dir`. Refuses to overwrite an existing one.
pub fn write_starter(dir: &Path) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);
    if config_path.exists() {
        anyhow::bail!("{} already exists in {}", CONFIG_FILENAME, dir.display());
    }

    let command = detect_dashboard_command(dir);
    let config = format!(
        r#"# -- Launcher API + WebSocket event relay --
[launcher]
# host = "127.0.0.1"
# port = 3100

# -- How a dashboard instance is started --
# The command runs through the platform shell. Each instance receives its
# ports and project directory through the environment.
[spawn]
command = "{command}"
# working_dir = "./"
# auto_init = true                    # write [templates] files before first spawn
# port_env = "PORT"
# frontend_port_env = "FRONTEND_PORT"
# project_path_env = "PROJECT_PATH"
# capture_lines = 200
#
# [spawn.env]
# NODE_ENV = "production"

# -- Port pool: one backend + one frontend port per instance --
[ports]
# backend_start = 4000
# frontend_start = 5000
# max_instances = 20

# -- When is a fresh instance ready? --
# First of: a stdout line matching a pattern, or a 2xx from the health route.
[readiness]
# timeout = "45s"
# health_probe = true
# health_path = "/api/status"
# health_grace = "1s"
# health_interval = "500ms"
# patterns = ["server running", "listening on", "ready on", "started server"]

# -- Stop: graceful signal, then forced kill after the grace window --
[termination]
# grace = "3s"

# -- Projects --
# [projects.my-notes]
# path = "~/notes"
# name = "My Notes"
"#
    );

    std::fs::write(&config_path, config)?;
    Ok(config_path)
}

fn detect_dashboard_command(dir: &Path) -> &'static str {
    if dir.join("package.json").exists() {
        "npm start"
    } else if dir.join("Cargo.toml").exists() {
        "cargo run --release"
    } else if dir.join("go.mod").exists() {
        "go run ."
    } else if dir.join("requirements.txt").exists() || dir.join("pyproject.toml").exists() {
        "python server.py"
    } else {
        "echo 'Replace this with your dashboard server command'"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::config::validate::validate;

    #[test]
    fn starter_config_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();

        let path = write_starter(dir.path()).unwrap();
        let (cfg, source) = config::load_config(&path).unwrap();
        assert_eq!(cfg.spawn.command, "npm start");
        assert!(validate(&cfg, &source, CONFIG_FILENAME).is_ok());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        write_starter(dir.path()).unwrap();
        let err = write_starter(dir.path()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
