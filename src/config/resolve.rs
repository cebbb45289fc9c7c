use std::path::{Path, PathBuf};

use super::CONFIG_FILENAME;

/// Walk up the directory tree from `start`, checking for `filename` at each level.
/// Returns the full path to the file if found, or None if the root is reached
/// without finding it.
pub fn find_config(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Resolve the config file path. An explicit `cli_file` must exist. Otherwise
/// search upward from the current directory, then fall back to the user
/// config directory (`~/.config/projdeck/projdeck.toml` on Linux).
pub fn resolve_config(cli_file: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = cli_file {
        if path.is_file() {
            return Ok(path.canonicalize()?);
        }
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let cwd = std::env::current_dir()?;
    if let Some(found) = find_config(&cwd, CONFIG_FILENAME) {
        return Ok(found);
    }

    if let Some(user) = user_config_path().filter(|p| p.is_file()) {
        return Ok(user);
    }

    anyhow::bail!(
        "No {} found in {} or any parent directory",
        CONFIG_FILENAME,
        cwd.display()
    )
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("projdeck").join(CONFIG_FILENAME))
}
