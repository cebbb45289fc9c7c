pub mod model;
pub mod resolve;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use model::ProjdeckConfig;

pub const CONFIG_FILENAME: &str = "projdeck.toml";

/// Read and parse a config file, returning the parsed config together with
/// its raw source (needed for diagnostics).
pub fn load_config(path: &Path) -> anyhow::Result<(ProjdeckConfig, String)> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: ProjdeckConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
    Ok((config, content))
}

/// Load a config file and fail with a readable summary if validation finds
/// any problem.
pub fn load_validated(path: &Path) -> anyhow::Result<ProjdeckConfig> {
    let (config, source) =
        load_config(path).with_context(|| format!("loading config from {}", path.display()))?;

    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| CONFIG_FILENAME.to_string());

    if let Err(errors) = validate::validate(&config, &source, &filename) {
        let mut msg = String::from("Configuration errors:\n");
        for err in &errors {
            msg.push_str(&format!("  - {}\n", err));
        }
        bail!("{}", msg.trim_end());
    }

    Ok(config)
}

/// Directory relative paths in the config are resolved against.
pub fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}
