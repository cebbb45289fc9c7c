use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::config;
use crate::config::resolve::resolve_config;
use crate::config::validate::validate;
use crate::config::CONFIG_FILENAME;

pub fn run(config_file: Option<&Path>) -> Result<()> {
    let config_path = resolve_config(config_file)?;

    let (config, source) = config::load_config(&config_path)?;

    let filename = config_path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| CONFIG_FILENAME.to_string());

    match validate(&config, &source, &filename) {
        Ok(()) => {
            println!(
                "  {} {} is valid ({} projects, up to {} instances)",
                "\u{2713}".green(),
                filename,
                config.projects.len(),
                config.ports.max_instances,
            );
            Ok(())
        }
        Err(errors) => {
            for err in errors {
                let report: miette::Report = err.into();
                eprintln!("{:?}", report);
            }
            std::process::exit(1);
        }
    }
}
