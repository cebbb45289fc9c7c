use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "projdeck",
    version,
    about = "Launch one dashboard instance per project"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Use a specific config file
    #[arg(short = 'f', long = "file", global = true)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the launcher API and WebSocket event relay
    Serve {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Open one project in the foreground and stream its output
    Open {
        /// Project id from the config
        #[arg(required_unless_present = "path")]
        project: Option<String>,
        /// Open an unlisted project directory instead
        #[arg(long, conflicts_with = "project")]
        path: Option<PathBuf>,
    },
    /// List configured projects
    Projects,
    /// Validate the configuration file
    Validate,
    /// Generate a starter projdeck.toml
    Init,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
