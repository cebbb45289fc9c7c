use clap::{CommandFactory, Parser};
use clap_complete::aot::generate;
use projdeck::cli::{Cli, Commands};
use projdeck::commands;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with env-filter support.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_file = cli.global.config_file.as_deref();

    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config_file, host, port).await,
        Commands::Open { project, path } => commands::open::run(config_file, project, path).await,
        Commands::Projects => commands::projects::run(config_file),
        Commands::Validate => commands::validate::run(config_file),
        Commands::Init => commands::init::run(),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "projdeck", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
