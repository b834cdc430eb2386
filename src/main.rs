//! AutoEQ CLI
//!
//! Command-line front end for the AutoEQ playback engine.

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use autoeq::cli::{commands, Cli, Commands};
use autoeq::AutoEqError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!("AutoEQ v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(&cli) {
        if let Some(cause) = err.downcast_ref::<AutoEqError>() {
            error!(code = cause.error_code(), hint = cause.recovery_hint(), "{:#}", err);
        }
        return Err(err);
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.engine_config().context("invalid configuration")?;

    match &cli.command {
        Commands::Play { file, eq, seek } => commands::play(config, file, eq, *seek)
            .with_context(|| format!("failed to play {}", file.display())),
        Commands::Analyze { file, json } => commands::analyze(config, file, *json)
            .with_context(|| format!("failed to analyze {}", file.display())),
        Commands::Render { input, output, eq } => commands::render(config, input, output, eq)
            .with_context(|| format!("failed to render {}", input.display())),
    }
}

/// Log to stderr; `RUST_LOG` wins unless `--verbose` is given
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
