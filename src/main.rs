use anyhow::Result;
use clap::Parser;

use electomap::cli::{Cli, Commands};
use electomap::commands::{import_polling_places, serve};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match &cli.command {
        Commands::Serve(args) => serve(&cli, args),
        Commands::ImportPollingPlaces(args) => import_polling_places(&cli, args),
    }
}
