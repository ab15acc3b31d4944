use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Electorate map server CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "electomap", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the dataset and serve the HTTP API
    Serve(ServeArgs),

    /// Convert an AEC polling place CSV into the JSON file read by `serve`
    ImportPollingPlaces(ImportArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Root directory holding one shapefile subdirectory per zoom bucket
    #[arg(long, default_value = "dist/national_elb", value_hint = ValueHint::DirPath)]
    pub data: PathBuf,

    /// Polling place JSON produced by import-polling-places
    #[arg(long, default_value = "dist/polling_places.json", value_hint = ValueHint::FilePath)]
    pub polling_places: PathBuf,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Input CSV (AEC polling place export)
    #[arg(value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Output JSON path
    #[arg(value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Overwrite if the file exists
    #[arg(long)]
    pub force: bool,
}
