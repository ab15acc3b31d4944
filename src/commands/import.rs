use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{bail, Context, Result};

use crate::cli::{Cli, ImportArgs};
use crate::ingest;

pub fn import_polling_places(cli: &Cli, args: &ImportArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!("Output file already exists: {} (use --force to overwrite)", args.output.display());
    }

    if cli.verbose > 0 {
        eprintln!("[import] reading {}", args.input.display());
    }
    let input = File::open(&args.input)
        .with_context(|| format!("Unable to read file '{}'", args.input.display()))?;
    let places = ingest::parse_polling_places(BufReader::new(input))?;

    let output = File::create(&args.output)
        .with_context(|| format!("Unable to create file '{}'", args.output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(output), &places)
        .context("Failed to serialize polling places")?;

    println!("Wrote {} polling places to {}", places.len(), args.output.display());
    Ok(())
}
