//! CLI entry point for the PE flattener.

use anyhow::{Context, Result};
use clap::Parser;
use peflat::{logging, FlattenConfig, FlattenReport};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "peflat")]
#[command(version, about = "Flatten a fixed-address 64-bit PE image into a raw memory image", long_about = None)]
struct Args {
    /// Path to the 64-bit PE image
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Path of the flat image to write
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Lowest loadable address (overrides config)
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    min_addr: Option<u64>,

    /// One past the highest loadable address (overrides config)
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    max_addr: Option<u64>,

    /// Validate and flatten without writing OUTPUT
    #[arg(long)]
    dry_run: bool,

    /// Print a JSON layout report on stdout
    #[arg(long)]
    report: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Accept `0x`-prefixed hex or plain decimal.
fn parse_address(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn load_config(args: &Args) -> Result<FlattenConfig> {
    let mut config = match &args.config {
        Some(path) => FlattenConfig::from_json_file(path)?,
        None => FlattenConfig::default(),
    };
    if let Some(min) = args.min_addr {
        config.min_addr = min;
    }
    if let Some(max) = args.max_addr {
        config.max_addr = max;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    if args.log_json {
        logging::init_tracing_json(level);
    } else {
        logging::init_tracing(level);
    }

    let config = load_config(&args).context("Failed to load configuration")?;
    debug!(?config, "Using configuration");

    let result = if args.dry_run {
        peflat::flatten_path(&args.input, &config)
    } else {
        peflat::flatten_file(&args.input, &args.output, &config)
    };
    let image = result.map_err(|e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!(
            "{} while flattening {}",
            kind,
            args.input.display()
        ))
    })?;

    if args.report {
        let output = (!args.dry_run).then_some(args.output.as_path());
        let report = FlattenReport::new(&args.input, output, &image);
        println!("{}", report.to_json()?);
    }

    Ok(())
}
