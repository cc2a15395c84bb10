use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use cinch::{config::Config, orchestrator::BundleOrchestrator};
use clap::{ArgAction, ArgGroup, Parser};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "cinch", version, about = "Bundle an ES module graph into a single script")]
#[command(group(ArgGroup::new("destination").required(true).args(["output", "stdout"])))]
struct Cli {
    /// Entry module of the bundle
    #[arg(short, long)]
    entry: PathBuf,

    /// File to write the bundle to; parent directories are created
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the bundle to standard output instead of writing a file
    #[arg(long)]
    stdout: bool,

    /// Configuration file (defaults to ./cinch.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let orchestrator = BundleOrchestrator::new(config);

    match &cli.output {
        Some(output) => orchestrator
            .bundle_to_file(&cli.entry, output)
            .with_context(|| format!("Failed to bundle {}", cli.entry.display()))?,
        None => {
            let bundle = orchestrator
                .bundle_to_string(&cli.entry)
                .with_context(|| format!("Failed to bundle {}", cli.entry.display()))?;
            io::stdout()
                .lock()
                .write_all(bundle.as_bytes())
                .context("Failed to write bundle to stdout")?;
        }
    }

    Ok(())
}

/// `RUST_LOG` applies unless `-v` is given
fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.format_timestamp(None).init();
}
