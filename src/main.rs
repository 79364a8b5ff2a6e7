//! Paccat CLI: evaluate build recipes.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "paccat",
    version,
    about = "Lazily evaluated build recipes with content-addressed output caching"
)]
struct Cli {
    #[command(subcommand)]
    command: paccat::cli::Commands,
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = paccat::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
