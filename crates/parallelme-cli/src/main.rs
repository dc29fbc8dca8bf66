//! ParallelME compiler command line.
//!
//! Takes one or more input sources (files or directories), compiles every
//! user-library reference it finds and writes the generated artifacts to the
//! destination directory.

use clap::Parser;
use parallelme_compiler::Compiler;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "parallelme")]
#[command(about = "Compile user-library classes to RenderScript and the ParallelME runtime")]
struct Cli {
    /// Input source files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Destination directory for generated artifacts
    #[arg(short = 'o', long, default_value = "output")]
    destination: PathBuf,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parallelme=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let compiler = Compiler::new(&cli.destination);
    let summary = compiler.compile(&cli.inputs);

    info!(
        "compiled {} class(es) into {}",
        summary.compiled_classes.len(),
        cli.destination.display()
    );
    if !summary.is_success() {
        for (file, failure) in &summary.failures {
            error!("{}: {}", file.display(), failure);
        }
        std::process::exit(1);
    }
}
