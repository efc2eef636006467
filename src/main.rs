//! deseq_report command-line interface

use clap::Parser;
use log::{info, LevelFilter};

use deseq_report::cli::{Cli, Commands, ReportArgs};
use deseq_report::prelude::*;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let args = match cli.command {
        Some(Commands::Report(args)) => args,
        None => ReportArgs::default(),
    };

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &ReportArgs) -> Result<()> {
    let config = args.to_config()?;

    if config.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()
            .ok();
    }

    let outcome = run_report(&config)?;
    info!(
        "{} genes significant at padj < {}",
        outcome.results.significant_genes(config.alpha).len(),
        config.alpha
    );
    info!("Report written to {}", outcome.output.display());
    Ok(())
}
