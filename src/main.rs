//! wsi-tissue-mask - tissue masking for Whole Slide Images.
//!
//! This binary parses the command line, sets up logging and dispatches to
//! the single-slide or batch pipeline.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tissue_mask::{
    batch::{confirm_overwrite, run_batch, BatchConfig},
    config::{BatchArgs, Cli, Command, ProcessArgs},
    pipeline::process_slide,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Process(args) => run_process(args).await,
        Command::Batch(args) => run_batch_command(args).await,
    }
}

// =============================================================================
// Process Command
// =============================================================================

async fn run_process(args: ProcessArgs) -> ExitCode {
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match process_slide(&args.input, &args.output, &args.params()).await {
        Ok(metadata) => {
            info!(
                "Processed levels {:?} with threshold {}",
                metadata.levels_processed, metadata.threshold_used
            );
            for path in &metadata.output_paths {
                info!("  {}", path);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Batch Command
// =============================================================================

async fn run_batch_command(args: BatchArgs) -> ExitCode {
    let config = match BatchConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Loaded configuration from {}", args.config.display());

    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    if !config.input_dir.is_dir() {
        error!(
            "Input directory not found or is not a directory: {}",
            config.input_dir.display()
        );
        return ExitCode::FAILURE;
    }

    let stdin = std::io::stdin();
    match confirm_overwrite(&config.output_dir, args.force, stdin.lock(), std::io::stderr()) {
        Ok(true) => {}
        Ok(false) => {
            info!("Exiting without processing files");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Failed to read confirmation: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match run_batch(&config).await {
        Ok(summary) if summary.is_success() => {
            info!("Processed {} slide(s)", summary.processed.len());
            ExitCode::SUCCESS
        }
        Ok(summary) => {
            error!(
                "{} of {} slide(s) failed",
                summary.failed.len(),
                summary.total()
            );
            for failure in &summary.failed {
                error!("  {}", failure);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tissue_mask=debug"
    } else {
        "wsi_tissue_mask=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
