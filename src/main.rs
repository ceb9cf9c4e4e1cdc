use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use digit_recognizer::pipeline::{Mode, TrainingDriver};

type Backend = Autodiff<NdArray<f32>>;

#[derive(Debug, Parser)]
#[command(author, version, about = "Digit recognizer training CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Home directory for configs, checkpoints, and reports.
    /// Defaults to the current working directory.
    #[arg(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Train the model for a configuration version
    Train(TrainArgs),
    /// Restore the latest checkpoint and evaluate on the test partition
    Predict(PredictArgs),
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// Model version selecting the configuration and checkpoint lineage
    #[arg(long)]
    model_version: String,

    /// Render the structural diagram to the reports directory
    #[arg(long)]
    plot: bool,
}

#[derive(Debug, Args)]
struct PredictArgs {
    /// Model version selecting the configuration and checkpoint lineage
    #[arg(long)]
    model_version: String,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => home,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };

    match cli.command {
        Commands::Train(args) => train_command(args, home),
        Commands::Predict(args) => predict_command(args, home),
    }
}

fn train_command(args: TrainArgs, home: PathBuf) -> Result<()> {
    let device = Default::default();

    let mut driver = TrainingDriver::new(args.model_version.as_str(), home)?
        .load_configuration()?
        .load_dataset::<Backend>(&device)?
        .load_model(Mode::Train, &device)?;

    driver.generate_summary_and_plot(args.plot)?;
    driver.train()?;

    if let Some(best) = driver.best_validation_loss() {
        info!("Best validation loss: {:.6}", best);
    }
    Ok(())
}

fn predict_command(args: PredictArgs, home: PathBuf) -> Result<()> {
    let device = Default::default();

    let mut driver = TrainingDriver::new(args.model_version.as_str(), home)?
        .load_configuration()?
        .load_dataset::<Backend>(&device)?
        .load_model(Mode::Predict, &device)?;

    match driver.restored_step() {
        Some(step) => info!("Evaluating checkpoint from step {}", step),
        None => info!("No checkpoint found, evaluating freshly initialized model"),
    }
    driver.evaluate()?;
    Ok(())
}
