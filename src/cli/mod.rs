// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `train`       — trains the autoencoder on a text corpus
//   2. `reconstruct` — round-trips a sentence through a checkpoint
//   3. `sample`      — decodes a fresh sentence from the prior
//   4. `encode`      — prints a sentence's latent code

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EncodeArgs, ReconstructArgs, SampleArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "text-vrae",
    version = "0.1.0",
    about = "Train a variational recurrent autoencoder on sentences, \
             then reconstruct, sample and encode."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => Self::run_train(args),
            Commands::Reconstruct(args) => Self::run_reconstruct(args),
            Commands::Sample(args) => Self::run_sample(args),
            Commands::Encode(args) => Self::run_encode(args),
        }
    }

    /// Handles the `train` subcommand.
    /// Converts CLI args into a TrainConfig and hands off to Layer 2.
    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Starting training on corpus in: {}", args.corpus_dir);

        let use_case = TrainUseCase::new(args.into());
        use_case.execute()?;

        println!("Training complete. Checkpoint saved.");
        Ok(())
    }

    /// Handles the `reconstruct` subcommand.
    fn run_reconstruct(args: ReconstructArgs) -> Result<()> {
        use crate::application::generate_use_case::GenerateUseCase;

        let use_case = GenerateUseCase::new(args.checkpoint_dir.clone())?;
        let output = use_case.reconstruct(&args.text)?;

        println!("\nInput:          {}", args.text);
        println!("Reconstruction: {}", output);
        Ok(())
    }

    /// Handles the `sample` subcommand.
    fn run_sample(args: SampleArgs) -> Result<()> {
        use crate::application::generate_use_case::GenerateUseCase;

        let use_case = GenerateUseCase::new(args.checkpoint_dir.clone())?;
        let output = match &args.latent {
            Some(latent) => use_case.decode_latent(latent, args.length)?,
            None => use_case.sample(args.length, args.seed)?,
        };

        println!("\nSample: {}", output);
        Ok(())
    }

    /// Handles the `encode` subcommand.
    fn run_encode(args: EncodeArgs) -> Result<()> {
        use crate::application::generate_use_case::GenerateUseCase;

        let use_case = GenerateUseCase::new(args.checkpoint_dir.clone())?;
        let z = use_case.encode(&args.text)?;

        let rendered: Vec<String> = z.iter().map(|v| format!("{v:.4}")).collect();
        println!("\nLatent code ({} dims):", z.len());
        println!("[{}]", rendered.join(", "));
        Ok(())
    }
}
