// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands: `train`, `reconstruct`, `sample`
// and `encode`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, CellKind, etc.)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::cells::CellKind;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the autoencoder on a directory of .txt files
    Train(TrainArgs),

    /// Round-trip a sentence through a trained checkpoint
    Reconstruct(ReconstructArgs),

    /// Draw a latent code from the prior and decode a new sentence
    Sample(SampleArgs),

    /// Print the latent code (posterior mean) for a sentence
    Encode(EncodeArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory containing .txt corpus files, one sentence per line
    #[arg(long, default_value = "data/corpus")]
    pub corpus_dir: String,

    /// Directory to save model checkpoints and the vocabulary
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Sentences longer than this many words are dropped
    #[arg(long, default_value_t = 40)]
    pub max_seq_len: usize,

    /// Number of sequences processed together in one forward pass
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Total number of symbols, including [PAD]/[UNK]/[EOS]
    #[arg(long, default_value_t = 8000)]
    pub vocab_size: usize,

    /// Width of every recurrent cell state
    #[arg(long, default_value_t = 256)]
    pub state_size: usize,

    /// Recurrent layers per direction in the encoder (and in the decoder)
    #[arg(long, default_value_t = 1)]
    pub num_layers: usize,

    /// Dimensionality of the latent space
    #[arg(long, default_value_t = 64)]
    pub latent_dim: usize,

    /// Epochs over which the KL weight β climbs linearly from 0 to 1
    #[arg(long, default_value_t = 10)]
    pub warmup_epochs: usize,

    /// Recurrent cell variant: gru, lstm or layer-norm-lstm
    #[arg(long, default_value = "gru")]
    pub cell: CellKind,

    /// Dropout keep-probability on every cell input (1.0 = no dropout)
    #[arg(long, default_value_t = 1.0)]
    pub input_keep_prob: f64,

    /// Dropout keep-probability on every cell output (1.0 = no dropout)
    #[arg(long, default_value_t = 1.0)]
    pub output_keep_prob: f64,

    /// λ — fixed scale on the latent loss term
    #[arg(long, default_value_t = 0.01)]
    pub latent_loss_weight: f64,

    /// Request reduced precision (the wgpu path currently runs f32)
    #[arg(long, default_value_t = false)]
    pub half_precision: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            corpus_dir: a.corpus_dir,
            checkpoint_dir: a.checkpoint_dir,
            max_seq_len: a.max_seq_len,
            batch_size: a.batch_size,
            epochs: a.epochs,
            lr: a.lr,
            vocab_size: a.vocab_size,
            state_size: a.state_size,
            num_layers: a.num_layers,
            latent_dim: a.latent_dim,
            warmup_epochs: a.warmup_epochs,
            cell: a.cell,
            input_keep_prob: a.input_keep_prob,
            output_keep_prob: a.output_keep_prob,
            latent_loss_weight: a.latent_loss_weight,
            half_precision: a.half_precision,
        }
    }
}

/// All arguments for the `reconstruct` command
#[derive(Args, Debug)]
pub struct ReconstructArgs {
    /// The sentence to round-trip through the model
    #[arg(long)]
    pub text: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,
}

/// All arguments for the `sample` command
#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Number of decoder steps to run
    #[arg(long, default_value_t = 20)]
    pub length: usize,

    /// Seed for the latent draw; omit for a fresh sample each run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Decode this explicit latent code instead of drawing from the
    /// prior. Comma-separated floats, latent_dim values.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub latent: Option<Vec<f32>>,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,
}

/// All arguments for the `encode` command
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// The sentence to map into the latent space
    #[arg(long)]
    pub text: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,
}
