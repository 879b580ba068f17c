// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load .txt corpus files    (Layer 4 - data)
//   Step 2: Clean the sentences      (Layer 4 - data)
//   Step 3: Build / load vocabulary  (Layer 6 - infra)
//   Step 4: Encode + append [EOS]    (Layer 3 - domain)
//   Step 5: Split train/validation   (Layer 4 - data)
//   Step 6: Build datasets           (Layer 4 - data)
//   Step 7: Save config              (Layer 6 - infra)
//   Step 8: Run training loop        (Layer 5 - ml)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{SequenceDataset, SequenceSample},
    loader::TextLoader,
    preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::domain::sequence::EncodedSequence;
use crate::domain::traits::CorpusSource;
use crate::infra::{checkpoint::CheckpointManager, vocab_store::VocabStore};
use crate::ml::cells::CellKind;
use crate::ml::model::VraeConfig;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Serialisable so the
// sampler can reload it and rebuild the exact architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub corpus_dir: String,
    pub checkpoint_dir: String,
    /// Sentences longer than this many words are dropped
    pub max_seq_len: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub lr: f64,
    pub vocab_size: usize,
    pub state_size: usize,
    pub num_layers: usize,
    pub latent_dim: usize,
    /// Epochs over which β climbs linearly from 0 to 1
    pub warmup_epochs: usize,
    pub cell: CellKind,
    pub input_keep_prob: f64,
    pub output_keep_prob: f64,
    /// λ — fixed scale on the latent loss term
    pub latent_loss_weight: f64,
    pub half_precision: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            corpus_dir: "data/corpus".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            max_seq_len: 40,
            batch_size: 32,
            epochs: 50,
            lr: 1e-3,
            vocab_size: 8000,
            state_size: 256,
            num_layers: 1,
            latent_dim: 64,
            warmup_epochs: 10,
            cell: CellKind::Gru,
            input_keep_prob: 1.0,
            output_keep_prob: 1.0,
            latent_loss_weight: 0.01,
            half_precision: false,
        }
    }
}

impl TrainConfig {
    /// The model-architecture slice of this config.
    pub fn model_config(&self) -> VraeConfig {
        VraeConfig::new(
            self.vocab_size,
            self.state_size,
            self.num_layers,
            self.latent_dim,
            self.batch_size,
        )
        .with_cell(self.cell)
        .with_input_keep_prob(self.input_keep_prob)
        .with_output_keep_prob(self.output_keep_prob)
        .with_latent_loss_weight(self.latent_loss_weight)
        .with_half_precision(self.half_precision)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Load the corpus ───────────────────────────────────────────
        tracing::info!("Loading .txt files from '{}'", cfg.corpus_dir);
        let loader = TextLoader::new(&cfg.corpus_dir);
        let raw_lines = loader.load_all()?;
        if raw_lines.is_empty() {
            bail!("No sentences found in '{}'", cfg.corpus_dir);
        }

        // ── Step 2: Clean / normalise ─────────────────────────────────────────
        let preprocessor = Preprocessor::new(cfg.max_seq_len);
        let sentences: Vec<String> = raw_lines
            .iter()
            .filter_map(|line| preprocessor.clean(line))
            .collect();
        tracing::info!(
            "Kept {} of {} sentences after cleaning",
            sentences.len(),
            raw_lines.len()
        );
        if sentences.is_empty() {
            bail!("Every corpus sentence was dropped during cleaning");
        }

        // ── Step 3: Build / load the vocabulary ───────────────────────────────
        let vocab_store = VocabStore::new(&cfg.checkpoint_dir);
        let vocab = vocab_store.load_or_build(&sentences, cfg.vocab_size)?;

        let eos_id = match vocab.token_to_id("[EOS]") {
            Some(id) => id,
            None => bail!("vocabulary has no [EOS] token"),
        };

        // ── Step 4: Encode sentences, terminate with [EOS], validate ──────────
        let samples = encode_corpus(&sentences, &vocab, eos_id, cfg.vocab_size)?;
        tracing::info!("Built {} training samples", samples.len());

        // ── Step 5: Train / validation split (90/10) ──────────────────────────
        let (train_samples, val_samples) = split_train_val(samples, 0.9);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 6: Build Burn datasets ───────────────────────────────────────
        let train_dataset = SequenceDataset::new(train_samples);
        let val_dataset = SequenceDataset::new(val_samples);

        // ── Step 7: Save config for inference ─────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.save_config(cfg)?;

        // ── Step 8: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, train_dataset, val_dataset, ckpt_manager)?;

        Ok(())
    }
}

/// Vocabulary lookup for the whole corpus. Every sequence gets the
/// [EOS] terminator and a fail-fast id-range check before any tensor
/// work begins.
fn encode_corpus(
    sentences: &[String],
    vocab: &tokenizers::Tokenizer,
    eos_id: u32,
    vocab_size: usize,
) -> Result<Vec<SequenceSample>> {
    let mut samples = Vec::with_capacity(sentences.len());

    for sentence in sentences {
        let enc = vocab
            .encode(sentence.as_str(), false)
            .map_err(|e| anyhow::anyhow!("Cannot encode '{sentence}': {e}"))?;

        let mut symbols: Vec<u32> = enc.get_ids().to_vec();
        if symbols.is_empty() {
            continue;
        }
        symbols.push(eos_id);

        let seq = EncodedSequence::new(symbols);
        seq.validate(vocab_size)?;
        samples.push(SequenceSample::from_sequence(seq));
    }

    Ok(samples)
}
