// ============================================================
// Layer 5 — Sampler (Inference Engine)
// ============================================================
// Loads a checkpoint and runs the three inference operations:
//
//   reconstruct — sentence → encoder → z → decoder → sentence
//   encode      — sentence → deterministic posterior mean
//   sample      — z ~ N(0, I) → decoder → sentence
//
// Raw symbol scores come back as [batch, steps, vocab]; greedy
// argmax over the vocab axis turns them into symbol ids, cut at the
// first [EOS], then decoded through the vocabulary.

use anyhow::{anyhow, Context, Result};
use burn::{prelude::*, tensor::Distribution};
use tokenizers::Tokenizer;

use crate::data::batcher::SequenceBatch;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::Vrae;

type InferBackend = burn::backend::Wgpu;

pub struct Sampler {
    model: Vrae<InferBackend>,
    tokenizer: Tokenizer,
    device: burn::backend::wgpu::WgpuDevice,
    vocab_size: usize,
    eos_id: u32,
}

impl Sampler {
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, tokenizer: Tokenizer) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg = ckpt_manager.load_config()?;

        let model: Vrae<InferBackend> = cfg.model_config().init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint");

        let eos_id = tokenizer
            .token_to_id("[EOS]")
            .ok_or_else(|| anyhow!("vocabulary has no [EOS] token"))?;

        Ok(Self {
            model,
            tokenizer,
            device,
            vocab_size: cfg.vocab_size,
            eos_id,
        })
    }

    /// Encode → sample → decode one sentence.
    pub fn reconstruct(&self, text: &str) -> Result<String> {
        let ids = self.encode_line(text)?;
        let batch =
            SequenceBatch::<InferBackend>::from_sequences(&[ids], self.vocab_size, &self.device)?;

        let rec = self.model.reconstruct(&batch)?;
        tracing::debug!(
            "Reconstruction loss: {:.4}",
            rec.loss.total.into_scalar().elem::<f64>()
        );
        self.decode_scores(rec.scores)
    }

    /// Deterministic posterior mean for one sentence.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let ids = self.encode_line(text)?;
        let batch =
            SequenceBatch::<InferBackend>::from_sequences(&[ids], self.vocab_size, &self.device)?;

        let mean = self.model.encode_to_latent(&batch)?;
        mean.into_data()
            .to_vec()
            .map_err(|e| anyhow!("cannot read latent mean: {e:?}"))
    }

    /// Draw z from the standard normal prior and decode it for
    /// `length` steps.
    pub fn sample(&self, length: usize, seed: Option<u64>) -> Result<String> {
        if let Some(seed) = seed {
            <InferBackend as Backend>::seed(seed);
        }
        let z = Tensor::<InferBackend, 1>::random(
            [self.model.latent_dim()],
            Distribution::Normal(0.0, 1.0),
            &self.device,
        );
        let scores = self.model.decode_from_latent(z, 1, length)?;
        self.decode_scores(scores)
    }

    /// Decode an explicit latent vector (e.g. an interpolation point).
    pub fn decode_latent(&self, latent: &[f32], length: usize) -> Result<String> {
        let z = Tensor::<InferBackend, 1>::from_floats(latent, &self.device);
        let scores = self.model.decode_from_latent(z, 1, length)?;
        self.decode_scores(scores)
    }

    /// Vocabulary lookup plus the [EOS] terminator the model was
    /// trained with.
    fn encode_line(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("cannot encode '{text}': {e}"))?;
        let mut ids = encoding.get_ids().to_vec();
        ids.push(self.eos_id);
        Ok(ids)
    }

    /// Greedy argmax over the vocab axis, first row of the batch,
    /// cut at [EOS].
    fn decode_scores(&self, scores: Tensor<InferBackend, 3>) -> Result<String> {
        let [_, steps, _] = scores.dims();
        if steps == 0 {
            return Ok(String::new());
        }

        let predicted = scores.argmax(2).squeeze::<2>(2);
        let ids: Vec<i32> = predicted
            .slice([0..1, 0..steps])
            .into_data()
            .convert::<i32>()
            .to_vec()
            .map_err(|e| anyhow!("cannot read predictions: {e:?}"))?;

        let symbols: Vec<u32> = ids
            .into_iter()
            .map(|id| id as u32)
            .take_while(|&id| id != self.eos_id)
            .collect();

        self.tokenizer
            .decode(&symbols, true)
            .map_err(|e| anyhow!("cannot decode symbols: {e}"))
            .context("vocabulary decode failed")
    }
}
