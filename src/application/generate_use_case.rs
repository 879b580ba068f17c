// ============================================================
// Layer 2 — Generate Use Case
// ============================================================
// Inference workflows over a trained checkpoint:
//
//   reconstruct — round-trip one sentence through the model
//   sample      — draw z from the prior and decode a new sentence
//   encode      — print the posterior-mean latent code
//
// All the tensor work lives in the sampler (Layer 5); this layer
// only wires the vocabulary and checkpoint stores to it.

use anyhow::Result;

use crate::infra::{checkpoint::CheckpointManager, vocab_store::VocabStore};
use crate::ml::sampler::Sampler;

pub struct GenerateUseCase {
    sampler: Sampler,
}

impl GenerateUseCase {
    pub fn new(checkpoint_dir: String) -> Result<Self> {
        let vocab_store = VocabStore::new(&checkpoint_dir);
        let vocab = vocab_store.load()?;
        let ckpt = CheckpointManager::new(&checkpoint_dir);
        let sampler = Sampler::from_checkpoint(&ckpt, vocab)?;
        Ok(Self { sampler })
    }

    /// Encode a sentence to z, decode z back to a sentence.
    pub fn reconstruct(&self, text: &str) -> Result<String> {
        self.sampler.reconstruct(text)
    }

    /// Decode a fresh sentence from the standard normal prior.
    pub fn sample(&self, length: usize, seed: Option<u64>) -> Result<String> {
        self.sampler.sample(length, seed)
    }

    /// Decode an explicit latent code, e.g. an interpolation point
    /// between two encoded sentences.
    pub fn decode_latent(&self, latent: &[f32], length: usize) -> Result<String> {
        self.sampler.decode_latent(latent, length)
    }

    /// The deterministic posterior mean for a sentence.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.sampler.encode(text)
    }
}
