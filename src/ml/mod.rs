// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn framework specific code lives in this layer (plus the
// batcher in Layer 4 and the checkpoint recorder in Layer 6).
//
// What's in this layer:
//
//   cells.rs   — The recurrent cell capability interface
//                (step / zero_state) with the three variants:
//                GRU, LSTM, layer-normalised LSTM, plus the
//                dropout-wrapped multi-layer stack
//
//   model.rs   — The variational recurrent autoencoder:
//                • bidirectional sequence encoder
//                • stochastic latent layer (reparameterisation)
//                • autoregressive projection decoder
//                and the four entry points: forward_loss,
//                reconstruct, decode_from_latent, encode_to_latent
//
//   loss.rs    — Masked sequence cross-entropy + KL divergence,
//                combined with the annealed β and fixed λ
//
//   trainer.rs — train_step (atomic: loss verified finite before
//                the optimiser runs) and the epoch loop with the
//                deterministic warm-up schedule
//
//   sampler.rs — Checkpoint loading and greedy decoding back to
//                text for reconstruct / sample / encode

/// Recurrent cell variants behind one capability interface
pub mod cells;

/// Reconstruction + latent loss combination
pub mod loss;

/// Encoder, stochastic latent layer, projection decoder
pub mod model;

/// Training loop with β warm-up, validation and checkpointing
pub mod trainer;

/// Inference engine — loads a checkpoint, decodes latent codes
pub mod sampler;
