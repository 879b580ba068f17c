// ============================================================
// Layer 4 — Sequence Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<SequenceSample>
// into the tensor bundle the model consumes.
//
// Unlike a fixed-width pipeline, sequences here have different
// lengths, so the batcher does the padding itself: every sequence is
// right-padded to the longest one in the batch, and the bookkeeping
// the model relies on is derived in the same place:
//
//   inputs  [B, L, V]  one-hot encoder input, each sequence REVERSED
//                      within its true length (padding stays at the
//                      tail) — the encoder sees end-of-sentence
//                      context first
//   targets [B, L]     symbol ids in original order, for the loss
//   mask    [B, L]     1.0 iff t < length[i]
//   lengths Vec        true (unpadded) length per sequence
//
// The flatten-then-reshape construction is the same idiom as for any
// pre-padded id tensor; the one-hot rows are just built host-side
// before the single from_floats call.

use anyhow::{bail, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::SequenceSample;

pub const PAD_ID: u32 = 0;

// ─── SequenceBatch ────────────────────────────────────────────────────────────
/// A padded batch ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// One-hot encoder input — shape [batch, max_len, vocab],
    /// reversed within each sequence's true length
    pub inputs: Tensor<B, 3>,

    /// True symbol ids in reading order — shape [batch, max_len]
    pub targets: Tensor<B, 2, Int>,

    /// Padding mask — shape [batch, max_len], mask[i][t] = 1 iff
    /// t < lengths[i]
    pub mask: Tensor<B, 2>,

    /// Count of real (non-padding) symbols per sequence
    pub lengths: Vec<usize>,
}

impl<B: Backend> SequenceBatch<B> {
    /// Build a batch directly from id vectors. The batcher delegates
    /// here; tests and the inference path use it without a DataLoader.
    ///
    /// Every id must be < `vocab_size`: an out-of-range id would index
    /// past its own one-hot row (or past the buffer entirely), so it
    /// is rejected here before any tensor is built. This is the same
    /// contract `EncodedSequence::validate` enforces upstream; a stale
    /// vocabulary next to a checkpoint can still produce bad ids at
    /// inference, which is why the check is repeated at this boundary.
    pub fn from_sequences(
        sequences: &[Vec<u32>],
        vocab_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        for (i, seq) in sequences.iter().enumerate() {
            if let Some(&bad) = seq.iter().find(|&&id| id as usize >= vocab_size) {
                bail!(
                    "symbol id {bad} in sequence {i} is out of range for vocabulary size {vocab_size}"
                );
            }
        }

        let batch = sequences.len();
        let lengths: Vec<usize> = sequences.iter().map(|s| s.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        if batch == 0 || max_len == 0 {
            // Degenerate but well-shaped: zero-width tensors
            return Ok(Self {
                inputs: Tensor::zeros([batch, 0, vocab_size], device),
                targets: Tensor::zeros([batch, 0], device),
                mask: Tensor::zeros([batch, 0], device),
                lengths,
            });
        }

        let mut one_hot = vec![0.0f32; batch * max_len * vocab_size];
        let mut target_ids = vec![PAD_ID as i32; batch * max_len];
        let mut mask_flat = vec![0.0f32; batch * max_len];

        for (i, seq) in sequences.iter().enumerate() {
            let len = seq.len();
            for t in 0..max_len {
                // Reversal happens within the true length only, so the
                // padding tail (and the mask invariant) stay in place
                let symbol = if t < len { seq[len - 1 - t] } else { PAD_ID };
                one_hot[(i * max_len + t) * vocab_size + symbol as usize] = 1.0;

                if t < len {
                    target_ids[i * max_len + t] = seq[t] as i32;
                    mask_flat[i * max_len + t] = 1.0;
                }
            }
        }

        let inputs = Tensor::<B, 1>::from_floats(one_hot.as_slice(), device)
            .reshape([batch, max_len, vocab_size]);
        let targets = Tensor::<B, 1, Int>::from_ints(target_ids.as_slice(), device)
            .reshape([batch, max_len]);
        let mask = Tensor::<B, 1>::from_floats(mask_flat.as_slice(), device)
            .reshape([batch, max_len]);

        Ok(Self { inputs, targets, mask, lengths })
    }
}

// ─── SequenceBatcher ──────────────────────────────────────────────────────────
/// Holds the target device and the vocabulary width so batches land
/// on the right device with the right one-hot dimension.
#[derive(Clone, Debug)]
pub struct SequenceBatcher<B: Backend> {
    pub device: B::Device,
    pub vocab_size: usize,
}

impl<B: Backend> SequenceBatcher<B> {
    pub fn new(device: B::Device, vocab_size: usize) -> Self {
        Self { device, vocab_size }
    }
}

impl<B: Backend> Batcher<SequenceSample, SequenceBatch<B>> for SequenceBatcher<B> {
    fn batch(&self, items: Vec<SequenceSample>) -> SequenceBatch<B> {
        let sequences: Vec<Vec<u32>> = items.into_iter().map(|s| s.symbols).collect();
        // The Batcher trait has no error channel; every id was already
        // validated when the dataset was built, so a violation here is
        // a broken pipeline and stops the run.
        match SequenceBatch::from_sequences(&sequences, self.vocab_size, &self.device) {
            Ok(batch) => batch,
            Err(e) => panic!("invalid batch reached the data loader: {e}"),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_mask_invariant() {
        let batch = SequenceBatch::<TestBackend>::from_sequences(
            &[vec![1, 2, 3], vec![1], vec![]],
            4,
            &device(),
        )
        .unwrap();
        assert_eq!(batch.lengths, vec![3, 1, 0]);

        let mask: Vec<f32> = batch.mask.into_data().to_vec().unwrap();
        // mask[i][t] = 1 iff t < lengths[i]
        assert_eq!(mask, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_targets_keep_reading_order() {
        let batch = SequenceBatch::<TestBackend>::from_sequences(&[vec![3, 1, 2]], 4, &device())
            .unwrap();
        let targets: Vec<i32> = batch.targets.into_data().convert::<i32>().to_vec().unwrap();
        assert_eq!(targets, vec![3, 1, 2]);
    }

    #[test]
    fn test_inputs_are_reversed_within_true_length() {
        let batch =
            SequenceBatch::<TestBackend>::from_sequences(&[vec![3, 1, 2], vec![1]], 4, &device())
                .unwrap();
        let inputs: Vec<f32> = batch.inputs.into_data().to_vec().unwrap();

        let one_hot_at = |i: usize, t: usize| -> usize {
            let row = &inputs[(i * 3 + t) * 4..(i * 3 + t + 1) * 4];
            row.iter().position(|&x| x == 1.0).unwrap()
        };

        // Sequence [3, 1, 2] reversed → [2, 1, 3]
        assert_eq!(one_hot_at(0, 0), 2);
        assert_eq!(one_hot_at(0, 1), 1);
        assert_eq!(one_hot_at(0, 2), 3);
        // Padding tail is the PAD row, not part of the reversal
        assert_eq!(one_hot_at(1, 0), 1);
        assert_eq!(one_hot_at(1, 1), PAD_ID as usize);
        assert_eq!(one_hot_at(1, 2), PAD_ID as usize);
    }

    #[test]
    fn test_empty_batch_is_well_shaped() {
        let batch = SequenceBatch::<TestBackend>::from_sequences(&[], 4, &device()).unwrap();
        assert_eq!(batch.inputs.dims(), [0, 0, 4]);
        assert!(batch.lengths.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_id() {
        // id 5 over a vocabulary of 4 would index past its own one-hot
        // row — must fail, never write
        let err = SequenceBatch::<TestBackend>::from_sequences(&[vec![5]], 4, &device())
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_rejects_out_of_range_id_mid_sequence() {
        // A bad id that is not in the last slot would land its 1.0 in
        // the NEXT position's row; the bail must catch this case too
        let err = SequenceBatch::<TestBackend>::from_sequences(&[vec![1, 5]], 4, &device())
            .unwrap_err();
        assert!(err.to_string().contains("vocabulary size 4"));
    }

    #[test]
    fn test_boundary_id_is_accepted() {
        // vocab_size − 1 is the last valid id
        let batch = SequenceBatch::<TestBackend>::from_sequences(&[vec![3]], 4, &device())
            .unwrap();
        assert_eq!(batch.lengths, vec![1]);
    }
}
