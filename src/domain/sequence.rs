// ============================================================
// Layer 3 — Encoded Sequence Domain Type
// ============================================================
// A sentence after vocabulary lookup: a finite ordered list of
// symbol ids over a fixed vocabulary. This is the unit the whole
// pipeline moves around — batching pads groups of these to a
// common length and derives the mask/length bookkeeping from them.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A single sequence of symbol ids, unpadded.
///
/// Invariant: every id is < vocab_size of the vocabulary that
/// produced it. `validate` re-checks this at the model boundary so
/// a stale vocabulary file fails fast instead of corrupting a
/// gather/one-hot downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedSequence {
    /// Symbol ids in reading order, terminated by [EOS]
    pub symbols: Vec<u32>,
}

impl EncodedSequence {
    pub fn new(symbols: Vec<u32>) -> Self {
        Self { symbols }
    }

    /// Number of real (non-padding) symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Fail-fast contract check: every symbol id must fall inside the
    /// vocabulary. Called before any tensor is built so that a
    /// violation can never reach the model weights.
    pub fn validate(&self, vocab_size: usize) -> Result<()> {
        for (pos, &id) in self.symbols.iter().enumerate() {
            if id as usize >= vocab_size {
                bail!(
                    "symbol id {} at position {} is out of range for vocabulary size {}",
                    id,
                    pos,
                    vocab_size
                );
            }
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_in_range_ids() {
        let seq = EncodedSequence::new(vec![0, 3, 7, 2]);
        assert!(seq.validate(8).is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_id() {
        let seq = EncodedSequence::new(vec![0, 9, 2]);
        let err = seq.validate(8).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_empty_sequence_is_valid() {
        let seq = EncodedSequence::new(Vec::new());
        assert!(seq.validate(4).is_ok());
        assert!(seq.is_empty());
    }
}
