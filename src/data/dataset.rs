use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::sequence::EncodedSequence;

/// One vocabulary-encoded sentence, [EOS]-terminated, unpadded.
/// Padding happens per batch in the batcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSample {
    pub symbols: Vec<u32>,
}

impl SequenceSample {
    pub fn from_sequence(seq: EncodedSequence) -> Self {
        Self { symbols: seq.symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

pub struct SequenceDataset {
    samples: Vec<SequenceSample>,
}

impl SequenceDataset {
    pub fn new(samples: Vec<SequenceSample>) -> Self {
        Self { samples }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Dataset<SequenceSample> for SequenceDataset {
    fn get(&self, index: usize) -> Option<SequenceSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
