// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From raw text files to padded tensor batches:
//
//   .txt files
//       │
//       ▼
//   TextLoader        → one raw sentence per line
//       │
//       ▼
//   Preprocessor      → lowercase, strip, length filter
//       │
//       ▼
//   VocabStore        → words to symbol ids (Layer 6)
//       │
//       ▼
//   SequenceDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   SequenceBatcher   → pads, one-hots, masks, reverses
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Each module is responsible for exactly one step.

/// Reads sentences from .txt files in a directory
pub mod loader;

/// Cleans and normalises raw corpus lines
pub mod preprocessor;

/// Implements Burn's Dataset trait for encoded sequences
pub mod dataset;

/// Implements Burn's Batcher trait: padding, one-hot, mask, lengths
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
