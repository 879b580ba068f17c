// ============================================================
// Layer 6 — Infrastructure
// ============================================================
// Everything that touches the filesystem lives here:
//
//   checkpoint.rs  — model weights + train config persistence
//   metrics.rs     — per-epoch CSV training log
//   vocab_store.rs — word-level vocabulary build/save/load

/// Model weight and training-config persistence (CompactRecorder)
pub mod checkpoint;

/// Per-epoch metrics CSV logger
pub mod metrics;

/// Word-level vocabulary with reserved [PAD]/[UNK]/[EOS] ids
pub mod vocab_store;
