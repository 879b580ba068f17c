// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer programs against these seams instead of
// concrete types, so the corpus format can change without touching
// the training pipeline.

use anyhow::Result;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Any component that can produce a corpus of raw sentences.
///
/// Implementations:
///   - TextLoader → reads one sentence per line from .txt files
///   - (future) JsonlLoader → reads a field from .jsonl records
pub trait CorpusSource {
    /// Load every sentence available from this source.
    fn load_all(&self) -> Result<Vec<String>>;
}
