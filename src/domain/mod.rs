// ============================================================
// Layer 3 — Domain Types and Abstractions
// ============================================================
// Plain data types and trait seams shared by every other layer.
// Nothing in here depends on burn, clap or the filesystem, so
// the domain is testable without a GPU or any fixtures on disk.

/// Encoded symbol sequences and their invariants
pub mod sequence;

/// Trait seams between the application layer and concrete IO
pub mod traits;
