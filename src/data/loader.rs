// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads every .txt file in a directory, one sentence per line.
// Implements the CorpusSource trait from Layer 3 so the application
// layer never touches the filesystem directly.

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::domain::traits::CorpusSource;

/// Loads sentences from all .txt files in a directory.
pub struct TextLoader {
    dir: String,
}

impl TextLoader {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CorpusSource for TextLoader {
    fn load_all(&self) -> Result<Vec<String>> {
        let dir = Path::new(&self.dir);

        // A missing directory degrades to an empty corpus rather than
        // crashing, so the CLI can still print a useful message.
        if !dir.exists() {
            tracing::warn!(
                "Corpus directory '{}' does not exist — returning empty corpus",
                self.dir
            );
            return Ok(Vec::new());
        }

        let mut sentences = Vec::new();

        for entry in fs::read_dir(dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir))?
        {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read '{}'", path.display()))?;
                let before = sentences.len();
                sentences.extend(
                    text.lines()
                        .map(|line| line.trim().to_string())
                        .filter(|line| !line.is_empty()),
                );
                tracing::debug!(
                    "Loaded {} sentences from '{}'",
                    sentences.len() - before,
                    path.display()
                );
            }
        }

        tracing::info!("Corpus: {} sentences from '{}'", sentences.len(), self.dir);
        Ok(sentences)
    }
}
