// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Normalises raw corpus lines before vocabulary lookup:
//   - lowercases (the vocabulary is case-insensitive)
//   - strips control characters
//   - collapses runs of whitespace to a single space
//
// Sentences longer than `max_symbols` words are dropped rather than
// truncated — a truncated sentence teaches the decoder to stop in
// the wrong places.

pub struct Preprocessor {
    max_symbols: usize,
}

impl Preprocessor {
    pub fn new(max_symbols: usize) -> Self {
        Self { max_symbols }
    }

    /// Clean one line; returns None if the sentence is unusable
    /// (empty after cleaning, or too long).
    pub fn clean(&self, line: &str) -> Option<String> {
        let cleaned: String = line
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_control())
            .collect();

        let normalised = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalised.is_empty() {
            return None;
        }
        if normalised.split_whitespace().count() > self.max_symbols {
            return None;
        }
        Some(normalised)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_lowercases() {
        let p = Preprocessor::new(20);
        assert_eq!(p.clean("  The   QUICK fox  "), Some("the quick fox".into()));
    }

    #[test]
    fn test_drops_empty_lines() {
        let p = Preprocessor::new(20);
        assert_eq!(p.clean("   \t  "), None);
    }

    #[test]
    fn test_drops_overlong_sentences() {
        let p = Preprocessor::new(3);
        assert_eq!(p.clean("one two three four"), None);
        assert_eq!(p.clean("one two three"), Some("one two three".into()));
    }

    #[test]
    fn test_strips_control_characters() {
        let p = Preprocessor::new(20);
        assert_eq!(p.clean("he\u{0007}llo world"), Some("hello world".into()));
    }
}
