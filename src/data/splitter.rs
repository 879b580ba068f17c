// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples and splits them into a training set (weight
// updates) and a validation set (held-out loss, β fixed at 1).
// Corpus files are often sorted by source, so the shuffle keeps both
// sets representative.

use rand::seq::SliceRandom;

/// Randomly shuffle `samples` and split into (train, validation).
///
/// `train_fraction` is the proportion kept for training, e.g. 0.9.
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64) -> (Vec<T>, Vec<T>) {
    let mut rng = rand::thread_rng();
    samples.shuffle(&mut rng);

    let total = samples.len();
    let split_at = (((total as f64) * train_fraction).round() as usize).min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val) = split_train_val(items, 0.9);
        assert_eq!(train.len(), 90);
        assert_eq!(val.len(), 10);
    }

    #[test]
    fn test_no_items_lost() {
        let items: Vec<usize> = (0..37).collect();
        let (train, val) = split_train_val(items, 0.8);
        assert_eq!(train.len() + val.len(), 37);
    }

    #[test]
    fn test_empty_input() {
        let (train, val) = split_train_val(Vec::<usize>::new(), 0.8);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
