// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics per epoch:
//   - epoch:          the epoch number (1, 2, 3, ...)
//   - train_loss:     average combined loss on the training set
//   - val_loss:       combined loss on the validation set (β = 1)
//   - reconstruction: masked cross-entropy component
//   - latent:         mean KL divergence from the prior
//   - beta:           the warm-up coefficient used this epoch
//   - token_accuracy: greedy per-symbol accuracy on real positions
//
// Output file: checkpoints/metrics.csv
//
// Reading the curves: reconstruction should fall steadily; if the
// latent column collapses to ~0 early while β is still small, the
// decoder is ignoring z (posterior collapse) and warm-up should be
// lengthened.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average combined loss over all training batches
    pub train_loss: f64,

    /// Combined loss on the validation set, always at β = 1
    /// Should track train_loss — divergence indicates overfitting
    pub val_loss: f64,

    /// Masked cross-entropy component, averaged over batches
    /// Random initialisation gives ~ln(vocab_size)
    pub reconstruction: f64,

    /// Mean KL divergence from N(0, I), averaged over batches
    pub latent: f64,

    /// Warm-up coefficient for this epoch, in [0, 1]
    pub beta: f64,

    /// Fraction of unmasked positions predicted exactly (greedy)
    pub token_accuracy: f64,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        // Header only for a fresh file, so reruns append cleanly
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(
                f,
                "epoch,train_loss,val_loss,reconstruction,latent,beta,token_accuracy"
            )?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.3},{:.6}",
            m.epoch, m.train_loss, m.val_loss, m.reconstruction, m.latent, m.beta, m.token_accuracy,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch: 2,
            train_loss: 2.5,
            val_loss,
            reconstruction: 2.4,
            latent: 0.1,
            beta: 0.5,
            token_accuracy: 0.2,
        }
    }

    #[test]
    fn test_is_improvement() {
        let m = row(2.3);
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let dir = std::env::temp_dir().join("vrae_metrics_test");
        let _ = fs::remove_dir_all(&dir);

        let logger = MetricsLogger::new(dir.to_string_lossy().to_string()).unwrap();
        logger.log(&row(2.3)).unwrap();

        let content = fs::read_to_string(logger.csv_path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "epoch,train_loss,val_loss,reconstruction,latent,beta,token_accuracy"
        );
        assert!(lines.next().unwrap().starts_with("2,2.5"));

        let _ = fs::remove_dir_all(&dir);
    }
}
