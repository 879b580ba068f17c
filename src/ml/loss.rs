// ============================================================
// Layer 5 — Loss Combiner
// ============================================================
// The training objective has two parts:
//
//   1. Masked sequence reconstruction loss — cross-entropy between
//      raw symbol scores and the true symbols, weighted by the
//      padding mask. Padding positions contribute zero loss AND are
//      excluded from the normalisation denominator.
//
//   2. Latent regularisation — the closed-form KL divergence between
//      the learned diagonal Gaussian posterior and a standard normal
//      prior, per sequence:
//
//        −0.5 · Σ_d (1 + logvar_d − mean_d² − exp(logvar_d))
//
// Combined: loss = reconstruction + β·λ·mean(latent), where β is the
// deterministic warm-up weight annealed from 0 to 1 over training.
// Starting β at 0 keeps the KL term from collapsing the posterior to
// the prior before the decoder has learned to use the latent code.
//
// Reference: Kingma & Welling (2014) Auto-Encoding Variational Bayes
//            Bowman et al. (2016) Generating Sentences from a
//            Continuous Space (KL annealing)

use burn::{prelude::*, tensor::activation::log_softmax};

/// The combined loss and its two components, kept separate for
/// epoch reporting. All three are scalar tensors.
#[derive(Debug, Clone)]
pub struct LossBreakdown<B: Backend> {
    pub total: Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
    pub latent: Tensor<B, 1>,
}

/// Mask-weighted cross-entropy over a batch of score sequences,
/// normalised by the number of real (unmasked) positions.
///
/// * `scores`  — raw symbol scores `[batch, steps, vocab]`
/// * `targets` — true symbol ids `[batch, steps]`
/// * `mask`    — 1.0 at real positions, 0.0 at padding `[batch, steps]`
///
/// With an all-ones mask this equals the plain mean cross-entropy;
/// with an all-zero mask it is exactly zero (the denominator is
/// clamped, never divided by zero).
pub fn masked_sequence_loss<B: Backend>(
    scores: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    mask: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [_, steps, _] = scores.dims();
    if steps == 0 {
        // A zero-step decode has nothing to score
        return Tensor::zeros([1], &mask.device());
    }

    let weighted = position_cross_entropy(scores, targets) * mask.clone();
    let denom = mask.sum().clamp_min(1.0);
    weighted.sum() / denom
}

/// Summed masked cross-entropy per sequence, `[batch]`. A sequence
/// with length 0 (all-zero mask row) comes out exactly zero.
pub fn per_sequence_loss<B: Backend>(
    scores: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    mask: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch, steps, _] = scores.dims();
    if steps == 0 {
        return Tensor::zeros([batch], &mask.device());
    }

    let weighted = position_cross_entropy(scores, targets) * mask;
    weighted.sum_dim(1).squeeze::<1>(1)
}

/// Per-position cross-entropy `[batch, steps]` from raw scores.
fn position_cross_entropy<B: Backend>(
    scores: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 2> {
    let log_probs = log_softmax(scores, 2);
    let picked: Tensor<B, 3> = log_probs.gather(2, targets.unsqueeze_dim(2));
    picked.squeeze::<2>(2).neg()
}

/// Closed-form KL divergence between N(mean, exp(logvar)) and N(0, I),
/// summed over latent dimensions: one value per sequence, `[batch]`.
///
/// Zero exactly when mean = 0 and logvar = 0 (posterior == prior).
pub fn gaussian_prior_divergence<B: Backend>(
    mean: Tensor<B, 2>,
    log_var: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let term = log_var.clone().add_scalar(1.0) - mean.clone() * mean - log_var.exp();
    term.sum_dim(1).squeeze::<1>(1).mul_scalar(-0.5)
}

/// Combine the two components with the annealing weight β and the
/// fixed latent-loss scale λ.
pub fn combined_loss<B: Backend>(
    reconstruction: Tensor<B, 1>,
    latent_per_sequence: Tensor<B, 1>,
    beta: f64,
    latent_loss_weight: f64,
) -> LossBreakdown<B> {
    let latent = latent_per_sequence.mean();
    let total = reconstruction.clone() + latent.clone().mul_scalar(beta * latent_loss_weight);
    LossBreakdown {
        total,
        reconstruction,
        latent,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    /// Uniform scores: cross-entropy at every position is ln(vocab).
    fn uniform_scores(batch: usize, steps: usize, vocab: usize) -> Tensor<TestBackend, 3> {
        Tensor::zeros([batch, steps, vocab], &device())
    }

    fn targets(batch: usize, steps: usize) -> Tensor<TestBackend, 2, Int> {
        Tensor::zeros([batch, steps], &device())
    }

    #[test]
    fn test_all_ones_mask_equals_unmasked_cross_entropy() {
        let scores = uniform_scores(2, 3, 8);
        let mask = Tensor::ones([2, 3], &device());
        let loss = scalar(masked_sequence_loss(scores, targets(2, 3), mask));
        let expected = (8.0f32).ln();
        assert!((loss - expected).abs() < 1e-5, "loss {loss} vs {expected}");
    }

    #[test]
    fn test_all_zero_mask_gives_zero_loss() {
        let scores = uniform_scores(2, 3, 8);
        let mask = Tensor::zeros([2, 3], &device());
        let loss = scalar(masked_sequence_loss(scores, targets(2, 3), mask));
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_padding_positions_do_not_affect_denominator() {
        // Two sequences, lengths 3 and 1: denominator must be 4, not 6
        let scores = uniform_scores(2, 3, 4);
        let mask = Tensor::<TestBackend, 1>::from_floats(
            [1.0, 1.0, 1.0, 1.0, 0.0, 0.0],
            &device(),
        )
        .reshape([2, 3]);
        let loss = scalar(masked_sequence_loss(scores, targets(2, 3), mask));
        let expected = (4.0f32).ln(); // 4·ln4 / 4
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_zero_length_sequence_has_zero_loss() {
        // Lengths [3, 5, 0] over 5 padded steps: row 2 is fully masked
        let scores = uniform_scores(3, 5, 6);
        let mask = Tensor::<TestBackend, 1>::from_floats(
            [
                1.0, 1.0, 1.0, 0.0, 0.0, //
                1.0, 1.0, 1.0, 1.0, 1.0, //
                0.0, 0.0, 0.0, 0.0, 0.0,
            ],
            &device(),
        )
        .reshape([3, 5]);

        let per_seq: Vec<f32> = per_sequence_loss(scores, targets(3, 5), mask)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(per_seq.len(), 3);
        assert_eq!(per_seq[2], 0.0);
        assert!(per_seq[0] > 0.0);
        assert!(per_seq[1] > per_seq[0]);
    }

    #[test]
    fn test_latent_term_zero_when_posterior_equals_prior() {
        let mean = Tensor::zeros([2, 4], &device());
        let log_var = Tensor::zeros([2, 4], &device());
        let per_seq: Vec<f32> = gaussian_prior_divergence::<TestBackend>(mean, log_var)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(per_seq, vec![0.0, 0.0]);
    }

    #[test]
    fn test_latent_term_positive_away_from_prior() {
        let mean = Tensor::ones([1, 4], &device());
        let log_var = Tensor::zeros([1, 4], &device());
        let kl = scalar(gaussian_prior_divergence::<TestBackend>(mean, log_var));
        // −0.5·Σ(1 + 0 − 1 − 1) = 0.5 per dimension
        assert!((kl - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_increasing_beta_increases_combined_loss() {
        let recon = Tensor::<TestBackend, 1>::from_floats([1.0], &device());
        let latent = Tensor::<TestBackend, 1>::from_floats([2.0, 4.0], &device());

        let low = scalar(combined_loss(recon.clone(), latent.clone(), 0.2, 0.1).total);
        let high = scalar(combined_loss(recon, latent, 0.9, 0.1).total);
        assert!(high > low);
    }
}
