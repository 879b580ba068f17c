// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + validation loop using Burn's DataLoader and Adam.
//
// Per step: validate the batch, forward, combine the losses with the
// current β, check the scalar is finite, THEN backward + Adam. A
// step fails atomically — nothing touches the weights until the loss
// has been read back and verified, so a NaN batch can never poison
// the parameters.
//
// β follows the deterministic warm-up: annealed linearly from 0 to 1
// over the configured number of epochs, so the KL term cannot crush
// the latent code before the decoder has learned to read it.
//
// Training runs on Autodiff<Wgpu>; validation uses model.valid() on
// the inner backend (no autodiff overhead, dropout off).

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::SequenceBatch, batcher::SequenceBatcher, dataset::SequenceDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::model::Vrae;

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

// ─── β schedule ───────────────────────────────────────────────────────────────
/// Linear deterministic warm-up: β climbs from 0 to 1 over
/// `warmup_epochs`, then stays at 1.
#[derive(Debug, Clone, Copy)]
pub struct BetaSchedule {
    warmup_epochs: usize,
}

impl BetaSchedule {
    pub fn new(warmup_epochs: usize) -> Self {
        Self { warmup_epochs }
    }

    /// β for a 1-based epoch number.
    pub fn beta_for(&self, epoch: usize) -> f64 {
        if self.warmup_epochs == 0 {
            return 1.0;
        }
        ((epoch.saturating_sub(1)) as f64 / self.warmup_epochs as f64).min(1.0)
    }
}

// ─── One training step ────────────────────────────────────────────────────────
/// Scalar diagnostics read back from one step.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub loss: f64,
    pub reconstruction: f64,
    pub latent: f64,
    /// max(lengths) — the number of decoder steps actually run
    pub max_length: usize,
}

/// One forward/backward/update cycle. Returns the updated model.
///
/// Fails (model unchanged) on a batch contract violation or a
/// non-finite loss; the caller decides whether to skip or abort.
pub fn train_step<B, O>(
    model: Vrae<B>,
    optim: &mut O,
    batch: &SequenceBatch<B>,
    beta: f64,
    lr: f64,
) -> Result<(Vrae<B>, StepOutcome)>
where
    B: AutodiffBackend,
    O: Optimizer<Vrae<B>, B>,
{
    model.validate_batch(batch)?;

    let (loss, _output) = model.forward_loss(batch, beta, true);

    let loss_val: f64 = loss.total.clone().into_scalar().elem::<f64>();
    let recon_val: f64 = loss.reconstruction.into_scalar().elem::<f64>();
    let latent_val: f64 = loss.latent.into_scalar().elem::<f64>();

    // Detect-and-abort before any weight mutation
    if !loss_val.is_finite() {
        bail!("non-finite loss ({loss_val}) — step aborted before the optimiser update");
    }

    let grads = loss.total.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optim.step(lr, model, grads);

    let outcome = StepOutcome {
        loss: loss_val,
        reconstruction: recon_val,
        latent: latent_val,
        max_length: batch.lengths.iter().copied().max().unwrap_or(0),
    };
    Ok((model, outcome))
}

// ─── Training loop ────────────────────────────────────────────────────────────
pub fn run_training(
    cfg: &TrainConfig,
    train_dataset: SequenceDataset,
    val_dataset: SequenceDataset,
    ckpt_manager: CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    if cfg.half_precision {
        tracing::warn!("half_precision requested but the wgpu training path runs f32");
    }

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: Vrae<MyBackend> = cfg.model_config().init(&device);
    tracing::info!(
        "Model ready: {:?} cells, {} layers, state={}, latent={}",
        cfg.cell,
        cfg.num_layers,
        cfg.state_size,
        cfg.latent_dim,
    );

    let optim_cfg = AdamConfig::new().with_epsilon(1e-8);
    let mut optim = optim_cfg.init();

    let schedule = BetaSchedule::new(cfg.warmup_epochs);
    let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = SequenceBatcher::<MyBackend>::new(device.clone(), cfg.vocab_size);
    let train_loader = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(42)
        .num_workers(1)
        .build(train_dataset);

    // ── Validation data loader (inner backend, no autodiff) ───────────────────
    let val_batcher = SequenceBatcher::<MyInnerBackend>::new(device.clone(), cfg.vocab_size);
    let val_loader = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(val_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let beta = schedule.beta_for(epoch);

        let mut loss_sum = 0.0f64;
        let mut recon_sum = 0.0f64;
        let mut latent_sum = 0.0f64;
        let mut batches = 0usize;

        for batch in train_loader.iter() {
            let (updated, outcome) = train_step(model, &mut optim, &batch, beta, cfg.lr)?;
            model = updated;

            loss_sum += outcome.loss;
            recon_sum += outcome.reconstruction;
            latent_sum += outcome.latent;
            batches += 1;
        }

        let avg = |sum: f64| if batches > 0 { sum / batches as f64 } else { f64::NAN };
        let train_loss = avg(loss_sum);

        // ── Validation phase (β = 1, dropout off) ─────────────────────────────
        let (val_loss, token_acc) = run_validation(&model.valid(), &val_loader)?;

        println!(
            "Epoch {:>3}/{} | beta={:.3} | train_loss={:.4} | val_loss={:.4} | recon={:.4} | latent={:.4} | tok_acc={:.1}%",
            epoch, cfg.epochs, beta, train_loss, val_loss,
            avg(recon_sum), avg(latent_sum), token_acc * 100.0,
        );

        metrics.log(&EpochMetrics {
            epoch,
            train_loss,
            val_loss,
            reconstruction: avg(recon_sum),
            latent: avg(latent_sum),
            beta,
            token_accuracy: token_acc,
        })?;

        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Training complete!");
    Ok(())
}

/// Held-out loss at β = 1 plus greedy token accuracy on real
/// (unmasked) positions.
fn run_validation(
    model: &Vrae<MyInnerBackend>,
    val_loader: &std::sync::Arc<
        dyn burn::data::dataloader::DataLoader<SequenceBatch<MyInnerBackend>>,
    >,
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0f64;
    let mut batches = 0usize;
    let mut correct = 0.0f64;
    let mut total = 0.0f64;

    for batch in val_loader.iter() {
        model.validate_batch(&batch)?;
        let (loss, output) = model.forward_loss(&batch, 1.0, false);

        loss_sum += loss.total.into_scalar().elem::<f64>();
        batches += 1;

        let [b, steps, _] = output.scores.dims();
        if steps == 0 {
            continue;
        }
        let targets = batch.targets.clone().slice([0..b, 0..steps]);
        let mask = batch.mask.clone().slice([0..b, 0..steps]);

        // argmax over the vocab axis → predicted symbol per position
        let predicted = output.scores.argmax(2).squeeze::<2>(2);
        let hits = predicted.equal(targets).int().float() * mask.clone();

        correct += hits.sum().into_scalar().elem::<f64>();
        total += mask.sum().into_scalar().elem::<f64>();
    }

    let val_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
    let token_acc = if total > 0.0 { correct / total } else { 0.0 };
    Ok((val_loss, token_acc))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::VraeConfig;

    type TestAutodiff = burn::backend::Autodiff<burn::backend::NdArray>;

    fn device() -> <TestAutodiff as Backend>::Device {
        Default::default()
    }

    fn test_model() -> Vrae<TestAutodiff> {
        VraeConfig::new(4, 8, 1, 4, 2).init(&device())
    }

    #[test]
    fn test_non_finite_loss_aborts_before_optimiser_update() {
        let model = test_model();
        let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

        let clean = SequenceBatch::from_sequences(&[vec![1, 2, 3]], 4, &device()).unwrap();

        // Valid shapes, poisoned values: NaN inputs pass validate_batch
        // but drive the loss non-finite
        let mut poisoned = clean.clone();
        poisoned.inputs = Tensor::full([1, 3, 4], f32::NAN, &device());

        let before: Vec<f32> = model
            .encode_to_latent(&clean)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();

        let err = train_step(model.clone(), &mut optim, &poisoned, 0.5, 1e-3).unwrap_err();
        assert!(err.to_string().contains("non-finite loss"));

        // The step failed atomically: no weight was touched and the
        // optimiser is still usable on the next batch
        let after: Vec<f32> = model
            .encode_to_latent(&clean)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(before, after);

        let (_model, outcome) = train_step(model, &mut optim, &clean, 0.5, 1e-3).unwrap();
        assert!(outcome.loss.is_finite());
    }

    #[test]
    fn test_train_step_rejects_invalid_batch() {
        let model = test_model();
        let mut optim = AdamConfig::new().init();

        let mut bad = SequenceBatch::from_sequences(&[vec![1, 2]], 4, &device()).unwrap();
        bad.lengths = vec![5]; // exceeds the padded width of 2

        let err = train_step(model, &mut optim, &bad, 1.0, 1e-3).unwrap_err();
        assert!(err.to_string().contains("exceeds padded width"));
    }

    #[test]
    fn test_beta_starts_at_zero_and_reaches_one() {
        let s = BetaSchedule::new(10);
        assert_eq!(s.beta_for(1), 0.0);
        assert_eq!(s.beta_for(11), 1.0);
        assert_eq!(s.beta_for(50), 1.0);
    }

    #[test]
    fn test_beta_is_monotone() {
        let s = BetaSchedule::new(7);
        let mut last = -1.0;
        for epoch in 1..20 {
            let beta = s.beta_for(epoch);
            assert!(beta >= last);
            assert!((0.0..=1.0).contains(&beta));
            last = beta;
        }
    }

    #[test]
    fn test_zero_warmup_means_full_beta() {
        let s = BetaSchedule::new(0);
        assert_eq!(s.beta_for(1), 1.0);
    }
}
