// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// End-to-end demonstration run on synthetic interactions:
//
//   Step 1: Generate users/products with hidden affinities
//   Step 2: Log treatment (policy-biased) and control (uniform) events
//   Step 3: Split train / validation
//   Step 4: Fit the average-predictor baseline on the training set
//   Step 5: Run gradient-descent epochs, logging metrics per step
//   Step 6: Evaluate on held-out control events against the baseline
//
// Real drivers bring their own data and batching; this one
// exists so the library can be exercised without any files.

use anyhow::{ensure, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::interaction::{Arm, Interaction};
use crate::infra::metrics::MetricsLogger;
use crate::ml::average_predictor::AveragePredictor;
use crate::ml::model::Prod2VecConfig;
use crate::ml::trainer::{EvalMetrics, Prod2VecTrainer};

/// Dimension of the hidden affinity vectors the generator samples.
const LATENT_DIM: usize = 4;

/// Candidates the simulated recommender looks at before picking one.
const POLICY_CANDIDATES: usize = 5;

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub model:                 Prod2VecConfig,
    pub epochs:                usize,
    pub batch_size:            usize,
    pub interactions_per_user: usize,
    /// Share of logged events that come from uniform exposure
    pub control_fraction:      f64,
    pub train_fraction:        f64,
    pub metrics_dir:           String,
    pub seed:                  u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model:                 Prod2VecConfig::new(200, 50, 16).with_l2_pen(1e-4),
            epochs:                5,
            batch_size:            64,
            interactions_per_user: 40,
            control_fraction:      0.1,
            train_fraction:        0.8,
            metrics_dir:           "metrics".to_string(),
            seed:                  42,
        }
    }
}

impl TrainConfig {
    /// Read a JSON config if `path` exists, otherwise use defaults.
    /// A config read from disk is validated before it is returned.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config in '{}'", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in '{}'", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.interactions_per_user > 0, "interactions_per_user must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.control_fraction),
            "control_fraction must lie in [0, 1], got {}", self.control_fraction
        );
        ensure!(
            (0.0..=1.0).contains(&self.train_fraction),
            "train_fraction must lie in [0, 1], got {}", self.train_fraction
        );
        ensure!(
            train_split_len(self.total_interactions(), self.train_fraction) > 0,
            "train_fraction {} leaves no training interactions out of {}",
            self.train_fraction, self.total_interactions()
        );
        Ok(())
    }

    fn total_interactions(&self) -> usize {
        self.model.num_users * self.interactions_per_user
    }
}

/// What a finished run reports back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub steps:         usize,
    pub baseline_rate: f32,
    /// None when `train_fraction` keeps every interaction for training
    pub validation:    Option<EvalMetrics>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainReport> {
        let cfg = &self.config;
        cfg.validate()?;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        // ── Steps 1-2: synthetic logs ─────────────────────────────────────────
        let interactions = simulate_interactions(cfg, &mut rng);
        let controls     = interactions.iter().filter(|i| i.is_control()).count();
        tracing::info!(
            "Simulated {} interactions ({} control)",
            interactions.len(),
            controls
        );

        // ── Step 3: split ─────────────────────────────────────────────────────
        let (train, val) = split_train_val(interactions, cfg.train_fraction, &mut rng);
        tracing::info!("Split: {} train, {} validation", train.len(), val.len());
        if val.is_empty() {
            tracing::info!("Validation split is empty; skipping evaluation");
        }

        // ── Step 4: baseline ──────────────────────────────────────────────────
        let baseline = AveragePredictor::fit(&train)?;
        tracing::info!("Baseline conversion rate: {:.4}", baseline.rate());

        // ── Step 5: training loop ─────────────────────────────────────────────
        let mut trainer = Prod2VecTrainer::<B>::new(cfg.model.clone(), device)?;
        let metrics     = MetricsLogger::new(&cfg.metrics_dir)?;
        let mut train   = train;

        for epoch in 1..=cfg.epochs {
            train.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            let mut batches  = 0usize;
            for chunk in train.chunks(cfg.batch_size) {
                let out = trainer.train_on(chunk)?;
                metrics.log(out.global_step, &out.losses)?;
                if let Some(norms) = &out.gradient_norms {
                    for n in norms {
                        tracing::debug!("step {} grad |{}| = {:.6}", out.global_step, n.name, n.norm);
                    }
                }
                loss_sum += out.losses.loss;
                batches  += 1;
            }
            let train_loss = loss_sum / batches as f64;

            if val.is_empty() {
                println!("Epoch {:>3}/{} | train_loss={:.4}", epoch, cfg.epochs, train_loss);
                continue;
            }

            let eval = trainer.evaluate(&val, Some(baseline.rate()))?;
            println!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_log_loss={:.4} | val_mse={:.4}",
                epoch, cfg.epochs, train_loss, eval.log_loss, eval.mse_loss,
            );
            trainer.summarize(&val)?.log();
        }

        // ── Step 6: held-out control events ───────────────────────────────────
        // Uniform exposure is the unbiased test set; fall back to the
        // whole validation split if the simulation produced none.
        let validation = if val.is_empty() {
            None
        } else {
            let val_controls: Vec<Interaction> =
                val.iter().filter(|i| i.is_control()).cloned().collect();
            let test_set = if val_controls.is_empty() { &val } else { &val_controls };
            let metrics  = trainer.evaluate(test_set, Some(baseline.rate()))?;

            if let Some(ap) = &metrics.average_predictor {
                tracing::info!(
                    "Control set: model log_loss={:.4} mse={:.4} | baseline log_loss={:.4} mse={:.4}",
                    metrics.log_loss, metrics.mse_loss, ap.log_loss, ap.mse_loss,
                );
            }
            Some(metrics)
        };

        Ok(TrainReport {
            steps:         trainer.global_step(),
            baseline_rate: baseline.rate(),
            validation,
        })
    }
}

// ─── Synthetic Logs ───────────────────────────────────────────────────────────
// Each user and product gets a hidden vector; the true conversion
// probability is sigmoid(3·<u, p> - 1.5). Treatment events come from
// a policy that picks the best of a few random candidates, so they
// over-represent high-affinity pairs. Control events pick uniformly.
fn simulate_interactions(cfg: &TrainConfig, rng: &mut StdRng) -> Vec<Interaction> {
    let m = &cfg.model;
    let users: Vec<Vec<f64>>    = (0..m.num_users).map(|_| latent(rng)).collect();
    let products: Vec<Vec<f64>> = (0..m.num_products).map(|_| latent(rng)).collect();

    let affinity = |u: usize, p: usize| -> f64 {
        users[u].iter().zip(&products[p]).map(|(a, b)| a * b).sum()
    };

    let mut out = Vec::with_capacity(m.num_users * cfg.interactions_per_user);
    for user in 0..m.num_users {
        for _ in 0..cfg.interactions_per_user {
            let control = m.is_causal() && rng.gen_bool(cfg.control_fraction);
            let product = if control {
                rng.gen_range(0..m.num_products)
            } else {
                (0..POLICY_CANDIDATES)
                    .map(|_| rng.gen_range(0..m.num_products))
                    .max_by(|&a, &b| affinity(user, a).total_cmp(&affinity(user, b)))
                    .unwrap_or(0)
            };

            let p     = 1.0 / (1.0 + (-(3.0 * affinity(user, product) - 1.5)).exp());
            let label = if rng.gen_bool(p) { 1.0 } else { 0.0 };
            let arm   = if control { Arm::Control } else { Arm::Treatment };
            out.push(Interaction::new(user, product, label, arm));
        }
    }
    out
}

fn latent(rng: &mut StdRng) -> Vec<f64> {
    (0..LATENT_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Number of items the training side of a split keeps.
fn train_split_len(total: usize, train_fraction: f64) -> usize {
    (((total as f64) * train_fraction).round() as usize).min(total)
}

/// Shuffle and split into (train, validation).
fn split_train_val<T>(mut items: Vec<T>, train_fraction: f64, rng: &mut StdRng) -> (Vec<T>, Vec<T>) {
    items.shuffle(rng);
    let split_at = train_split_len(items.len(), train_fraction);
    let val      = items.split_off(split_at);
    (items, val)
}
