// ============================================================
// Layer 5 — Training Step
// ============================================================
// Plain gradient descent on the full objective:
//
//   θ = θ - lr * ∂loss/∂θ
//
// for all six parameters (embeddings, biases, global bias, alpha).
// The trainer owns the model, the optimiser state and a global
// step counter. The caller decides how interactions are grouped
// into batches and how many steps to run.
//
// With `plot_gradients` the step also reports the L2 norm of
// every parameter's gradient, read before the update is applied.
//
// Reference: Burn Book §5 (Custom Training Loop)

use anyhow::{ensure, Result};
use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, GradientsParams, Optimizer, Sgd, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::domain::interaction::Interaction;
use crate::infra::summaries::Summary;
use crate::ml::average_predictor::{average_predictor_losses, AveragePredictorLoss};
use crate::ml::batch::Prod2VecBatch;
use crate::ml::inferencer::Prod2VecScorer;
use crate::ml::loss::{scalar, LossValues};
use crate::ml::model::{Prod2VecConfig, Prod2VecModel};

type SgdOptimizer<B> =
    OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, Prod2VecModel<B>, B>;

/// L2 norm of one parameter's gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientNorm {
    pub name: String,
    pub norm: f64,
}

impl GradientNorm {
    fn of<B: Backend, const D: usize>(name: &str, grad: Option<Tensor<B, D>>) -> Self {
        // A parameter the loss never touched has no gradient entry
        let norm = grad
            .map(|g| g.powf_scalar(2.0).sum().sqrt().into_scalar().elem::<f64>())
            .unwrap_or(0.0);
        Self { name: name.to_string(), norm }
    }
}

/// Result of one optimiser step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    /// Value of the counter after this step. It advances on every
    /// applied update, including steps that report gradient norms.
    pub global_step:    usize,
    /// Losses measured before the update
    pub losses:         LossValues,
    /// Present only when `plot_gradients` is set
    pub gradient_norms: Option<Vec<GradientNorm>>,
}

/// Held-out metrics for the model and, optionally, the baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub log_loss:          f64,
    pub mse_loss:          f64,
    pub average_predictor: Option<AveragePredictorLoss>,
}

pub struct Prod2VecTrainer<B: AutodiffBackend> {
    config:      Prod2VecConfig,
    model:       Prod2VecModel<B>,
    optim:       SgdOptimizer<B>,
    global_step: usize,
    device:      B::Device,
}

impl<B: AutodiffBackend> Prod2VecTrainer<B> {
    pub fn new(config: Prod2VecConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let model = config.init::<B>(device);
        // No momentum, no weight decay: the L2 term lives in the loss
        let optim = SgdConfig::new().init::<B, Prod2VecModel<B>>();

        tracing::info!(
            "Prod2Vec ready: {:?}, {} users, {} product rows, dim={}, lr={}",
            config.variant,
            config.num_users,
            config.product_rows(),
            config.embedding_size,
            config.learning_rate,
        );

        Ok(Self { config, model, optim, global_step: 0, device: device.clone() })
    }

    /// Forward, backward and one gradient-descent update.
    pub fn step(&mut self, batch: &Prod2VecBatch<B>) -> Result<StepOutput> {
        let (losses, _) = self.model.forward_loss(batch, &self.config);
        let values      = losses.values();

        ensure!(
            values.loss.is_finite(),
            "loss is not finite at step {}: {:?}", self.global_step, values
        );

        let grads = losses.loss.backward();

        let gradient_norms = if self.config.plot_gradients {
            Some(gradient_norms(&self.model, &grads))
        } else {
            None
        };

        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.config.learning_rate, self.model.clone(), grads);
        self.global_step += 1;

        tracing::debug!(
            "step {} | loss={:.5} log_loss={:.5} reg={:.5} cf={:.5}",
            self.global_step, values.loss, values.log_loss, values.regularization, values.cf_loss,
        );

        Ok(StepOutput { global_step: self.global_step, losses: values, gradient_norms })
    }

    /// Build a batch from `items` on the trainer's device and step on it.
    pub fn train_on(&mut self, items: &[Interaction]) -> Result<StepOutput> {
        let batch = Prod2VecBatch::<B>::from_interactions(items, &self.config, &self.device)?;
        self.step(&batch)
    }

    /// Metrics on a batch without touching the gradient tape.
    pub fn evaluate_batch(&self, batch: &Prod2VecBatch<B::InnerBackend>) -> Result<EvalMetrics> {
        let model       = self.model.valid();
        let (losses, _) = model.forward_loss(batch, &self.config);

        let average_predictor = match &batch.conversion_rates {
            Some(rates) => Some(average_predictor_losses(batch.labels.clone(), rates.clone())?),
            None        => None,
        };

        Ok(EvalMetrics {
            log_loss: scalar(losses.log_loss),
            mse_loss: scalar(losses.mse_loss),
            average_predictor,
        })
    }

    /// Evaluate on `items`; with `baseline_rate` the constant-rate
    /// baseline is scored on the same examples.
    pub fn evaluate(&self, items: &[Interaction], baseline_rate: Option<f32>) -> Result<EvalMetrics> {
        let mut batch =
            Prod2VecBatch::<B::InnerBackend>::from_interactions(items, &self.config, &self.device)?;
        if let Some(rate) = baseline_rate {
            batch = batch.with_constant_rate(rate)?;
        }
        self.evaluate_batch(&batch)
    }

    /// Scalar and histogram summaries of the current weights and of
    /// the objective on `items`.
    pub fn summarize(&self, items: &[Interaction]) -> Result<Summary> {
        let batch =
            Prod2VecBatch::<B::InnerBackend>::from_interactions(items, &self.config, &self.device)?;
        let model            = self.model.valid();
        let (losses, output) = model.forward_loss(&batch, &self.config);
        Ok(Summary::collect(self.global_step, &model, losses.loss, output.logits))
    }

    /// Inference copy of the current weights.
    pub fn scorer(&self) -> Prod2VecScorer<B::InnerBackend> {
        Prod2VecScorer::new(self.model.valid(), self.config.clone())
    }

    pub fn model(&self) -> &Prod2VecModel<B> {
        &self.model
    }

    pub fn config(&self) -> &Prod2VecConfig {
        &self.config
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }
}

fn gradient_norms<B: AutodiffBackend>(
    model: &Prod2VecModel<B>,
    grads: &B::Gradients,
) -> Vec<GradientNorm> {
    vec![
        GradientNorm::of("user_embeddings", model.user_embeddings.val().grad(grads)),
        GradientNorm::of("user_b", model.user_bias.val().grad(grads)),
        GradientNorm::of("product_embeddings", model.product_embeddings.val().grad(grads)),
        GradientNorm::of("prod_b", model.product_bias.val().grad(grads)),
        GradientNorm::of("global_bias", model.global_bias.val().grad(grads)),
        GradientNorm::of("alpha", model.alpha.val().grad(grads)),
    ]
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use crate::ml::model::ModelVariant;

    type TestBackend = Autodiff<NdArray>;

    fn items() -> Vec<Interaction> {
        vec![
            Interaction::treatment(0, 0, 1.0),
            Interaction::treatment(1, 1, 0.0),
            Interaction::control(0, 2, 1.0),
            Interaction::control(2, 3, 0.0),
        ]
    }

    fn trainer(config: Prod2VecConfig) -> Prod2VecTrainer<TestBackend> {
        Prod2VecTrainer::new(config, &Default::default()).unwrap()
    }

    #[test]
    fn test_loss_decreases_with_gradient_descent() {
        let mut t  = trainer(Prod2VecConfig::new(3, 4, 4).with_learning_rate(0.1));
        let data   = items();
        let first  = t.train_on(&data).unwrap().losses;
        let mut last = first;
        for _ in 0..50 {
            last = t.train_on(&data).unwrap().losses;
        }
        assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
        assert!(last.cf_loss < first.cf_loss);
        assert!(last.log_loss < first.log_loss);
    }

    #[test]
    fn test_global_step_counts_updates() {
        let mut t = trainer(Prod2VecConfig::new(3, 4, 2));
        assert_eq!(t.global_step(), 0);
        let out = t.train_on(&items()).unwrap();
        assert_eq!(out.global_step, 1);
        t.train_on(&items()).unwrap();
        assert_eq!(t.global_step(), 2);
    }

    #[test]
    fn test_gradient_norms_only_when_plotting() {
        let mut quiet = trainer(Prod2VecConfig::new(3, 4, 2));
        assert!(quiet.train_on(&items()).unwrap().gradient_norms.is_none());

        let mut plotting = trainer(Prod2VecConfig::new(3, 4, 2).with_plot_gradients(true));
        let out   = plotting.train_on(&items()).unwrap();
        // Reporting gradients still counts as an applied update
        assert_eq!(out.global_step, 1);
        assert_eq!(plotting.global_step(), 1);
        let norms = out.gradient_norms.unwrap();
        assert_eq!(norms.len(), 6);

        // Predictions start at 0.5, so every bias receives a gradient
        let user_b = norms.iter().find(|n| n.name == "user_b").unwrap();
        assert!(user_b.norm > 0.0);
        let prod_b = norms.iter().find(|n| n.name == "prod_b").unwrap();
        assert!(prod_b.norm > 0.0);
    }

    #[test]
    fn test_loss_equals_log_loss_without_penalties() {
        let mut t = trainer(Prod2VecConfig::new(3, 4, 2).with_l2_pen(0.0).with_cf_pen(0.0));
        let losses = t.train_on(&items()).unwrap().losses;
        assert!((losses.loss - losses.log_loss).abs() < 1e-9);
        // sigmoid(≈0) = 0.5 for every example
        assert!((losses.log_loss - 2f64.ln()).abs() < 1e-3);
    }

    #[test]
    fn test_l2_penalty_adds_regularization() {
        let mut t = trainer(Prod2VecConfig::new(3, 4, 2).with_l2_pen(0.5).with_cf_pen(0.0));
        let losses = t.train_on(&items()).unwrap().losses;
        assert!(losses.regularization > 0.0);
        assert!((losses.factual_loss - losses.log_loss - losses.regularization).abs() < 1e-5);
    }

    #[test]
    fn test_supervised_has_no_counterfactual_term() {
        let config = Prod2VecConfig::new(3, 4, 2).with_variant(ModelVariant::Supervised);
        let mut t  = trainer(config);
        let data: Vec<Interaction> = items().into_iter().filter(|i| !i.is_control()).collect();
        let losses = t.train_on(&data).unwrap().losses;
        assert_eq!(losses.cf_loss, 0.0);
    }

    #[test]
    fn test_evaluate_reports_baseline() {
        let t       = trainer(Prod2VecConfig::new(3, 4, 2));
        let metrics = t.evaluate(&items(), Some(0.5)).unwrap();
        assert!(metrics.log_loss.is_finite());
        let ap = metrics.average_predictor.unwrap();
        assert!((ap.mse_loss - 0.25).abs() < 1e-6);

        let without = t.evaluate(&items(), None).unwrap();
        assert!(without.average_predictor.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Prod2VecTrainer::<TestBackend>::new(
            Prod2VecConfig::new(3, 4, 2).with_learning_rate(-1.0),
            &Default::default(),
        );
        assert!(result.is_err());
    }
}
