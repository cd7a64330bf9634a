// ============================================================
// Layer 5 — Loss Terms
// ============================================================
// Objective of one training step:
//
//   log_loss        = mean(sigmoid_ce(logits, labels))
//   reg_term        = l2_pen * (l2(user_embed) + l2(product_embed))
//   reg_term_biases = l2_pen * (l2(prod_bias) + l2(user_bias))
//   factual_loss    = log_loss + reg_term + reg_term_biases
//   loss            = factual_loss + cf_pen * cf_loss
//
// mse_loss is tracked alongside but never optimised.
//
// Every term is a rank-1 tensor of shape [1] so the terms can be
// summed and back-propagated as one graph.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ml::model::{CfDistance, Prod2VecConfig, Prod2VecOutput};

/// Added under square roots so the gradient stays finite at zero.
pub const NORM_EPSILON: f32 = 1e-12;

/// Clipping used by the probability log loss.
pub const LOG_LOSS_EPSILON: f32 = 1e-7;

/// Element-wise logistic loss computed from logits.
///
/// Uses max(x, 0) - x*z + ln(1 + e^-|x|), which never evaluates
/// exp of a large positive number.
pub fn sigmoid_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 2>,
) -> Tensor<B, 2> {
    logits.clone().clamp_min(0.0)
        - logits.clone() * labels
        + logits.abs().neg().exp().log1p()
}

/// sum(t²) / 2
pub fn l2_loss<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, 1> {
    (tensor.clone() * tensor).sum().div_scalar(2.0)
}

pub fn mean_squared_error<B: Backend>(
    predictions: Tensor<B, 2>,
    labels:      Tensor<B, 2>,
) -> Tensor<B, 1> {
    (labels - predictions).powf_scalar(2.0).mean()
}

/// Binary log loss on probabilities, clipped by `LOG_LOSS_EPSILON`.
pub fn log_loss<B: Backend>(predictions: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    let positive = labels.clone() * predictions.clone().add_scalar(LOG_LOSS_EPSILON).log();
    let negative = labels.neg().add_scalar(1.0)
        * predictions.neg().add_scalar(1.0 + LOG_LOSS_EPSILON).log();
    (positive + negative).neg().mean()
}

/// Row-wise cosine similarity, [n, d] x [n, d] → [n, 1]
pub fn cosine_similarity<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let dot    = (a.clone() * b.clone()).sum_dim(1);
    let norm_a = (a.clone() * a).sum_dim(1).add_scalar(NORM_EPSILON).sqrt();
    let norm_b = (b.clone() * b).sum_dim(1).add_scalar(NORM_EPSILON).sqrt();
    dot / (norm_a * norm_b)
}

/// Counterfactual penalty between looked-up product embeddings and
/// their treatment counterparts. Returns shape [1].
pub fn counterfactual_distance<B: Backend>(
    product_embed:   Tensor<B, 2>,
    treatment_embed: Tensor<B, 2>,
    distance:        CfDistance,
) -> Tensor<B, 1> {
    match distance {
        CfDistance::L1 => (product_embed - treatment_embed)
            .abs()
            .sum_dim(1)
            .mean(),
        CfDistance::L2 => (product_embed - treatment_embed)
            .powf_scalar(2.0)
            .sum()
            .add_scalar(NORM_EPSILON)
            .sqrt(),
        CfDistance::Cosine => cosine_similarity(product_embed, treatment_embed)
            .neg()
            .add_scalar(1.0)
            .mean(),
    }
}

// ─── Prod2VecLoss ─────────────────────────────────────────────────────────────
/// Every term of the objective, still attached to the graph.
#[derive(Debug, Clone)]
pub struct Prod2VecLoss<B: Backend> {
    /// The optimised quantity
    pub loss:           Tensor<B, 1>,
    pub factual_loss:   Tensor<B, 1>,
    pub log_loss:       Tensor<B, 1>,
    /// reg_term + reg_term_biases
    pub regularization: Tensor<B, 1>,
    /// Unweighted counterfactual distance
    pub cf_loss:        Tensor<B, 1>,
    pub mse_loss:       Tensor<B, 1>,
}

impl<B: Backend> Prod2VecLoss<B> {
    pub fn compose(
        output:  &Prod2VecOutput<B>,
        labels:  Tensor<B, 2>,
        cf_loss: Tensor<B, 1>,
        config:  &Prod2VecConfig,
    ) -> Self {
        let log_loss = sigmoid_cross_entropy_with_logits(output.logits.clone(), labels.clone()).mean();

        let reg_term = (l2_loss(output.user_embed.clone()) + l2_loss(output.product_embed.clone()))
            .mul_scalar(config.l2_pen);
        let reg_term_biases = (l2_loss(output.product_bias_embed.clone())
            + l2_loss(output.user_bias_embed.clone()))
            .mul_scalar(config.l2_pen);
        let regularization = reg_term + reg_term_biases;

        let factual_loss = log_loss.clone() + regularization.clone();
        let loss         = factual_loss.clone() + cf_loss.clone().mul_scalar(config.cf_pen);
        let mse_loss     = mean_squared_error(output.prediction.clone(), labels);

        Self { loss, factual_loss, log_loss, regularization, cf_loss, mse_loss }
    }

    /// Read every term back to the host.
    pub fn values(&self) -> LossValues {
        LossValues {
            loss:           scalar(self.loss.clone()),
            factual_loss:   scalar(self.factual_loss.clone()),
            log_loss:       scalar(self.log_loss.clone()),
            regularization: scalar(self.regularization.clone()),
            cf_loss:        scalar(self.cf_loss.clone()),
            mse_loss:       scalar(self.mse_loss.clone()),
        }
    }
}

/// Host-side copy of `Prod2VecLoss`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossValues {
    pub loss:           f64,
    pub factual_loss:   f64,
    pub log_loss:       f64,
    pub regularization: f64,
    pub cf_loss:        f64,
    pub mse_loss:       f64,
}

pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
