// ============================================================
// Layer 5 — Average Predictor Baseline
// ============================================================
// Predicts a fixed conversion rate for every example. Its MSE
// and log loss are the bar the embedding model has to clear.
//
// The per-example rates come in with the batch so an evaluation
// driver can feed bootstrapped test-set rates instead of one
// constant.

use anyhow::{bail, ensure, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::interaction::{conversion_rate, Interaction};
use crate::domain::traits::ConversionPredictor;
use crate::ml::batch::Prod2VecBatch;
use crate::ml::loss::{self, scalar};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragePredictorLoss {
    pub mse_loss: f64,
    pub log_loss: f64,
}

/// Losses of predicting `conversion_rates` against `labels`.
/// labels: [n, 1], conversion_rates: [n]
pub fn average_predictor_losses<B: Backend>(
    labels:           Tensor<B, 2>,
    conversion_rates: Tensor<B, 1>,
) -> Result<AveragePredictorLoss> {
    let [batch_size, _] = labels.dims();
    let [rates]         = conversion_rates.dims();
    ensure!(
        batch_size == rates,
        "{} conversion rates for {} labels", rates, batch_size
    );

    let ap_logits = conversion_rates.reshape([batch_size, 1]);
    Ok(AveragePredictorLoss {
        mse_loss: scalar(loss::mean_squared_error(ap_logits.clone(), labels.clone())),
        log_loss: scalar(loss::log_loss(ap_logits, labels)),
    })
}

/// Baseline that answers every query with one rate.
#[derive(Debug, Clone, Copy)]
pub struct AveragePredictor {
    rate: f32,
}

impl AveragePredictor {
    pub fn new(rate: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            bail!("conversion rate {rate} outside [0, 1]");
        }
        Ok(Self { rate })
    }

    /// Base rate of the given interactions.
    pub fn fit(items: &[Interaction]) -> Result<Self> {
        ensure!(!items.is_empty(), "cannot estimate a rate from zero interactions");
        Self::new(conversion_rate(items))
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Losses on a batch, using this predictor's constant rate.
    pub fn evaluate<B: Backend>(&self, batch: &Prod2VecBatch<B>) -> Result<AveragePredictorLoss> {
        let rates = Tensor::full([batch.len()], self.rate, &batch.labels.device());
        average_predictor_losses(batch.labels.clone(), rates)
    }
}

impl ConversionPredictor for AveragePredictor {
    fn predict(&self, users: &[usize], products: &[usize]) -> Result<Vec<f32>> {
        ensure!(
            users.len() == products.len(),
            "{} users but {} products", users.len(), products.len()
        );
        Ok(vec![self.rate; users.len()])
    }

    fn name(&self) -> &str {
        "average_predictor"
    }
}
