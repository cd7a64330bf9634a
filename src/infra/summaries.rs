// ============================================================
// Layer 6 — Training Summaries
// ============================================================
// Snapshot of the quantities worth watching while training:
//
//   scalars:    total_loss, alpha
//   histograms: total_loss, user_embedding_weights,
//               product_embedding_weights, logits,
//               prod_b, user_b, global_bias
//
// A histogram here is reduced to min / max / mean / std / count.
// Summaries are written to the log through `tracing`, so any
// subscriber (stdout, JSON, file) can pick them up.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ml::model::Prod2VecModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarSummary {
    pub name:  String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub name:  String,
    pub count: usize,
    pub min:   f64,
    pub max:   f64,
    pub mean:  f64,
    /// Population standard deviation
    pub std:   f64,
}

impl HistogramSummary {
    pub fn from_values(name: impl Into<String>, values: &[f64]) -> Self {
        let name  = name.into();
        let count = values.len();
        if count == 0 {
            return Self { name, count, min: 0.0, max: 0.0, mean: 0.0, std: 0.0 };
        }

        let min  = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max  = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / count as f64;
        let var  = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Self { name, count, min, max, mean, std: var.sqrt() }
    }

    pub fn from_tensor<B: Backend, const D: usize>(name: impl Into<String>, tensor: Tensor<B, D>) -> Self {
        let values: Vec<f64> = tensor.into_data().iter::<f64>().collect();
        Self::from_values(name, &values)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub step:       usize,
    pub scalars:    Vec<ScalarSummary>,
    pub histograms: Vec<HistogramSummary>,
}

impl Summary {
    pub fn collect<B: Backend>(
        step:       usize,
        model:      &Prod2VecModel<B>,
        total_loss: Tensor<B, 1>,
        logits:     Tensor<B, 2>,
    ) -> Self {
        let loss_value = total_loss.clone().into_scalar().elem::<f64>();

        let scalars = vec![
            ScalarSummary { name: "total_loss".into(), value: loss_value },
            ScalarSummary { name: "alpha".into(),      value: model.alpha_value() },
        ];

        let histograms = vec![
            HistogramSummary::from_tensor("histogram_total_loss", total_loss),
            HistogramSummary::from_tensor("user_embedding_weights", model.user_embeddings.val()),
            HistogramSummary::from_tensor("product_embedding_weights", model.product_embeddings.val()),
            HistogramSummary::from_tensor("logits", logits),
            HistogramSummary::from_tensor("prod_b", model.product_bias.val()),
            HistogramSummary::from_tensor("user_b", model.user_bias.val()),
            HistogramSummary::from_tensor("global_bias", model.global_bias.val()),
        ];

        Self { step, scalars, histograms }
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.iter().find(|s| s.name == name).map(|s| s.value)
    }

    pub fn histogram(&self, name: &str) -> Option<&HistogramSummary> {
        self.histograms.iter().find(|h| h.name == name)
    }

    /// Emit every entry at info level.
    pub fn log(&self) {
        for s in &self.scalars {
            tracing::info!(step = self.step, "scalar {} = {:.6}", s.name, s.value);
        }
        for h in &self.histograms {
            tracing::info!(
                step = self.step,
                "histogram {} n={} min={:.4} max={:.4} mean={:.4} std={:.4}",
                h.name, h.count, h.min, h.max, h.mean, h.std,
            );
        }
    }
}
