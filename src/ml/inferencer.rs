// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Scores (user, product) pairs with a trained model on a plain
// (non-autodiff) backend. Queries always use the treatment rows:
// the control half only exists to regularise training.
use anyhow::{ensure, Result};
use burn::prelude::*;

use crate::domain::traits::ConversionPredictor;
use crate::ml::model::{Prod2VecConfig, Prod2VecModel};

pub struct Prod2VecScorer<B: Backend> {
    model:  Prod2VecModel<B>,
    config: Prod2VecConfig,
    device: B::Device,
}

impl<B: Backend> Prod2VecScorer<B> {
    pub fn new(model: Prod2VecModel<B>, config: Prod2VecConfig) -> Self {
        let device = model.user_embeddings.device();
        Self { model, config, device }
    }

    /// P(conversion) for each (users[i], products[i]).
    pub fn score(&self, users: &[usize], products: &[usize]) -> Result<Vec<f32>> {
        ensure!(
            users.len() == products.len(),
            "{} users but {} products", users.len(), products.len()
        );
        if users.is_empty() {
            return Ok(Vec::new());
        }
        ensure!(
            users.iter().all(|&u| u < self.config.num_users),
            "user id out of range (num_users = {})", self.config.num_users
        );
        ensure!(
            products.iter().all(|&p| p < self.config.num_products),
            "product id out of range (num_products = {})", self.config.num_products
        );

        let n = users.len();
        let users: Vec<i64>    = users.iter().map(|&u| u as i64).collect();
        let products: Vec<i64> = products.iter().map(|&p| p as i64).collect();

        let output = self.model.forward(
            Tensor::from_data(TensorData::new(users, [n]), &self.device),
            Tensor::from_data(TensorData::new(products, [n]), &self.device),
        );

        output
            .prediction
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read predictions: {e:?}"))
    }

    /// The `k` highest-scoring catalogue products for `user`,
    /// best first. Ties go to the lower product id.
    pub fn recommend(&self, user: usize, k: usize) -> Result<Vec<(usize, f32)>> {
        let products: Vec<usize> = (0..self.config.num_products).collect();
        let users = vec![user; products.len()];
        let scores = self.score(&users, &products)?;

        let mut ranked: Vec<(usize, f32)> = products.into_iter().zip(scores).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);

        tracing::debug!("Top {} for user {}: {:?}", ranked.len(), user, ranked);
        Ok(ranked)
    }

    pub fn model(&self) -> &Prod2VecModel<B> {
        &self.model
    }
}

impl<B: Backend> ConversionPredictor for Prod2VecScorer<B> {
    fn predict(&self, users: &[usize], products: &[usize]) -> Result<Vec<f32>> {
        self.score(users, products)
    }

    fn name(&self) -> &str {
        match self.config.variant {
            crate::ml::model::ModelVariant::Supervised => "prod2vec",
            crate::ml::model::ModelVariant::Causal     => "causal_prod2vec",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, module::Param};

    type TestBackend = NdArray;

    /// Model whose ranking is decided by the product biases alone.
    fn scorer_with_biases(biases: Vec<f32>) -> Prod2VecScorer<TestBackend> {
        let device = Default::default();
        let config = Prod2VecConfig::new(2, 3, 2);
        let mut model = config.init::<TestBackend>(&device);
        let rows = biases.len();
        model.product_bias = Param::from_tensor(Tensor::from_data(TensorData::new(biases, [rows]), &device));
        Prod2VecScorer::new(model, config)
    }

    #[test]
    fn test_recommend_orders_by_score() {
        // Treatment rows 0..3 then control rows 3..6; control rows
        // must not influence recommendations.
        let scorer = scorer_with_biases(vec![0.1, 2.0, -1.0, 9.0, 9.0, 9.0]);
        let top = scorer.recommend(0, 2).unwrap();
        assert_eq!(top.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![1, 0]);
        assert!(top[0].1 > top[1].1);
    }

    #[test]
    fn test_ties_prefer_lower_product_id() {
        let scorer = scorer_with_biases(vec![0.5, 0.5, 0.5, 0.0, 0.0, 0.0]);
        let top = scorer.recommend(1, 3).unwrap();
        assert_eq!(top.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_score_validates_ids() {
        let scorer = scorer_with_biases(vec![0.0; 6]);
        assert!(scorer.score(&[2], &[0]).is_err());
        assert!(scorer.score(&[0], &[3]).is_err());
        assert!(scorer.score(&[0, 1], &[0]).is_err());
        assert!(scorer.score(&[], &[]).unwrap().is_empty());

        let p = scorer.predict(&[0, 1], &[0, 2]).unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|v| (v - 0.5).abs() < 1e-4));
        assert_eq!(scorer.name(), "causal_prod2vec");
    }
}
