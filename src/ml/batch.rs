// ============================================================
// Layer 5 — Model Inputs
// ============================================================
// The tensors one forward/backward pass consumes:
//
//   users              [batch]      Int
//   products           [batch]      Int   embedding rows, control rows shifted
//   labels             [batch, 1]   Float
//   treatment_products [batch]      Int   always < num_products
//   conversion_rates   [batch]      Float optional, average-predictor input
//
// How the caller groups interactions into batches is up to the
// caller. This module only validates ids and builds tensors on
// the requested device.

use anyhow::{ensure, Result};
use burn::prelude::*;

use crate::domain::interaction::Interaction;
use crate::ml::model::Prod2VecConfig;

#[derive(Debug, Clone)]
pub struct Prod2VecBatch<B: Backend> {
    pub users:              Tensor<B, 1, Int>,
    pub products:           Tensor<B, 1, Int>,
    pub labels:             Tensor<B, 2>,
    pub treatment_products: Tensor<B, 1, Int>,
    pub conversion_rates:   Option<Tensor<B, 1>>,
}

impl<B: Backend> Prod2VecBatch<B> {
    /// Validate `items` against `config` and stack them into tensors.
    pub fn from_interactions(
        items:  &[Interaction],
        config: &Prod2VecConfig,
        device: &B::Device,
    ) -> Result<Self> {
        ensure!(!items.is_empty(), "cannot build a batch from zero interactions");

        for (idx, item) in items.iter().enumerate() {
            ensure!(
                item.user < config.num_users,
                "interaction {idx}: user {} out of range (num_users = {})",
                item.user, config.num_users
            );
            ensure!(
                item.product < config.num_products,
                "interaction {idx}: product {} out of range (num_products = {})",
                item.product, config.num_products
            );
            ensure!(
                (0.0..=1.0).contains(&item.label),
                "interaction {idx}: label {} outside [0, 1]", item.label
            );
            ensure!(
                config.is_causal() || !item.is_control(),
                "interaction {idx}: control examples need the causal variant"
            );
        }

        let batch_size = items.len();

        let users: Vec<i64> = items.iter().map(|i| i.user as i64).collect();
        let products: Vec<i64> = items
            .iter()
            .map(|i| i.product_row(config.num_products) as i64)
            .collect();
        let treatment: Vec<i64> = items.iter().map(|i| i.treatment_row() as i64).collect();
        let labels: Vec<f32> = items.iter().map(|i| i.label).collect();

        Ok(Self {
            users:              Tensor::from_data(TensorData::new(users, [batch_size]), device),
            products:           Tensor::from_data(TensorData::new(products, [batch_size]), device),
            labels:             Tensor::from_data(TensorData::new(labels, [batch_size, 1]), device),
            treatment_products: Tensor::from_data(TensorData::new(treatment, [batch_size]), device),
            conversion_rates:   None,
        })
    }

    /// Attach one conversion rate per example for the average predictor.
    pub fn with_conversion_rates(mut self, rates: &[f32]) -> Result<Self> {
        let batch_size = self.len();
        ensure!(
            rates.len() == batch_size,
            "got {} conversion rates for a batch of {}", rates.len(), batch_size
        );
        ensure!(
            rates.iter().all(|r| (0.0..=1.0).contains(r)),
            "conversion rates must lie in [0, 1]"
        );
        let device = self.labels.device();
        self.conversion_rates = Some(Tensor::from_data(
            TensorData::new(rates.to_vec(), [batch_size]),
            &device,
        ));
        Ok(self)
    }

    /// Same constant rate for every example.
    pub fn with_constant_rate(self, rate: f32) -> Result<Self> {
        let rates = vec![rate; self.len()];
        self.with_conversion_rates(&rates)
    }

    pub fn len(&self) -> usize {
        self.users.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ints(t: Tensor<TestBackend, 1, Int>) -> Vec<i64> {
        t.into_data().iter::<i64>().collect()
    }

    #[test]
    fn test_control_rows_shifted_in_batch() {
        let device = Default::default();
        let cfg    = Prod2VecConfig::new(3, 4, 2);
        let items  = vec![
            Interaction::treatment(0, 1, 1.0),
            Interaction::control(1, 1, 0.0),
            Interaction::control(2, 3, 1.0),
        ];
        let batch = Prod2VecBatch::<TestBackend>::from_interactions(&items, &cfg, &device).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(ints(batch.users), vec![0, 1, 2]);
        assert_eq!(ints(batch.products), vec![1, 5, 7]);
        assert_eq!(ints(batch.treatment_products), vec![1, 1, 3]);
        assert_eq!(batch.labels.dims(), [3, 1]);
    }

    #[test]
    fn test_rejects_invalid_interactions() {
        let device = Default::default();
        let cfg    = Prod2VecConfig::new(3, 4, 2);

        let empty: Vec<Interaction> = Vec::new();
        assert!(Prod2VecBatch::<TestBackend>::from_interactions(&empty, &cfg, &device).is_err());

        let bad_user = vec![Interaction::treatment(3, 0, 1.0)];
        assert!(Prod2VecBatch::<TestBackend>::from_interactions(&bad_user, &cfg, &device).is_err());

        let bad_product = vec![Interaction::control(0, 4, 1.0)];
        assert!(Prod2VecBatch::<TestBackend>::from_interactions(&bad_product, &cfg, &device).is_err());

        let bad_label = vec![Interaction::treatment(0, 0, 2.0)];
        assert!(Prod2VecBatch::<TestBackend>::from_interactions(&bad_label, &cfg, &device).is_err());
    }

    #[test]
    fn test_supervised_rejects_control_examples() {
        let device = Default::default();
        let cfg    = Prod2VecConfig::new(3, 4, 2)
            .with_variant(crate::ml::model::ModelVariant::Supervised);
        let items  = vec![Interaction::control(0, 0, 1.0)];
        assert!(Prod2VecBatch::<TestBackend>::from_interactions(&items, &cfg, &device).is_err());
    }

    #[test]
    fn test_conversion_rate_length_must_match() {
        let device = Default::default();
        let cfg    = Prod2VecConfig::new(3, 4, 2);
        let items  = vec![Interaction::treatment(0, 0, 1.0), Interaction::treatment(1, 2, 0.0)];
        let batch  = Prod2VecBatch::<TestBackend>::from_interactions(&items, &cfg, &device).unwrap();

        assert!(batch.clone().with_conversion_rates(&[0.1]).is_err());
        let batch = batch.with_constant_rate(0.25).unwrap();
        assert_eq!(batch.conversion_rates.unwrap().dims(), [2]);
    }
}
