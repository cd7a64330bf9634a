use anyhow::{ensure, Result};
use burn::{
    module::Param,
    nn::Initializer,
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::ml::batch::Prod2VecBatch;
use crate::ml::loss::{self, Prod2VecLoss};

/// Initial value of the learned embedding-logit scale.
/// Starting near zero lets the bias terms fit the base rate first.
pub const ALPHA_INIT: f32 = 1e-8;

/// Distance used by the counterfactual penalty between a product's
/// looked-up embedding and its (frozen) treatment embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfDistance {
    /// Mean over the batch of the per-row L1 distance
    L1,
    /// Euclidean norm of the whole batch difference
    L2,
    /// Mean over the batch of 1 - cosine similarity
    Cosine,
}

/// Plain supervised Prod2Vec, or Prod2Vec with a control half of the
/// product matrix tied to the treatment half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVariant {
    Supervised,
    Causal,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Prod2VecConfig {
    pub num_users:      usize,
    /// Catalogue size. The causal variant allocates twice this many rows.
    pub num_products:   usize,
    pub embedding_size: usize,
    #[config(default = 0.0)]
    pub l2_pen:         f64,
    #[config(default = 1.0)]
    pub learning_rate:  f64,
    /// Report per-parameter gradient norms on every step
    #[config(default = false)]
    pub plot_gradients: bool,
    #[config(default = 1.0)]
    pub cf_pen:         f64,
    #[config(default = "CfDistance::L1")]
    pub cf_distance:    CfDistance,
    #[config(default = "ModelVariant::Causal")]
    pub variant:        ModelVariant,
}

impl Prod2VecConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_users > 0, "num_users must be positive");
        ensure!(self.num_products > 0, "num_products must be positive");
        ensure!(self.embedding_size > 0, "embedding_size must be positive");
        ensure!(
            self.l2_pen.is_finite() && self.l2_pen >= 0.0,
            "l2_pen must be a non-negative number, got {}", self.l2_pen
        );
        ensure!(
            self.cf_pen.is_finite() && self.cf_pen >= 0.0,
            "cf_pen must be a non-negative number, got {}", self.cf_pen
        );
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning_rate must be positive, got {}", self.learning_rate
        );
        Ok(())
    }

    pub fn is_causal(&self) -> bool {
        self.variant == ModelVariant::Causal
    }

    /// Number of rows in the product embedding matrix.
    pub fn product_rows(&self) -> usize {
        match self.variant {
            ModelVariant::Supervised => self.num_products,
            ModelVariant::Causal     => 2 * self.num_products,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Prod2VecModel<B> {
        let rows = self.product_rows();
        let dim  = self.embedding_size;

        // Glorot uniform with fan_in = rows, fan_out = dim
        let xavier = Initializer::XavierUniform { gain: 1.0 };
        let user_embeddings =
            xavier.init_with([self.num_users, dim], Some(self.num_users), Some(dim), device);
        let product_embeddings =
            xavier.init_with([rows, dim], Some(rows), Some(dim), device);

        Prod2VecModel {
            user_embeddings,
            user_bias:    Initializer::Zeros.init([self.num_users], device),
            product_embeddings,
            product_bias: Initializer::Zeros.init([rows], device),
            global_bias:  Initializer::Zeros.init([1], device),
            alpha:        Initializer::Constant { value: ALPHA_INIT as f64 }.init([1], device),
        }
    }
}

/// All trainable parameters of the model.
#[derive(Module, Debug)]
pub struct Prod2VecModel<B: Backend> {
    pub user_embeddings:    Param<Tensor<B, 2>>,
    pub user_bias:          Param<Tensor<B, 1>>,
    pub product_embeddings: Param<Tensor<B, 2>>,
    pub product_bias:       Param<Tensor<B, 1>>,
    pub global_bias:        Param<Tensor<B, 1>>,
    pub alpha:              Param<Tensor<B, 1>>,
}

/// Intermediate tensors of one forward pass. The loss needs the
/// looked-up embeddings, not only the logits.
#[derive(Debug, Clone)]
pub struct Prod2VecOutput<B: Backend> {
    pub user_embed:         Tensor<B, 2>,
    pub product_embed:      Tensor<B, 2>,
    pub user_bias_embed:    Tensor<B, 1>,
    pub product_bias_embed: Tensor<B, 1>,
    /// [batch, 1]
    pub logits:             Tensor<B, 2>,
    /// sigmoid(logits), [batch, 1]
    pub prediction:         Tensor<B, 2>,
}

impl<B: Backend> Prod2VecModel<B> {
    /// users, products: [batch] → logits, prediction: [batch, 1]
    ///
    /// `products` are embedding rows (see `Interaction::product_row`).
    pub fn forward(
        &self,
        users:    Tensor<B, 1, Int>,
        products: Tensor<B, 1, Int>,
    ) -> Prod2VecOutput<B> {
        let [batch_size] = users.dims();

        let user_embed         = self.user_embeddings.val().select(0, users.clone());
        let user_bias_embed    = self.user_bias.val().select(0, users);
        let product_embed      = self.product_embeddings.val().select(0, products.clone());
        let product_bias_embed = self.product_bias.val().select(0, products);

        // alpha * <u, p>
        let emb_logits = (user_embed.clone() * product_embed.clone())
            .sum_dim(1)
            .mul(self.alpha.val().reshape([1, 1]));

        let bias_logits = (product_bias_embed.clone() + user_bias_embed.clone())
            .reshape([batch_size, 1])
            + self.global_bias.val().reshape([1, 1]);

        let logits     = emb_logits + bias_logits;
        let prediction = burn::tensor::activation::sigmoid(logits.clone());

        Prod2VecOutput {
            user_embed,
            product_embed,
            user_bias_embed,
            product_bias_embed,
            logits,
            prediction,
        }
    }

    /// Treatment representation of each product, cut out of the graph.
    /// The counterfactual penalty pulls the looked-up rows toward these
    /// targets without moving the targets themselves.
    pub fn treatment_embeddings(&self, treatment_products: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.product_embeddings
            .val()
            .select(0, treatment_products)
            .detach()
    }

    /// Forward pass plus every loss term of the objective.
    pub fn forward_loss(
        &self,
        batch:  &Prod2VecBatch<B>,
        config: &Prod2VecConfig,
    ) -> (Prod2VecLoss<B>, Prod2VecOutput<B>) {
        let output = self.forward(batch.users.clone(), batch.products.clone());

        let cf_loss = match config.variant {
            ModelVariant::Supervised => Tensor::zeros([1], &output.logits.device()),
            ModelVariant::Causal => {
                let treatment_embed = self.treatment_embeddings(batch.treatment_products.clone());
                loss::counterfactual_distance(
                    output.product_embed.clone(),
                    treatment_embed,
                    config.cf_distance,
                )
            }
        };

        let losses = Prod2VecLoss::compose(&output, batch.labels.clone(), cf_loss, config);
        (losses, output)
    }

    pub fn alpha_value(&self) -> f64 {
        self.alpha.val().into_scalar().elem::<f64>()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::domain::interaction::Interaction;

    type TestBackend = NdArray;

    fn config() -> Prod2VecConfig {
        Prod2VecConfig::new(4, 5, 3)
    }

    #[test]
    fn test_causal_doubles_product_rows() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device);
        assert_eq!(model.user_embeddings.dims(), [4, 3]);
        assert_eq!(model.product_embeddings.dims(), [10, 3]);
        assert_eq!(model.product_bias.dims(), [10]);
        assert_eq!(model.user_bias.dims(), [4]);
    }

    #[test]
    fn test_supervised_keeps_catalogue_rows() {
        let device = Default::default();
        let model  = config()
            .with_variant(ModelVariant::Supervised)
            .init::<TestBackend>(&device);
        assert_eq!(model.product_embeddings.dims(), [5, 3]);
    }

    #[test]
    fn test_initial_values() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device);
        assert!((model.alpha_value() - ALPHA_INIT as f64).abs() < 1e-12);
        let biases: f32 = model.user_bias.val().abs().sum().into_scalar().elem();
        assert_eq!(biases, 0.0);
        let global: f32 = model.global_bias.val().into_scalar().elem();
        assert_eq!(global, 0.0);
    }

    #[test]
    fn test_forward_shapes_and_initial_prediction() {
        let device = Default::default();
        let cfg    = config();
        let model  = cfg.init::<TestBackend>(&device);
        let items  = vec![
            Interaction::treatment(0, 1, 1.0),
            Interaction::control(2, 4, 0.0),
            Interaction::treatment(3, 0, 0.0),
        ];
        let batch  = Prod2VecBatch::<TestBackend>::from_interactions(&items, &cfg, &device).unwrap();
        let output = model.forward(batch.users, batch.products);

        assert_eq!(output.logits.dims(), [3, 1]);
        assert_eq!(output.product_embed.dims(), [3, 3]);

        // alpha ≈ 0 and zero biases → every prediction starts at 0.5
        let preds: Vec<f32> = output.prediction.into_data().to_vec().unwrap();
        for p in preds {
            assert!((p - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(config().validate().is_ok());
        assert!(Prod2VecConfig::new(0, 5, 3).validate().is_err());
        assert!(config().with_learning_rate(0.0).validate().is_err());
        assert!(config().with_cf_pen(-1.0).validate().is_err());
        assert!(config().with_l2_pen(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_counterfactual_term_leaves_treatment_rows_untouched() {
        use burn::backend::Autodiff;
        type AD = Autodiff<NdArray>;

        let device = Default::default();
        let cfg    = config().with_l2_pen(0.0).with_cf_pen(1.0);
        let model  = cfg.init::<AD>(&device);

        // Product rows: treatment 0 → row 0, control 2 → row 7 (target row 2)
        let items = vec![
            Interaction::treatment(0, 0, 1.0),
            Interaction::control(1, 2, 0.0),
        ];
        let batch = Prod2VecBatch::<AD>::from_interactions(&items, &cfg, &device).unwrap();

        let row_grad = |grads: &<AD as burn::tensor::backend::AutodiffBackend>::Gradients, row: usize| -> f32 {
            model
                .product_embeddings
                .val()
                .grad(grads)
                .unwrap()
                .slice([row..row + 1, 0..3])
                .abs()
                .sum()
                .into_scalar()
                .elem()
        };

        // Counterfactual term alone
        let (losses, _) = model.forward_loss(&batch, &cfg);
        let cf_grads    = losses.cf_loss.backward();
        assert_eq!(row_grad(&cf_grads, 2), 0.0);
        assert!(row_grad(&cf_grads, 7) > 0.0);

        // Full objective: the treatment target is still not moved
        let (losses, _) = model.forward_loss(&batch, &cfg);
        let grads       = losses.loss.backward();
        assert_eq!(row_grad(&grads, 2), 0.0);
        assert!(row_grad(&grads, 7) > 0.0);
    }
}
