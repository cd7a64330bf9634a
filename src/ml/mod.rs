// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn-specific code lives here.
//
//   model.rs             — parameters, forward graph, control
//                          embeddings and the composed objective
//   batch.rs             — input tensors built from interactions
//   loss.rs              — logistic, L2, counterfactual and MSE terms
//   average_predictor.rs — constant conversion-rate baseline
//   trainer.rs           — gradient-descent step and evaluation
//   inferencer.rs        — scoring and top-k recommendation
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Bonner & Vasile (2018) Causal Embeddings for Recommendation

/// Prod2Vec parameters and forward pass
pub mod model;

/// Model input tensors
pub mod batch;

/// Loss terms and their composition
pub mod loss;

/// Average predictor baseline
pub mod average_predictor;

/// Optimiser step, global step, gradient norms
pub mod trainer;

/// Inference-time scorer
pub mod inferencer;
