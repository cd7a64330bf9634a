// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Anything that can estimate a conversion probability for a
// (user, product) pair. Two implementations exist:
//   - Prod2VecScorer   → the trained embedding model
//   - AveragePredictor → a constant base-rate baseline
//
// Evaluation code compares the two through this trait, so it
// never needs to know which one it is holding.

use anyhow::Result;

// ─── ConversionPredictor ──────────────────────────────────────────────────────
pub trait ConversionPredictor {
    /// Predict P(conversion) for each (users[i], products[i]) pair.
    /// `products` are catalogue ids, not embedding rows.
    fn predict(&self, users: &[usize], products: &[usize]) -> Result<Vec<f32>>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}
