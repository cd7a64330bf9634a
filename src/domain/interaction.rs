// ============================================================
// Layer 3 — Interaction Domain Type
// ============================================================
// One logged (user, product, outcome) event.
//
// Interactions come from two logging policies:
//   - Treatment (St): the production recommender chose the product
//   - Control   (Sc): the product was shown uniformly at random
//
// The causal model keeps one embedding per product per arm.
// Both halves live in a single matrix of 2 * num_products rows:
//
//   rows [0, num_products)                → treatment embeddings
//   rows [num_products, 2 * num_products) → control embeddings
//
// A control example for product p therefore looks up row
// p + num_products, and its treatment counterpart is row p.

use serde::{Deserialize, Serialize};

/// Which logging policy produced an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arm {
    /// Logged under the recommendation policy (St)
    Treatment,
    /// Logged under uniform random exposure (Sc)
    Control,
}

/// A single labelled user/product event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// User id in [0, num_users)
    pub user: usize,

    /// Catalogue product id in [0, num_products).
    /// This is NOT the embedding row — see `product_row`.
    pub product: usize,

    /// Observed outcome in [0, 1] (1 = converted)
    pub label: f32,

    pub arm: Arm,
}

impl Interaction {
    pub fn new(user: usize, product: usize, label: f32, arm: Arm) -> Self {
        Self { user, product, label, arm }
    }

    pub fn treatment(user: usize, product: usize, label: f32) -> Self {
        Self::new(user, product, label, Arm::Treatment)
    }

    pub fn control(user: usize, product: usize, label: f32) -> Self {
        Self::new(user, product, label, Arm::Control)
    }

    /// Row of the product embedding matrix this example trains.
    pub fn product_row(&self, num_products: usize) -> usize {
        match self.arm {
            Arm::Treatment => self.product,
            Arm::Control   => self.product + num_products,
        }
    }

    /// Row holding the treatment representation of the same product.
    /// Always < num_products.
    pub fn treatment_row(&self) -> usize {
        self.product
    }

    pub fn is_control(&self) -> bool {
        self.arm == Arm::Control
    }
}

/// Fraction of positive labels. Returns 0.0 for an empty slice.
pub fn conversion_rate(items: &[Interaction]) -> f32 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|i| i.label).sum::<f32>() / items.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_treatment_rows_are_catalogue_ids() {
        let i = Interaction::treatment(3, 7, 1.0);
        assert_eq!(i.product_row(10), 7);
        assert_eq!(i.treatment_row(), 7);
        assert!(!i.is_control());
    }

    #[test]
    fn test_control_rows_are_shifted() {
        let i = Interaction::control(3, 7, 0.0);
        assert_eq!(i.product_row(10), 17);
        // product_row - num_products gives back the treatment row
        assert_eq!(i.product_row(10) - 10, i.treatment_row());
    }

    #[test]
    fn test_conversion_rate() {
        let items = vec![
            Interaction::treatment(0, 0, 1.0),
            Interaction::treatment(0, 1, 0.0),
            Interaction::control(1, 1, 1.0),
            Interaction::control(1, 2, 0.0),
        ];
        assert!((conversion_rate(&items) - 0.5).abs() < 1e-6);
        assert_eq!(conversion_rate(&[]), 0.0);
    }
}
