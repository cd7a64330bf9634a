// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no loss formulas.
// The single use case drives a synthetic training run end to end.

// Synthetic-data training and evaluation workflow
pub mod train_use_case;
