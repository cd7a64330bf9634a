// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the training driver:
//
//   summaries.rs — scalar and histogram snapshots of the loss and
//                  the weights, emitted through `tracing`
//
//   metrics.rs   — per-step loss terms appended to a CSV file
//                  for plotting learning curves
//
// Reference: Rust Book §9 (Error Handling with anyhow)

/// Loss and weight summaries
pub mod summaries;

/// Training metrics CSV logger
pub mod metrics;
