// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing the recommendation
// problem. No Burn types and no I/O in here.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Logged user/product events and the treatment/control split
pub mod interaction;

// Abstractions implemented by the ML layer
pub mod traits;
