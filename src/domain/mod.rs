// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and traits describing relation
// extraction records. No Burn types, no file I/O.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Entity type codes and decoded spans
pub mod entity;

// Domain error kinds
pub mod error;

// The 30-class relation label space and frequency tables
pub mod label;

// Raw and marker-rewritten records
pub mod record;

// Core abstractions (traits) that other layers implement
pub mod traits;
