//! glycora-common — Shared types and errors used across all Glycora crates.

pub mod error;
pub mod profile;

// Re-export commonly used types
pub use error::{GlycoraError, Result};
pub use profile::{CurrentMedication, GoalTier, Insurance, ParsedDose, PatientProfile};
