// ============================================
// Background Jobs
// ============================================
//
// Offline work that feeds the online engine:
// - Compatibility model training and promotion
//
// Run once from the `matching-service` binary, or on a schedule by the
// caller.

pub mod training;

pub use training::{TrainingJob, TrainingJobConfig, TrainingOutcome};
