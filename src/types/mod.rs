//! Type definitions for the lesion classification pipeline

pub mod lesion;
pub mod prediction;

pub use lesion::{annotate, ClassLabel, ClassMetadata, RiskTier, CLASS_COUNT};
pub use prediction::{ClassificationReport, Diagnosis, EnsembleResult, ModelPrediction};
