//! ML model loading, inference and ensembling

pub mod aggregator;
pub mod inference;
pub mod loader;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{Consensus, EnsembleAggregator};
pub use inference::{run_ensemble, InferenceEngine};
pub use loader::{load_models, Classifier, LoadedModel, ModelLoader};
pub use registry::ModelRegistry;
