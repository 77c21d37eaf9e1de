//! Skin Lesion Ensemble Classifier Library
//!
//! Loads several independently trained ONNX classifiers, runs each on a
//! submitted photograph and combines their predictions into one consensus
//! diagnosis with clinical metadata attached.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::EnsembleError;
pub use models::inference::{run_ensemble, InferenceEngine};
pub use models::loader::load_models;
pub use models::registry::ModelRegistry;
pub use preprocess::ImagePreprocessor;
pub use types::{ClassLabel, ClassificationReport, EnsembleResult};
