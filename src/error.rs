//! Error taxonomy for the ensemble pipeline

use thiserror::Error;

/// Failures surfaced by the ensemble core.
///
/// Load failures are logged and swallowed by the loader; every other variant
/// propagates to the caller so the transport layer can map it to a response.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// A single model artifact could not be loaded (non-fatal at startup)
    #[error("failed to load model '{model}': {reason}")]
    ModelLoadFailed { model: String, reason: String },

    /// The registry holds no usable models
    #[error("no models are available for inference")]
    NoModelsAvailable,

    /// The submitted bytes could not be decoded as an image
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A model's forward pass failed or produced unusable output
    #[error("inference failed for model '{model}': {reason}")]
    InferenceFailed { model: String, reason: String },

    /// A class code outside the fixed diagnostic set
    #[error("unknown class '{0}'")]
    UnknownClass(String),
}

impl EnsembleError {
    /// Short machine-readable kind, used for metrics and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EnsembleError::ModelLoadFailed { .. } => "model_load_failed",
            EnsembleError::NoModelsAvailable => "no_models_available",
            EnsembleError::InvalidImage(_) => "invalid_image",
            EnsembleError::InferenceFailed { .. } => "inference_failed",
            EnsembleError::UnknownClass(_) => "unknown_class",
        }
    }

    pub(crate) fn inference(model: &str, reason: impl ToString) -> Self {
        EnsembleError::InferenceFailed {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}
