//! Multi-model inference engine for lesion classification

use crate::config::{FailurePolicy, ModelsConfig};
use crate::error::EnsembleError;
use crate::models::aggregator::{argmax, Distribution, EnsembleAggregator};
use crate::models::loader::LoadedModel;
use crate::models::registry::ModelRegistry;
use crate::preprocess::ImagePreprocessor;
use crate::types::{ClassLabel, EnsembleResult, ModelPrediction, CLASS_COUNT};
use ndarray::Array4;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Output of one model on one image
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Softmax of the raw scores
    pub probabilities: Distribution,
    /// Argmax class and its probability
    pub prediction: ModelPrediction,
    /// Forward pass duration
    pub latency: Duration,
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .map(|&v| v as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&v| (v as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Run one model against one preprocessed tensor.
///
/// ONNX graphs are forward-only, so no gradient state is ever built.
pub fn run_model(model: &LoadedModel, input: &Array4<f32>) -> Result<ModelOutput, EnsembleError> {
    let start = Instant::now();

    let logits = model
        .forward(input)
        .map_err(|e| EnsembleError::inference(&model.name, format!("{e:#}")))?;

    let latency = start.elapsed();

    if logits.len() != CLASS_COUNT {
        return Err(EnsembleError::inference(
            &model.name,
            format!("expected {} class scores, got {}", CLASS_COUNT, logits.len()),
        ));
    }
    if let Some(bad) = logits.iter().find(|v| !v.is_finite()) {
        return Err(EnsembleError::inference(
            &model.name,
            format!("non-finite class score {}", bad),
        ));
    }

    let mut probabilities = [0.0; CLASS_COUNT];
    probabilities.copy_from_slice(&softmax(&logits));

    let class_id = argmax(&probabilities);
    let prediction = ModelPrediction::new(ClassLabel::ALL[class_id], probabilities[class_id]);

    debug!(
        model = %model.name,
        class = %prediction.class_name,
        confidence = prediction.confidence,
        latency_us = latency.as_micros() as u64,
        "Model inference complete"
    );

    Ok(ModelOutput {
        probabilities,
        prediction,
        latency,
    })
}

/// Full image-to-consensus pipeline over a model registry
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    preprocessor: ImagePreprocessor,
    aggregator: EnsembleAggregator,
    failure_policy: FailurePolicy,
    parallel: bool,
}

impl InferenceEngine {
    /// Create an engine from the models configuration
    pub fn new(config: &ModelsConfig) -> Self {
        Self::default()
            .with_failure_policy(config.failure_policy)
            .with_parallel(config.parallel)
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Classify one encoded image with every model in `registry`.
    ///
    /// Under [`FailurePolicy::Partial`] a failing model is excluded and listed
    /// in `failed_models`; the request only fails when no model succeeds.
    /// Under [`FailurePolicy::FailFast`] the first failure (registry order)
    /// aborts the request.
    pub fn run_ensemble(
        &self,
        image_bytes: &[u8],
        registry: &ModelRegistry,
    ) -> Result<EnsembleResult, EnsembleError> {
        registry.ensure_usable()?;

        let tensor = self.preprocessor.preprocess(image_bytes)?;

        let mut distributions = BTreeMap::new();
        let mut model_predictions = BTreeMap::new();
        let mut model_latencies = BTreeMap::new();
        let mut failed_models = BTreeMap::new();
        let mut first_failure = None;

        // every outcome is known before aggregation starts
        for (name, outcome) in self.evaluate(&tensor, registry) {
            match outcome {
                Ok(output) => {
                    distributions.insert(name.clone(), output.probabilities);
                    model_predictions.insert(name.clone(), output.prediction);
                    model_latencies.insert(name, output.latency);
                }
                Err(e) => {
                    error!(model = %name, error = %e, "Model inference failed");
                    if self.failure_policy == FailurePolicy::FailFast {
                        return Err(e);
                    }
                    let reason = match &e {
                        EnsembleError::InferenceFailed { reason, .. } => reason.clone(),
                        other => other.to_string(),
                    };
                    failed_models.insert(name, reason);
                    first_failure.get_or_insert(e);
                }
            }
        }

        let consensus = match self.aggregator.aggregate(&distributions) {
            Some(consensus) => consensus,
            None => return Err(first_failure.unwrap_or(EnsembleError::NoModelsAvailable)),
        };

        debug!(
            consensus = %consensus.class,
            agreement = consensus.agreement,
            contributors = consensus.contributors,
            failed = failed_models.len(),
            "Ensemble inference complete"
        );

        Ok(EnsembleResult {
            consensus: consensus.class,
            agreement: consensus.agreement,
            votes: consensus.votes,
            probabilities: consensus.probabilities,
            model_predictions,
            failed_models,
            model_latencies,
        })
    }

    /// Run the models, returning outcomes in registry order.
    fn evaluate(
        &self,
        tensor: &Array4<f32>,
        registry: &ModelRegistry,
    ) -> Vec<(String, Result<ModelOutput, EnsembleError>)> {
        if self.parallel {
            return registry
                .models()
                .par_iter()
                .map(|model| (model.name.clone(), run_model(model, tensor)))
                .collect();
        }

        let mut outcomes = Vec::with_capacity(registry.len());
        for model in registry.models() {
            let outcome = run_model(model, tensor);
            let failed = outcome.is_err();
            outcomes.push((model.name.clone(), outcome));
            if failed && self.failure_policy == FailurePolicy::FailFast {
                break;
            }
        }
        outcomes
    }
}

/// Classify an image with default engine settings (partial failures, sequential).
pub fn run_ensemble(
    image_bytes: &[u8],
    registry: &ModelRegistry,
) -> Result<EnsembleResult, EnsembleError> {
    InferenceEngine::default().run_ensemble(image_bytes, registry)
}
