//! Per-request prediction structures

use crate::error::EnsembleError;
use crate::types::lesion::{annotate, ClassLabel, RiskTier, CLASS_COUNT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Argmax of one model's output on one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub class_id: usize,
    /// Short class code
    pub class_name: ClassLabel,
    /// Probability of the argmax class
    pub confidence: f64,
}

impl ModelPrediction {
    pub fn new(class: ClassLabel, confidence: f64) -> Self {
        Self {
            class_id: class.id(),
            class_name: class,
            confidence,
        }
    }

    pub fn class(&self) -> ClassLabel {
        self.class_name
    }
}

/// Outcome of one ensemble run over the registry
#[derive(Debug, Clone)]
pub struct EnsembleResult {
    /// Majority-vote class
    pub consensus: ClassLabel,
    /// Votes for the consensus class divided by contributing models
    pub agreement: f64,
    /// Number of models that voted for the consensus class
    pub votes: usize,
    /// Arithmetic mean of the per-model distributions, indexed by class id
    pub probabilities: [f64; CLASS_COUNT],
    /// Argmax prediction of every contributing model
    pub model_predictions: BTreeMap<String, ModelPrediction>,
    /// Models that failed under the partial-failure policy, with the reason
    pub failed_models: BTreeMap<String, String>,
    /// Forward-pass latency of every model that ran
    pub model_latencies: BTreeMap<String, Duration>,
}

impl EnsembleResult {
    /// Number of models whose output entered the vote.
    pub fn contributing_models(&self) -> usize {
        self.model_predictions.len()
    }

    /// Attach clinical metadata and produce the serializable report.
    pub fn to_report(&self) -> Result<ClassificationReport, EnsembleError> {
        let metadata = annotate(self.consensus.code())?;

        let prediction = Diagnosis {
            class_id: self.consensus.id(),
            class_name: self.consensus,
            display_name: metadata.display_name.to_string(),
            risk: metadata.risk,
            description: metadata.description.to_string(),
            recommendation: metadata.recommendation.to_string(),
            agreement: self.agreement,
        };

        let class_probabilities = ClassLabel::ALL
            .iter()
            .map(|label| (label.code().to_string(), self.probabilities[label.id()]))
            .collect();

        Ok(ClassificationReport {
            request_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            prediction,
            model_predictions: self.model_predictions.clone(),
            class_probabilities,
            failed_models: self.failed_models.clone(),
        })
    }
}

/// Consensus diagnosis with its clinical annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub class_id: usize,
    pub class_name: ClassLabel,
    pub display_name: String,
    pub risk: RiskTier,
    pub description: String,
    pub recommendation: String,
    /// Fraction of models that voted for this class
    pub agreement: f64,
}

/// Final structured result returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Unique request identifier
    pub request_id: String,

    /// Report generation timestamp
    pub created_at: DateTime<Utc>,

    /// Ensemble consensus
    pub prediction: Diagnosis,

    /// Individual model predictions
    pub model_predictions: BTreeMap<String, ModelPrediction>,

    /// Averaged probability per class code
    pub class_probabilities: BTreeMap<String, f64>,

    /// Models excluded from this result
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_models: BTreeMap<String, String>,
}

impl ClassificationReport {
    /// Reuse an existing request identifier (e.g. the one on the tracing span)
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}
