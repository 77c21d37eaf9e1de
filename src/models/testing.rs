//! Deterministic in-memory classifiers for tests

use crate::models::loader::Classifier;
use crate::types::CLASS_COUNT;
use anyhow::Result;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns the same scores for every input.
pub struct FixedLogits {
    logits: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedLogits {
    pub fn new(logits: Vec<f32>) -> Self {
        Self {
            logits,
            calls: AtomicUsize::new(0),
        }
    }

    /// Scores whose softmax puts most of the mass on `class_id`.
    pub fn favoring(class_id: usize) -> Self {
        let mut logits = vec![0.0; CLASS_COUNT];
        logits[class_id] = 4.0;
        Self::new(logits)
    }

    /// Scores whose softmax reproduces `probabilities`.
    pub fn from_probabilities(probabilities: [f64; CLASS_COUNT]) -> Self {
        Self::new(probabilities.iter().map(|p| p.ln() as f32).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Classifier for FixedLogits {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        anyhow::ensure!(
            input.shape() == [1, 3, 224, 224],
            "unexpected input shape {:?}",
            input.shape()
        );
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.logits.clone())
    }
}

impl Classifier for std::sync::Arc<FixedLogits> {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        self.as_ref().forward(input)
    }
}

/// Blocks for a fixed delay before answering like [`FixedLogits::favoring`].
pub struct Slow(pub std::time::Duration);

impl Classifier for Slow {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        std::thread::sleep(self.0);
        FixedLogits::favoring(0).forward(input)
    }
}

/// Always fails its forward pass.
pub struct Broken(pub &'static str);

impl Classifier for Broken {
    fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>> {
        anyhow::bail!("{}", self.0)
    }
}
