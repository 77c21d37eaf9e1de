//! ONNX model loader

use crate::config::{Device, ModelsConfig};
use crate::error::EnsembleError;
use crate::models::registry::ModelRegistry;
use anyhow::{Context, Result};
use ndarray::Array4;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Model names and artifact files, in registry order.
pub const MODEL_FILES: [(&str, &str); 3] = [
    ("mobilenetv3", "mobilenetv3.onnx"),
    ("densenet121", "densenet121.onnx"),
    ("resnet50", "resnet50.onnx"),
];

/// Inference backend producing raw per-class scores for one input tensor.
pub trait Classifier: Send + Sync {
    /// Run a forward pass and return the unnormalized class scores.
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

/// Loaded model owned by the registry
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// Execution target the backend was configured for
    pub device: Device,
    classifier: Box<dyn Classifier>,
}

impl LoadedModel {
    pub fn new(
        name: impl Into<String>,
        device: Device,
        classifier: impl Classifier + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            classifier: Box::new(classifier),
        }
    }

    /// Raw class scores for `input`.
    pub fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        self.classifier.forward(input)
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// ONNX Runtime session wrapped as a classifier
pub struct OnnxClassifier {
    /// Session (locked because `run` needs exclusive access)
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output name for class scores
    output_name: String,
}

impl Classifier for OnnxClassifier {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let input_tensor =
            TensorRef::from_array_view(input.view()).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Failed to extract output '{}' as f32", self.output_name))?;

        // [1, classes] or [classes]
        let batch = match shape.len() {
            1 => 1,
            2 => shape[0],
            _ => anyhow::bail!("unexpected output shape {:?}", shape),
        };
        if batch != 1 {
            anyhow::bail!("expected a single-image batch, got output shape {:?}", shape);
        }

        Ok(data.to_vec())
    }
}

/// Loader for ONNX models
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Number of intra-op threads per session
    onnx_threads: usize,
    /// Execution target
    device: Device,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread, CPU)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
            device: Device::Cpu,
        }
    }

    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::with_threads(config.onnx_threads).with_device(config.device)
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
    ) -> Result<LoadedModel, EnsembleError> {
        let path = path.as_ref();

        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            device = %self.device,
            "Loading ONNX model"
        );

        let classifier = self
            .build_classifier(path)
            .map_err(|e| EnsembleError::ModelLoadFailed {
                model: name.to_string(),
                reason: format!("{e:#}"),
            })?;

        info!(
            model = %name,
            input = %classifier.input_name,
            output = %classifier.output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel::new(name, self.device, classifier))
    }

    fn build_classifier(&self, path: &Path) -> Result<OnnxClassifier> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?;

        if self.device == Device::Cuda {
            builder =
                builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("model declares no inputs")?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| {
                let name = o.name.to_lowercase();
                name.contains("logit") || name.contains("output") || name.contains("prob")
            })
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .context("model declares no outputs")?;

        Ok(OnnxClassifier {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Load every known model found in `models_dir`.
    ///
    /// A missing or broken artifact only excludes that model. The returned
    /// registry may be empty, in which case every request will fail with
    /// `NoModelsAvailable`.
    pub fn load_all<P: AsRef<Path>>(&self, models_dir: P) -> ModelRegistry {
        let models_dir = models_dir.as_ref();
        let mut models = Vec::new();

        for (name, filename) in &MODEL_FILES {
            let path = models_dir.join(filename);
            if !path.exists() {
                warn!(model = %name, path = %path.display(), "Model file not found");
                continue;
            }

            match self.load_model(&path, name) {
                Ok(model) => models.push(model),
                Err(e) => {
                    warn!(model = %name, error = %e, "Failed to load model, skipping");
                }
            }
        }

        if models.is_empty() {
            error!(
                models_dir = %models_dir.display(),
                "No models could be loaded! Service will not function correctly"
            );
        } else {
            info!(
                count = models.len(),
                "Loaded {} models from {}",
                models.len(),
                models_dir.display()
            );
        }

        ModelRegistry::new(models)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the fixed model set from `models_dir` with default loader settings.
pub fn load_models<P: AsRef<Path>>(models_dir: P) -> ModelRegistry {
    ModelLoader::default().load_all(models_dir)
}
