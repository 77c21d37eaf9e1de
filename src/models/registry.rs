//! Immutable registry of loaded models

use crate::error::EnsembleError;
use crate::models::loader::LoadedModel;
use std::collections::BTreeSet;

/// Models available for inference, in load order.
///
/// Built once at startup and shared read-only afterwards (wrap it in an
/// `Arc` to hand it to request handlers).
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<LoadedModel>,
}

impl ModelRegistry {
    /// Create a registry from loaded models. Duplicate names keep the first.
    pub fn new(models: Vec<LoadedModel>) -> Self {
        let mut seen = BTreeSet::new();
        let models = models
            .into_iter()
            .filter(|m| seen.insert(m.name.clone()))
            .collect();
        Self { models }
    }

    /// Names of every loaded model.
    pub fn available_models(&self) -> BTreeSet<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    /// Model names in registry order.
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&LoadedModel> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Loaded models in registry order.
    pub fn models(&self) -> &[LoadedModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// A registry without models cannot serve requests.
    pub fn is_usable(&self) -> bool {
        !self.models.is_empty()
    }

    pub fn ensure_usable(&self) -> Result<(), EnsembleError> {
        if self.is_usable() {
            Ok(())
        } else {
            Err(EnsembleError::NoModelsAvailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;
    use crate::models::testing::FixedLogits;

    fn model(name: &str) -> LoadedModel {
        LoadedModel::new(name, Device::Cpu, FixedLogits::favoring(0))
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = ModelRegistry::new(vec![model("resnet50"), model("mobilenetv3")]);

        assert_eq!(registry.len(), 2);
        assert!(registry.get("resnet50").is_some());
        assert!(registry.get("densenet121").is_none());
        assert_eq!(registry.model_names(), ["resnet50", "mobilenetv3"]);

        let names: Vec<String> = registry.available_models().into_iter().collect();
        assert_eq!(names, ["mobilenetv3", "resnet50"]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let registry = ModelRegistry::new(vec![model("resnet50"), model("resnet50")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_registry_is_unusable() {
        let registry = ModelRegistry::default();

        assert!(!registry.is_usable());
        assert!(matches!(
            registry.ensure_usable(),
            Err(EnsembleError::NoModelsAvailable)
        ));
    }
}
