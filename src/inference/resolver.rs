//! Model reference resolution.

use super::{InferenceAdapter, OnnxDetector};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Turns a model reference into a loaded adapter.
pub trait ModelResolver: Send + Sync {
    /// Load the model named `model_ref`.
    ///
    /// Fails with `ModelNotFound` for unknown references and
    /// `ModelUnavailable` when a known model cannot be loaded.
    fn resolve(&self, model_ref: &str) -> Result<Arc<dyn InferenceAdapter>>;

    /// References this resolver knows about.
    fn known(&self) -> Vec<String>;
}

/// Resolves references against the `[models]` table of the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigModelResolver {
    models: HashMap<String, ModelConfig>,
}

impl ConfigModelResolver {
    /// Create a resolver over configured models.
    #[must_use]
    pub fn new(models: HashMap<String, ModelConfig>) -> Self {
        Self { models }
    }
}

impl ModelResolver for ConfigModelResolver {
    fn resolve(&self, model_ref: &str) -> Result<Arc<dyn InferenceAdapter>> {
        let config = self.models.get(model_ref).ok_or_else(|| Error::ModelNotFound {
            name: model_ref.to_string(),
        })?;
        let detector = OnnxDetector::load(model_ref, config)?;
        Ok(Arc::new(detector))
    }

    fn known(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Resolves references to adapters constructed up front.
#[derive(Default)]
pub struct StaticModelResolver {
    adapters: HashMap<String, Arc<dyn InferenceAdapter>>,
}

impl StaticModelResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under its own name.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn InferenceAdapter>) -> Self {
        self.adapters.insert(adapter.name().to_string(), adapter);
        self
    }
}

impl ModelResolver for StaticModelResolver {
    fn resolve(&self, model_ref: &str) -> Result<Arc<dyn InferenceAdapter>> {
        self.adapters
            .get(model_ref)
            .cloned()
            .ok_or_else(|| Error::ModelNotFound {
                name: model_ref.to_string(),
            })
    }

    fn known(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}
