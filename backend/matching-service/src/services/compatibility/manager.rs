use super::{CompatibilityModel, ModelParams, ModelType};
use crate::error::{EngineError, Result};
use crate::models::UserRecord;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Shared handle injected into the matching orchestrator and training job
pub type ModelHandle = Arc<RwLock<ModelManager>>;

/// Registry snapshot for observability
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManagerInfo {
    pub available_models: Vec<String>,
    pub active_model: Option<String>,
    pub model_types: BTreeMap<String, ModelType>,
    pub trained_models: Vec<String>,
}

/// Named collection of compatibility models with one active entry
///
/// Promotion policy (which model deserves to become active) lives with the
/// caller; the manager only records the choice.
#[derive(Default)]
pub struct ModelManager {
    models: HashMap<String, CompatibilityModel>,
    active: Option<String>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> ModelHandle {
        Arc::new(RwLock::new(self))
    }

    /// Register a fresh untrained model, replacing any model of that name
    pub fn create(
        &mut self,
        name: impl Into<String>,
        model_type: ModelType,
    ) -> &mut CompatibilityModel {
        self.create_with_params(name, model_type, ModelParams::default())
    }

    pub fn create_with_params(
        &mut self,
        name: impl Into<String>,
        model_type: ModelType,
        params: ModelParams,
    ) -> &mut CompatibilityModel {
        let model = CompatibilityModel::with_params(model_type, params);
        match self.models.entry(name.into()) {
            Entry::Occupied(mut entry) => {
                entry.insert(model);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(model),
        }
    }

    /// Register an already trained or loaded model; returns the one it replaced
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        model: CompatibilityModel,
    ) -> Option<CompatibilityModel> {
        self.models.insert(name.into(), model)
    }

    pub fn get(&self, name: &str) -> Option<&CompatibilityModel> {
        self.models.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CompatibilityModel> {
        self.models.get_mut(name)
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.models.contains_key(name) {
            return Err(EngineError::ModelNotFound(name.to_string()));
        }
        self.active = Some(name.to_string());
        info!(model = name, "Active compatibility model set");
        Ok(())
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_model(&self) -> Result<&CompatibilityModel> {
        self.active
            .as_ref()
            .and_then(|name| self.models.get(name))
            .ok_or(EngineError::NoActiveModel)
    }

    /// True when an active model exists and has trained state
    pub fn has_active_model(&self) -> bool {
        self.active_model().map_or(false, |m| m.is_trained())
    }

    /// Route a prediction to the active model
    pub fn predict(&self, user_a: &UserRecord, user_b: &UserRecord) -> Result<f64> {
        self.active_model()?.predict_compatibility(user_a, user_b)
    }

    pub fn info(&self) -> ManagerInfo {
        let mut available_models: Vec<String> = self.models.keys().cloned().collect();
        available_models.sort();

        let trained_models = available_models
            .iter()
            .filter(|name| self.models.get(*name).map_or(false, |m| m.is_trained()))
            .cloned()
            .collect();

        ManagerInfo {
            model_types: self
                .models
                .iter()
                .map(|(name, model)| (name.clone(), model.model_type()))
                .collect(),
            active_model: self.active.clone(),
            available_models,
            trained_models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_create_and_info() {
        let mut manager = ModelManager::new();
        manager.create("rf", ModelType::RandomForest);
        manager.create("gb", ModelType::GradientBoosting);

        let info = manager.info();
        assert_eq!(info.available_models, vec!["gb", "rf"]);
        assert_eq!(info.active_model, None);
        assert_eq!(info.model_types["gb"], ModelType::GradientBoosting);
        assert!(info.trained_models.is_empty());
    }

    #[test]
    fn test_set_active_unknown_model() {
        let mut manager = ModelManager::new();
        assert!(matches!(
            manager.set_active("missing"),
            Err(EngineError::ModelNotFound(name)) if name == "missing"
        ));
        assert_eq!(manager.active_name(), None);
    }

    #[test]
    fn test_predict_without_active_model() {
        let manager = ModelManager::new();
        let user = UserRecord::new(Uuid::new_v4());
        assert!(matches!(
            manager.predict(&user, &user),
            Err(EngineError::NoActiveModel)
        ));
        assert!(!manager.has_active_model());
    }

    #[test]
    fn test_active_untrained_model_is_not_fitted() {
        let mut manager = ModelManager::new();
        manager.create("default", ModelType::RandomForest);
        manager.set_active("default").unwrap();

        let user = UserRecord::new(Uuid::new_v4());
        assert!(matches!(
            manager.predict(&user, &user),
            Err(EngineError::NotFitted)
        ));
        assert!(!manager.has_active_model());
    }

    #[test]
    fn test_handle_shares_state() {
        let handle = ModelManager::new().into_handle();
        handle
            .write()
            .unwrap()
            .create("default", ModelType::GradientBoosting);

        let reader = Arc::clone(&handle);
        assert!(reader.read().unwrap().get("default").is_some());
    }
}
