use crate::error::{EngineError, Result};
use crate::jobs::TrainingJobConfig;
use crate::services::behavior::BehaviorConfig;
use crate::services::collaborative::{CollaborativeConfig, HybridWeights};
use crate::services::compatibility::{ModelParams, ModelType};
use crate::services::content::ContentConfig;
use crate::services::matching::{MatchingConfig, PromotionPolicy};
use serde::Deserialize;
use std::path::PathBuf;

/// Engine settings, read from `MATCHING_*` environment variables
///
/// Every field has a default, so an empty environment yields a working
/// rule-based configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub use_ml: bool,
    #[serde(default = "default_ml_weight")]
    pub ml_weight: f64,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    #[serde(default = "default_min_validation_r2")]
    pub min_validation_r2: f64,
    #[serde(default = "default_user_based_weight")]
    pub user_based_weight: f64,
    #[serde(default = "default_active_model")]
    pub active_model: String,
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    /// Empty disables artifact persistence
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    #[serde(default = "default_synthetic_pairs")]
    pub synthetic_pairs: usize,
    #[serde(default = "default_min_interactions")]
    pub min_interactions: usize,
}

fn default_ml_weight() -> f64 {
    0.7
}

fn default_min_similarity() -> f64 {
    0.1
}

fn default_min_validation_r2() -> f64 {
    0.5
}

fn default_user_based_weight() -> f64 {
    0.7
}

fn default_active_model() -> String {
    "default".to_string()
}

fn default_n_estimators() -> usize {
    100
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_artifact_path() -> String {
    "models/compatibility.bin".to_string()
}

fn default_synthetic_pairs() -> usize {
    1000
}

fn default_min_interactions() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_ml: false,
            ml_weight: default_ml_weight(),
            min_similarity: default_min_similarity(),
            min_validation_r2: default_min_validation_r2(),
            user_based_weight: default_user_based_weight(),
            active_model: default_active_model(),
            model_type: ModelType::default(),
            n_estimators: default_n_estimators(),
            validation_split: default_validation_split(),
            artifact_path: default_artifact_path(),
            synthetic_pairs: default_synthetic_pairs(),
            min_interactions: default_min_interactions(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("MATCHING_").from_env::<EngineConfig>()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ml_weight", self.ml_weight),
            ("min_similarity", self.min_similarity),
            ("user_based_weight", self.user_based_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidInput(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(EngineError::InvalidInput(format!(
                "validation_split must be within (0, 1), got {}",
                self.validation_split
            )));
        }

        if self.n_estimators == 0 {
            return Err(EngineError::InvalidInput("n_estimators must be positive".to_string()));
        }

        if self.active_model.trim().is_empty() {
            return Err(EngineError::InvalidInput("active_model must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn matching_config(&self) -> MatchingConfig {
        MatchingConfig {
            use_ml: self.use_ml,
            ml_weight: self.ml_weight,
            ..MatchingConfig::default()
        }
    }

    pub fn collaborative_config(&self) -> CollaborativeConfig {
        CollaborativeConfig {
            min_similarity: self.min_similarity,
            weights: HybridWeights::from_user_based(self.user_based_weight),
            ..CollaborativeConfig::default()
        }
    }

    pub fn content_config(&self) -> ContentConfig {
        ContentConfig {
            min_similarity: self.min_similarity,
            ..ContentConfig::default()
        }
    }

    pub fn behavior_config(&self) -> BehaviorConfig {
        BehaviorConfig {
            min_interactions: self.min_interactions,
        }
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            n_estimators: self.n_estimators,
            validation_split: self.validation_split,
            ..ModelParams::default()
        }
    }

    pub fn promotion_policy(&self) -> PromotionPolicy {
        PromotionPolicy {
            min_validation_r2: self.min_validation_r2,
        }
    }

    pub fn artifact_path(&self) -> Option<PathBuf> {
        let trimmed = self.artifact_path.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    pub fn training_job_config(&self) -> TrainingJobConfig {
        TrainingJobConfig {
            model_name: self.active_model.clone(),
            model_type: self.model_type,
            params: self.model_params(),
            policy: self.promotion_policy(),
            artifact_path: self.artifact_path(),
        }
    }
}
