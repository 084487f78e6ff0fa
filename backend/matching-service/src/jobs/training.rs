// ============================================
// Compatibility Training Job
// ============================================
//
// One training pass:
// 1. Fit a CompatibilityModel on a blocking worker
// 2. Check the validation metrics against the promotion policy
// 3. On acceptance, save the artifact and make the model active
//
// A rejected model is dropped; the registry keeps whatever was active.

use crate::error::EngineError;
use crate::services::compatibility::{
    CompatibilityModel, ModelHandle, ModelParams, ModelType, TrainingMetrics,
};
use crate::services::matching::PromotionPolicy;
use crate::services::training_data::TrainingPair;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TrainingJobConfig {
    /// Registry name the promoted model is stored under
    pub model_name: String,
    pub model_type: ModelType,
    pub params: ModelParams,
    pub policy: PromotionPolicy,
    /// Where a promoted model is written; `None` keeps it in memory only
    pub artifact_path: Option<PathBuf>,
}

impl Default for TrainingJobConfig {
    fn default() -> Self {
        Self {
            model_name: "default".to_string(),
            model_type: ModelType::default(),
            params: ModelParams::default(),
            policy: PromotionPolicy::default(),
            artifact_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub model_name: String,
    pub metrics: TrainingMetrics,
    pub promoted: bool,
    pub duration_ms: u64,
}

pub struct TrainingJob {
    config: TrainingJobConfig,
    models: ModelHandle,
}

impl TrainingJob {
    pub fn new(config: TrainingJobConfig, models: ModelHandle) -> Self {
        Self { config, models }
    }

    pub fn config(&self) -> &TrainingJobConfig {
        &self.config
    }

    /// Train on `pairs` and promote the result if the policy accepts it
    pub async fn run(&self, pairs: Vec<TrainingPair>) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let model_type = self.config.model_type;
        let params = self.config.params.clone();

        info!(
            model = %self.config.model_name,
            model_type = model_type.as_str(),
            pairs = pairs.len(),
            "Starting compatibility training"
        );

        let (model, metrics) = tokio::task::spawn_blocking(move || {
            let mut model = CompatibilityModel::with_params(model_type, params);
            let metrics = model.train(&pairs)?;
            Ok::<_, EngineError>((model, metrics))
        })
        .await
        .context("Training worker panicked")?
        .context("Compatibility training failed")?;

        let promoted = self.config.policy.accepts(&metrics);
        if promoted {
            self.promote(model)?;
            info!(
                model = %self.config.model_name,
                val_r2 = metrics.val_r2,
                val_rmse = metrics.val_rmse,
                "Model promoted"
            );
        } else {
            warn!(
                model = %self.config.model_name,
                val_r2 = metrics.val_r2,
                min_validation_r2 = self.config.policy.min_validation_r2,
                "Model rejected by promotion policy"
            );
        }

        Ok(TrainingOutcome {
            model_name: self.config.model_name.clone(),
            metrics,
            promoted,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn promote(&self, model: CompatibilityModel) -> Result<()> {
        if let Some(path) = &self.config.artifact_path {
            model
                .save(path)
                .with_context(|| format!("Failed to save model artifact to {}", path.display()))?;
            info!(path = %path.display(), "Model artifact saved");
        }

        let mut manager = self
            .models
            .write()
            .map_err(|_| anyhow!("Model registry lock poisoned"))?;
        manager.insert(self.config.model_name.clone(), model);
        manager.set_active(&self.config.model_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::compatibility::ModelManager;
    use crate::services::training_data::synthetic_pairs;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_params() -> ModelParams {
        ModelParams {
            n_estimators: 8,
            ..ModelParams::default()
        }
    }

    #[tokio::test]
    async fn test_rejected_model_not_registered() {
        let handle = ModelManager::new().into_handle();
        let config = TrainingJobConfig {
            params: small_params(),
            // Unreachable bar
            policy: PromotionPolicy { min_validation_r2: 2.0 },
            ..TrainingJobConfig::default()
        };
        let job = TrainingJob::new(config, handle.clone());

        let mut rng = StdRng::seed_from_u64(7);
        let outcome = job.run(synthetic_pairs(40, &mut rng)).await.unwrap();

        assert!(!outcome.promoted);
        let manager = handle.read().unwrap();
        assert!(manager.get("default").is_none());
        assert!(!manager.has_active_model());
    }

    #[tokio::test]
    async fn test_accepted_model_becomes_active() {
        let handle = ModelManager::new().into_handle();
        let config = TrainingJobConfig {
            model_name: "candidate".into(),
            params: small_params(),
            policy: PromotionPolicy {
                min_validation_r2: f64::NEG_INFINITY,
            },
            ..TrainingJobConfig::default()
        };
        let job = TrainingJob::new(config, handle.clone());

        let mut rng = StdRng::seed_from_u64(7);
        let outcome = job.run(synthetic_pairs(40, &mut rng)).await.unwrap();

        assert!(outcome.promoted);
        assert_eq!(outcome.metrics.training_samples + outcome.metrics.validation_samples, 40);
        let manager = handle.read().unwrap();
        assert_eq!(manager.active_name(), Some("candidate"));
        assert!(manager.has_active_model());
    }

    #[tokio::test]
    async fn test_empty_training_set_fails() {
        let handle = ModelManager::new().into_handle();
        let job = TrainingJob::new(TrainingJobConfig::default(), handle);
        assert!(job.run(Vec::new()).await.is_err());
    }
}
