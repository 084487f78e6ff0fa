use anyhow::Context;
use matching_service::services::compatibility::CompatibilityModel;
use matching_service::services::training_data::synthetic_pairs;
use matching_service::{EngineConfig, ModelManager, TrainingJob};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Seed for the bootstrap data set
const SYNTHETIC_SEED: u64 = 42;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env().context("Failed to load MATCHING_* configuration")?;
    config.validate().context("Invalid engine configuration")?;

    info!(
        model = %config.active_model,
        model_type = config.model_type.as_str(),
        synthetic_pairs = config.synthetic_pairs,
        "Starting compatibility training job"
    );

    let mut manager = ModelManager::new();

    // Keep serving the previous artifact if the new model is rejected
    if let Some(path) = config.artifact_path().filter(|p| p.exists()) {
        match CompatibilityModel::load(&path) {
            Ok(model) => {
                manager.insert(config.active_model.clone(), model);
                manager.set_active(&config.active_model)?;
                info!(path = %path.display(), "Loaded existing model artifact");
            }
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Ignoring unreadable model artifact"
            ),
        }
    }

    let models = manager.into_handle();
    let job = TrainingJob::new(config.training_job_config(), models.clone());

    let mut rng = StdRng::seed_from_u64(SYNTHETIC_SEED);
    let pairs = synthetic_pairs(config.synthetic_pairs, &mut rng);
    let outcome = job.run(pairs).await?;

    info!(
        promoted = outcome.promoted,
        train_r2 = outcome.metrics.train_r2,
        val_r2 = outcome.metrics.val_r2,
        duration_ms = outcome.duration_ms,
        "Training job finished"
    );

    let registry = models
        .read()
        .map_err(|_| anyhow::anyhow!("Model registry lock poisoned"))?
        .info();
    info!(registry = %serde_json::to_string(&registry)?, "Model registry state");

    Ok(())
}
