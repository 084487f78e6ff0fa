// ============================================
// Compatibility Regression Model
// ============================================
//
// Maps a pair of users to a learned compatibility score in [0, 1].
//
// Pair layout (4 × canonical user features):
//   [features_a, features_b, features_a - features_b, |features_a - features_b|]
//
// Lifecycle: untrained → trained (train or load). Retraining replaces the
// whole trained state.

pub mod manager;
pub mod tree;

pub use manager::{ManagerInfo, ModelHandle, ModelManager};

use crate::error::{EngineError, Result};
use crate::models::UserRecord;
use crate::services::features::{FeatureExtractor, StandardScaler};
use crate::utils::{by_score_desc, clamp_unit};
use chrono::{DateTime, Utc};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use tree::{GradientBoosting, RandomForest, TreeParams};

/// Bumped whenever the artifact layout changes
const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    RandomForest,
    GradientBoosting,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::RandomForest => "random_forest",
            ModelType::GradientBoosting => "gradient_boosting",
        }
    }

    fn default_max_depth(&self) -> usize {
        match self {
            ModelType::RandomForest => 10,
            ModelType::GradientBoosting => 6,
        }
    }
}

/// Estimator hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParams {
    pub n_estimators: usize,
    /// Falls back to the model type's default depth when unset
    pub max_depth: Option<usize>,
    /// Gradient boosting only
    pub learning_rate: f64,
    pub validation_split: f64,
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            learning_rate: 0.1,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    pub train_rmse: f64,
    pub val_rmse: f64,
    pub train_r2: f64,
    pub val_r2: f64,
    pub training_samples: usize,
    pub validation_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl Estimator {
    fn fit(model_type: ModelType, params: &ModelParams, x: &Array2<f64>, y: &[f64]) -> Self {
        let tree_params = TreeParams {
            max_depth: params.max_depth.unwrap_or(model_type.default_max_depth()),
            ..Default::default()
        };

        match model_type {
            ModelType::RandomForest => {
                let mut rng = StdRng::seed_from_u64(params.seed);
                Estimator::RandomForest(RandomForest::fit(
                    x,
                    y,
                    params.n_estimators,
                    &tree_params,
                    &mut rng,
                ))
            }
            ModelType::GradientBoosting => Estimator::GradientBoosting(GradientBoosting::fit(
                x,
                y,
                params.n_estimators,
                params.learning_rate,
                &tree_params,
            )),
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Estimator::RandomForest(forest) => forest.predict_row(row),
            Estimator::GradientBoosting(boosting) => boosting.predict_row(row),
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        match self {
            Estimator::RandomForest(forest) => forest.feature_importances(),
            Estimator::GradientBoosting(boosting) => boosting.feature_importances(),
        }
    }
}

#[derive(Debug, Clone)]
struct TrainedState {
    scaler: StandardScaler,
    estimator: Estimator,
    trained_at: DateTime<Utc>,
    metrics: Option<TrainingMetrics>,
}

/// On-disk envelope; everything a loader needs to validate before use
#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    model_type: ModelType,
    feature_names: Vec<String>,
    params: ModelParams,
    scaler: StandardScaler,
    estimator: Estimator,
    trained_at: DateTime<Utc>,
    metrics: Option<TrainingMetrics>,
}

/// Names of the pair vector columns, in order
pub fn pair_feature_names() -> Vec<String> {
    let base = FeatureExtractor::feature_names();
    ["user1", "user2", "diff", "absdiff"]
        .iter()
        .flat_map(|prefix| base.iter().map(move |name| format!("{}_{}", prefix, name)))
        .collect()
}

pub struct CompatibilityModel {
    model_type: ModelType,
    params: ModelParams,
    extractor: FeatureExtractor,
    state: Option<TrainedState>,
}

impl CompatibilityModel {
    pub fn new(model_type: ModelType) -> Self {
        Self::with_params(model_type, ModelParams::default())
    }

    pub fn with_params(model_type: ModelType, params: ModelParams) -> Self {
        Self {
            model_type,
            params,
            extractor: FeatureExtractor::new(),
            state: None,
        }
    }

    /// Use a specific extractor (e.g. one pinned to a reference date)
    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.state.as_ref().map(|s| s.trained_at)
    }

    /// Metrics of the last training run, if this instance was trained or
    /// loaded from an artifact that recorded them
    pub fn metrics(&self) -> Option<&TrainingMetrics> {
        self.state.as_ref().and_then(|s| s.metrics.as_ref())
    }

    /// Pair vector for two raw user feature vectors
    fn pair_vector(features_a: ArrayView1<f64>, features_b: ArrayView1<f64>) -> Array1<f64> {
        let diff = &features_a - &features_b;
        let abs_diff = diff.mapv(f64::abs);
        // Lengths are checked by callers, so concatenation cannot fail
        concatenate(
            Axis(0),
            &[features_a.view(), features_b.view(), diff.view(), abs_diff.view()],
        )
        .unwrap_or_else(|_| Array1::zeros(0))
    }

    /// Train on labelled pairs and replace any previous trained state
    pub fn train(&mut self, pairs: &[(UserRecord, UserRecord, f64)]) -> Result<TrainingMetrics> {
        if pairs.is_empty() {
            return Err(EngineError::EmptyData);
        }
        if pairs.len() < 2 {
            return Err(EngineError::InvalidInput(
                "At least 2 labelled pairs are required".to_string(),
            ));
        }
        if let Some((_, _, label)) = pairs.iter().find(|(_, _, l)| !l.is_finite()) {
            return Err(EngineError::InvalidInput(format!(
                "Non-finite label: {}",
                label
            )));
        }

        let width = 4 * FeatureExtractor::dimension();
        let mut design = Array2::zeros((pairs.len(), width));
        let mut labels = Vec::with_capacity(pairs.len());
        for (i, (user_a, user_b, label)) in pairs.iter().enumerate() {
            let features_a = self.extractor.extract(user_a);
            let features_b = self.extractor.extract(user_b);
            design
                .row_mut(i)
                .assign(&Self::pair_vector(features_a.view(), features_b.view()));
            labels.push(*label);
        }

        // Seeded holdout split
        let n = pairs.len();
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        order.shuffle(&mut rng);

        let n_val =
            ((self.params.validation_split * n as f64 - 1e-9).ceil() as usize).clamp(1, n - 1);
        let (val_idx, train_idx) = order.split_at(n_val);

        let x_train_raw = design.select(Axis(0), train_idx);
        let x_val_raw = design.select(Axis(0), val_idx);
        let y_train: Vec<f64> = train_idx.iter().map(|&i| labels[i]).collect();
        let y_val: Vec<f64> = val_idx.iter().map(|&i| labels[i]).collect();

        // Scaler sees the training split only
        let scaler = StandardScaler::fit(&x_train_raw)?;
        let x_train = scaler.transform(&x_train_raw)?;
        let x_val = scaler.transform(&x_val_raw)?;

        debug!(
            model_type = self.model_type.as_str(),
            train = train_idx.len(),
            validation = val_idx.len(),
            "Fitting compatibility estimator"
        );
        let estimator = Estimator::fit(self.model_type, &self.params, &x_train, &y_train);

        let train_pred: Vec<f64> = x_train
            .axis_iter(Axis(0))
            .map(|row| estimator.predict_row(row))
            .collect();
        let val_pred: Vec<f64> = x_val
            .axis_iter(Axis(0))
            .map(|row| estimator.predict_row(row))
            .collect();

        let metrics = TrainingMetrics {
            train_rmse: rmse(&y_train, &train_pred),
            val_rmse: rmse(&y_val, &val_pred),
            train_r2: r2_score(&y_train, &train_pred),
            val_r2: r2_score(&y_val, &val_pred),
            training_samples: y_train.len(),
            validation_samples: y_val.len(),
        };

        info!(
            model_type = self.model_type.as_str(),
            train_rmse = metrics.train_rmse,
            val_rmse = metrics.val_rmse,
            train_r2 = metrics.train_r2,
            val_r2 = metrics.val_r2,
            "Compatibility model trained"
        );

        self.state = Some(TrainedState {
            scaler,
            estimator,
            trained_at: Utc::now(),
            metrics: Some(metrics.clone()),
        });

        Ok(metrics)
    }

    /// Predicted compatibility of two users, clamped to [0, 1]
    pub fn predict_compatibility(&self, user_a: &UserRecord, user_b: &UserRecord) -> Result<f64> {
        let features_a = self.extractor.extract(user_a);
        let features_b = self.extractor.extract(user_b);
        self.predict_features(features_a.view(), features_b.view())
    }

    /// Predict from two raw (unscaled) user feature vectors
    pub fn predict_features(
        &self,
        features_a: ArrayView1<f64>,
        features_b: ArrayView1<f64>,
    ) -> Result<f64> {
        let state = self.state.as_ref().ok_or(EngineError::NotFitted)?;

        let expected = FeatureExtractor::dimension();
        if features_a.len() != expected || features_b.len() != expected {
            return Err(EngineError::InvalidInput(format!(
                "Expected {} features per user, got {} and {}",
                expected,
                features_a.len(),
                features_b.len()
            )));
        }

        let pair = Self::pair_vector(features_a, features_b);
        let scaled = state.scaler.transform_row(pair.view())?;
        let raw = state.estimator.predict_row(scaled.view());

        if !raw.is_finite() {
            return Err(EngineError::Prediction(format!(
                "Estimator produced a non-finite score: {}",
                raw
            )));
        }
        Ok(clamp_unit(raw))
    }

    /// Pair feature names with their importance, most important first
    ///
    /// Empty when the model has not been trained.
    pub fn get_feature_importance(&self) -> Vec<(String, f64)> {
        let state = match &self.state {
            Some(state) => state,
            None => return Vec::new(),
        };

        let mut importance: Vec<(String, f64)> = pair_feature_names()
            .into_iter()
            .zip(state.estimator.feature_importances().iter().copied())
            .collect();
        importance.sort_by(|a, b| by_score_desc(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        importance
    }

    fn artifact(&self) -> Result<ModelArtifact> {
        let state = self.state.as_ref().ok_or(EngineError::NotFitted)?;

        Ok(ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_type: self.model_type,
            feature_names: FeatureExtractor::feature_names(),
            params: self.params.clone(),
            scaler: state.scaler.clone(),
            estimator: state.estimator.clone(),
            trained_at: state.trained_at,
            metrics: state.metrics.clone(),
        })
    }

    /// Write the trained state as one bincode artifact
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let artifact = self.artifact()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(&artifact)?;
        std::fs::write(path, bytes)?;

        info!(
            path = %path.display(),
            model_type = self.model_type.as_str(),
            "Saved compatibility model"
        );
        Ok(())
    }

    /// Read an artifact written by [`save`](Self::save)
    ///
    /// Refuses artifacts whose format version, canonical feature names or
    /// scaler width differ from this build.
    ///
    /// The extractor is not part of the artifact: a loaded model computes
    /// ages against the current date. Pin a date with
    /// [`with_extractor`](Self::with_extractor) after loading.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let artifact: ModelArtifact = bincode::deserialize(&bytes).map_err(|e| {
            EngineError::IncompatibleArtifact(format!("{}: {}", path.display(), e))
        })?;

        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(EngineError::IncompatibleArtifact(format!(
                "format version {} (expected {})",
                artifact.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        let expected_names = FeatureExtractor::feature_names();
        if artifact.feature_names != expected_names {
            return Err(EngineError::IncompatibleArtifact(format!(
                "feature layout mismatch: artifact has {} features, extractor has {}",
                artifact.feature_names.len(),
                expected_names.len()
            )));
        }

        if artifact.scaler.dimension() != 4 * expected_names.len() {
            return Err(EngineError::IncompatibleArtifact(format!(
                "scaler expects {} columns",
                artifact.scaler.dimension()
            )));
        }

        info!(
            path = %path.display(),
            model_type = artifact.model_type.as_str(),
            "Loaded compatibility model"
        );

        Ok(Self {
            model_type: artifact.model_type,
            params: artifact.params,
            extractor: FeatureExtractor::new(),
            state: Some(TrainedState {
                scaler: artifact.scaler,
                estimator: artifact.estimator,
                trained_at: artifact.trained_at,
                metrics: artifact.metrics,
            }),
        })
    }
}

fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    mse.sqrt()
}

/// Coefficient of determination; a constant target scores 1 only when
/// fitted exactly
fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        if ss_res < 1e-12 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::Rng;
    use uuid::Uuid;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    }

    fn small_params() -> ModelParams {
        ModelParams {
            n_estimators: 8,
            ..Default::default()
        }
    }

    /// Label driven by budget closeness so the trees have something to find
    fn pairs(count: usize) -> Vec<(UserRecord, UserRecord, f64)> {
        let mut rng = StdRng::seed_from_u64(7);
        (0..count)
            .map(|_| {
                let mut a = UserRecord::new(Uuid::new_v4());
                let mut b = UserRecord::new(Uuid::new_v4());
                let budget_a: f64 = rng.gen_range(500.0..2500.0);
                let budget_b: f64 = rng.gen_range(500.0..2500.0);
                a.preferences.budget = Some(budget_a);
                b.preferences.budget = Some(budget_b);
                let label = (1.0 - (budget_a - budget_b).abs() / 2000.0).clamp(0.0, 1.0);
                (a, b, label)
            })
            .collect()
    }

    #[test]
    fn test_pair_feature_names() {
        let names = pair_feature_names();
        assert_eq!(names.len(), 4 * FeatureExtractor::dimension());
        assert_eq!(names[0], "user1_age");
        assert_eq!(names[19], "user2_age");
        assert_eq!(names[38], "diff_age");
        assert_eq!(names[75], "absdiff_allows_smoking");
    }

    #[test]
    fn test_untrained_model() {
        let model = CompatibilityModel::new(ModelType::RandomForest);
        let user = UserRecord::new(Uuid::new_v4());

        assert!(!model.is_trained());
        assert!(model.get_feature_importance().is_empty());
        assert!(matches!(
            model.predict_compatibility(&user, &user),
            Err(EngineError::NotFitted)
        ));
    }

    #[test]
    fn test_train_rejects_tiny_input() {
        let mut model = CompatibilityModel::new(ModelType::RandomForest);
        assert!(matches!(model.train(&[]), Err(EngineError::EmptyData)));
        assert!(matches!(
            model.train(&pairs(1)),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_train_and_predict_random_forest() {
        let mut model = CompatibilityModel::with_params(ModelType::RandomForest, small_params())
            .with_extractor(extractor());
        let metrics = model.train(&pairs(60)).unwrap();

        assert_eq!(metrics.validation_samples, 12);
        assert_eq!(metrics.training_samples, 48);
        assert!(metrics.train_rmse < 0.2);

        let mut a = UserRecord::new(Uuid::new_v4());
        let mut b = UserRecord::new(Uuid::new_v4());
        a.preferences.budget = Some(1000.0);
        b.preferences.budget = Some(1020.0);
        let score = model.predict_compatibility(&a, &b).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_prediction_clamped_on_extremes() {
        let mut model =
            CompatibilityModel::with_params(ModelType::GradientBoosting, small_params());
        model.train(&pairs(30)).unwrap();

        let huge = Array1::from_elem(FeatureExtractor::dimension(), 1e9);
        let tiny = Array1::from_elem(FeatureExtractor::dimension(), -1e9);
        for (a, b) in [(&huge, &tiny), (&tiny, &huge), (&huge, &huge)] {
            let score = model.predict_features(a.view(), b.view()).unwrap();
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_predict_features_rejects_wrong_length() {
        let mut model = CompatibilityModel::with_params(ModelType::RandomForest, small_params());
        model.train(&pairs(10)).unwrap();

        let short = Array1::zeros(3);
        let full = Array1::zeros(FeatureExtractor::dimension());
        assert!(matches!(
            model.predict_features(short.view(), full.view()),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_feature_importance_sorted() {
        let mut model = CompatibilityModel::with_params(ModelType::RandomForest, small_params());
        model.train(&pairs(40)).unwrap();

        let importance = model.get_feature_importance();
        assert_eq!(importance.len(), 76);
        assert!(importance.windows(2).all(|w| w[0].1 >= w[1].1));
        // Only budget columns vary, so one of them leads
        assert!(importance[0].0.contains("budget_normalized"));
    }

    #[test]
    fn test_save_untrained_fails() {
        let model = CompatibilityModel::new(ModelType::RandomForest);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            model.save(dir.path().join("model.bin")),
            Err(EngineError::NotFitted)
        ));
    }

    #[test]
    fn test_load_garbage_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"not a model").unwrap();

        assert!(matches!(
            CompatibilityModel::load(&path),
            Err(EngineError::IncompatibleArtifact(_))
        ));
    }

    fn trained_artifact() -> ModelArtifact {
        let mut model = CompatibilityModel::with_params(ModelType::RandomForest, small_params());
        model.train(&pairs(20)).unwrap();
        model.artifact().unwrap()
    }

    fn load_artifact(artifact: &ModelArtifact) -> Result<CompatibilityModel> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, bincode::serialize(artifact).unwrap()).unwrap();
        CompatibilityModel::load(&path)
    }

    #[test]
    fn test_load_accepts_current_artifact() {
        let loaded = load_artifact(&trained_artifact()).unwrap();
        assert!(loaded.is_trained());
        assert_eq!(loaded.model_type(), ModelType::RandomForest);
    }

    #[test]
    fn test_load_rejects_other_format_version() {
        let mut artifact = trained_artifact();
        artifact.format_version = ARTIFACT_FORMAT_VERSION + 1;
        assert!(matches!(
            load_artifact(&artifact),
            Err(EngineError::IncompatibleArtifact(_))
        ));
    }

    #[test]
    fn test_load_rejects_feature_layout_change() {
        let mut artifact = trained_artifact();
        artifact.feature_names.pop();
        assert!(matches!(
            load_artifact(&artifact),
            Err(EngineError::IncompatibleArtifact(_))
        ));

        let mut renamed = trained_artifact();
        renamed.feature_names[0] = "age_years".to_string();
        assert!(matches!(
            load_artifact(&renamed),
            Err(EngineError::IncompatibleArtifact(_))
        ));
    }

    #[test]
    fn test_load_rejects_scaler_width_mismatch() {
        let mut artifact = trained_artifact();
        artifact.scaler = StandardScaler::fit(&Array2::zeros((2, 3))).unwrap();
        assert!(matches!(
            load_artifact(&artifact),
            Err(EngineError::IncompatibleArtifact(_))
        ));
    }

    #[test]
    fn test_loaded_model_uses_current_date_until_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut model = CompatibilityModel::with_params(ModelType::RandomForest, small_params())
            .with_extractor(extractor());
        model.train(&pairs(20)).unwrap();
        model.save(&path).unwrap();

        let loaded = CompatibilityModel::load(&path).unwrap();
        assert_eq!(loaded.extractor.reference_date(), Utc::now().date_naive());

        let pinned = loaded.with_extractor(extractor());
        assert_eq!(pinned.extractor.reference_date(), extractor().reference_date());
    }

    #[test]
    fn test_r2_constant_target() {
        assert_eq!(r2_score(&[0.5, 0.5], &[0.5, 0.5]), 1.0);
        assert_eq!(r2_score(&[0.5, 0.5], &[0.4, 0.6]), 0.0);
        assert!((r2_score(&[0.0, 1.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
    }
}
