pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod utils;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use jobs::{TrainingJob, TrainingJobConfig, TrainingOutcome};
pub use services::{
    BehaviorAggregator, CollaborativeFilter, CompatibilityModel, ContentFilter, FeatureExtractor,
    MatchingOrchestrator, ModelHandle, ModelManager, RecommendationMethod, RuleBasedScorer,
};
