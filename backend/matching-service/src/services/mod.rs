pub mod behavior;
pub mod collaborative;
pub mod compatibility;
pub mod content;
pub mod diversity;
pub mod features;
pub mod matching;
pub mod scoring;
pub mod training_data;

pub use behavior::{BehaviorAggregator, BehaviorConfig};
pub use collaborative::{CollaborativeConfig, CollaborativeFilter, RecommendationMethod};
pub use compatibility::{CompatibilityModel, ModelHandle, ModelManager, ModelParams, ModelType};
pub use content::{ContentConfig, ContentFilter};
pub use diversity::DiversityFilter;
pub use features::FeatureExtractor;
pub use matching::{MatchingConfig, MatchingOrchestrator, PromotionPolicy};
pub use scoring::RuleBasedScorer;
