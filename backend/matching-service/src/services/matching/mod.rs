// ============================================
// Matching Orchestrator
// ============================================
//
// Top-level entry point for roommate matching.
//
// Pipeline per candidate:
//   1. Hard pre-filter (budget gap, smoking, pets)
//   2. Compatibility: rule-based, or ML blended with rules when enabled
//   3. Dynamic acceptance threshold from verification and completeness
//   4. Up to 3 human-readable reasons
//
// Survivors are sorted by score; long lists go through the diversity pass.
//
// A model fault never fails ranking: any ML error falls back to the rule
// scorer and is logged.

use crate::error::{EngineError, Result};
use crate::models::{MatchResult, UserRecord, WorkSchedule};
use crate::services::compatibility::{ModelHandle, TrainingMetrics};
use crate::services::diversity::DiversityFilter;
use crate::services::features::DEFAULT_CLEANLINESS;
use crate::services::scoring::RuleBasedScorer;
use crate::utils::{by_score_desc, clamp_unit};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub use_ml: bool,
    /// Share of the ML score in the blended score; rules get the rest
    pub ml_weight: f64,
    pub base_threshold: f64,
    pub min_threshold: f64,
    /// Pairs whose budget gap exceeds this share of the larger budget are dropped
    pub max_budget_gap: f64,
    pub max_reasons: usize,
    pub diversity: DiversityFilter,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            use_ml: false,
            ml_weight: 0.7,
            base_threshold: 0.5,
            min_threshold: 0.3,
            max_budget_gap: 0.5,
            max_reasons: 3,
            diversity: DiversityFilter::default(),
        }
    }
}

/// Decides whether a freshly trained model may become the active one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionPolicy {
    pub min_validation_r2: f64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_validation_r2: 0.5,
        }
    }
}

impl PromotionPolicy {
    pub fn accepts(&self, metrics: &TrainingMetrics) -> bool {
        metrics.val_r2.is_finite() && metrics.val_r2 > self.min_validation_r2
    }
}

pub struct MatchingOrchestrator {
    config: MatchingConfig,
    scorer: RuleBasedScorer,
    models: Option<ModelHandle>,
}

impl MatchingOrchestrator {
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            config,
            scorer: RuleBasedScorer::default(),
            models: None,
        }
    }

    /// Attach the shared model registry used when ML mode is on
    pub fn with_models(mut self, models: ModelHandle) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_scorer(mut self, scorer: RuleBasedScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn enable_ml(&mut self) {
        self.config.use_ml = true;
    }

    pub fn disable_ml(&mut self) {
        self.config.use_ml = false;
    }

    /// Ranked matches for `user` among `candidates`
    pub fn find_matches(&self, user: &UserRecord, candidates: &[UserRecord]) -> Vec<MatchResult> {
        let mut accepted: Vec<(MatchResult, &UserRecord)> = Vec::new();

        for candidate in candidates {
            if candidate.id == user.id || !self.passes_filters(user, candidate) {
                continue;
            }

            let score = self.compatibility(user, candidate);
            let threshold = self.dynamic_threshold(user, candidate);
            if score <= threshold {
                continue;
            }

            accepted.push((
                MatchResult {
                    candidate_id: candidate.id,
                    score,
                    reasons: self.match_reasons(user, candidate, score),
                },
                candidate,
            ));
        }

        accepted.sort_by(|a, b| by_score_desc(a.0.score, b.0.score));
        let survivors = accepted.len();

        let ranked = self
            .config
            .diversity
            .apply(accepted, |(_, candidate), (_, admitted)| too_similar(candidate, admitted));

        info!(
            user_id = %user.id,
            candidates = candidates.len(),
            survivors,
            returned = ranked.len(),
            "Matches ranked"
        );

        ranked.into_iter().map(|(result, _)| result).collect()
    }

    /// Hard constraints checked before any scoring
    pub fn passes_filters(&self, user_a: &UserRecord, user_b: &UserRecord) -> bool {
        if let (Some(a), Some(b)) = (user_a.preferences.budget, user_b.preferences.budget) {
            if a > 0.0 && b > 0.0 && (a - b).abs() / a.max(b) > self.config.max_budget_gap {
                return false;
            }
        }

        !deal_breaker(user_a, user_b) && !deal_breaker(user_b, user_a)
    }

    /// Rule score, or the ML/rule blend when ML mode is on and a model is active
    pub fn compatibility(&self, user_a: &UserRecord, user_b: &UserRecord) -> f64 {
        let rule_score = self.scorer.score(user_a, user_b);
        if !self.config.use_ml {
            return rule_score;
        }

        let models = match &self.models {
            Some(models) => models,
            None => return rule_score,
        };

        match ml_score(models, user_a, user_b) {
            Ok(Some(ml)) => {
                let w = self.config.ml_weight;
                clamp_unit(w * ml + (1.0 - w) * rule_score)
            }
            Ok(None) => rule_score,
            Err(e) => {
                warn!(
                    error = %e,
                    user_id = %user_a.id,
                    candidate_id = %user_b.id,
                    "ML prediction failed, falling back to rules"
                );
                rule_score
            }
        }
    }

    /// Acceptance threshold for one pair, never below `min_threshold`
    pub fn dynamic_threshold(&self, user_a: &UserRecord, user_b: &UserRecord) -> f64 {
        let both_identity = user_a.verification.identity && user_b.verification.identity;
        let both_background =
            user_a.verification.background_check && user_b.verification.background_check;
        let verification_discount = if both_identity || both_background { 0.1 } else { 0.0 };

        let avg_completion = (user_a.profile_completion + user_b.profile_completion) / 2.0;
        let completion_discount = if avg_completion > 80.0 {
            0.1
        } else if avg_completion > 60.0 {
            0.05
        } else {
            0.0
        };

        (self.config.base_threshold - verification_discount - completion_discount)
            .max(self.config.min_threshold)
    }

    pub fn match_reasons(
        &self,
        user_a: &UserRecord,
        user_b: &UserRecord,
        score: f64,
    ) -> Vec<String> {
        let mut reasons = Vec::new();

        if let (Some(a), Some(b)) = (user_a.preferences.budget, user_b.preferences.budget) {
            if a > 0.0 && b > 0.0 && (a - b).abs() / a.max(b) < 0.2 {
                reasons.push("Similar budget preferences");
            }
        }

        let cleanliness = (user_a.lifestyle.cleanliness, user_b.lifestyle.cleanliness);
        if let (Some(a), Some(b)) = cleanliness {
            if a > 0 && b > 0 && a.abs_diff(b) <= 1 {
                if a >= 4 && b >= 4 {
                    reasons.push("Both value cleanliness");
                } else {
                    reasons.push("Compatible cleanliness standards");
                }
            }
        }

        if user_a.verification.identity && user_b.verification.identity {
            reasons.push("Both identity verified");
        }
        if user_a.verification.background_check && user_b.verification.background_check {
            reasons.push("Both background checked");
        }

        let social = (user_a.preferences.social_level, user_b.preferences.social_level);
        if let (Some(a), Some(b)) = social {
            if a > 0.0 && b > 0.0 && (a - b).abs() <= 1.0 {
                if a <= 2.0 && b <= 2.0 {
                    reasons.push("Both prefer quiet lifestyle");
                } else if a >= 4.0 && b >= 4.0 {
                    reasons.push("Both enjoy social activities");
                } else {
                    reasons.push("Compatible social preferences");
                }
            }
        }

        if score > 0.8 {
            reasons.push("Excellent overall compatibility");
        } else if score > 0.7 {
            reasons.push("Strong compatibility match");
        }

        reasons
            .into_iter()
            .take(self.config.max_reasons)
            .map(String::from)
            .collect()
    }
}

/// `smoker` smokes or has pets where `host` does not allow it
fn deal_breaker(smoker: &UserRecord, host: &UserRecord) -> bool {
    let smoking = smoker.lifestyle.is_smoker.unwrap_or(false)
        && !host.lifestyle.allows_smoking.unwrap_or(true);
    let pets =
        smoker.lifestyle.has_pets.unwrap_or(false) && !host.lifestyle.allows_pets.unwrap_or(true);
    smoking || pets
}

/// Same account type, near cleanliness and the same work schedule
fn too_similar(candidate: &UserRecord, admitted: &UserRecord) -> bool {
    let clean = |u: &UserRecord| u.lifestyle.cleanliness.unwrap_or(DEFAULT_CLEANLINESS);
    let schedule = |u: &UserRecord| u.lifestyle.work_schedule.unwrap_or(WorkSchedule::Flexible);

    candidate.account_type == admitted.account_type
        && clean(candidate).abs_diff(clean(admitted)) <= 1
        && schedule(candidate) == schedule(admitted)
}

/// `Ok(None)` when no model is active; errors are model faults
fn ml_score(models: &ModelHandle, user_a: &UserRecord, user_b: &UserRecord) -> Result<Option<f64>> {
    let manager = models
        .read()
        .map_err(|_| EngineError::Prediction("model registry lock poisoned".to_string()))?;

    if manager.active_name().is_none() {
        debug!("ML mode on but no active model, using rules");
        return Ok(None);
    }

    let score = manager.predict(user_a, user_b)?;
    if !score.is_finite() {
        return Err(EngineError::Prediction(format!("non-finite score {}", score)));
    }
    Ok(Some(score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountType;
    use crate::services::compatibility::{ModelManager, ModelType};
    use uuid::Uuid;

    fn user(budget: f64, cleanliness: u8) -> UserRecord {
        let mut user = UserRecord::new(Uuid::new_v4());
        user.preferences.budget = Some(budget);
        user.lifestyle.cleanliness = Some(cleanliness);
        user
    }

    #[test]
    fn test_budget_gap_filter() {
        let orchestrator = MatchingOrchestrator::new(MatchingConfig::default());
        assert!(orchestrator.passes_filters(&user(1000.0, 3), &user(1800.0, 3)));
        assert!(!orchestrator.passes_filters(&user(1000.0, 3), &user(2500.0, 3)));
    }

    #[test]
    fn test_deal_breakers_both_directions() {
        let orchestrator = MatchingOrchestrator::new(MatchingConfig::default());
        let mut smoker = user(1000.0, 3);
        smoker.lifestyle.is_smoker = Some(true);
        let mut strict = user(1000.0, 3);
        strict.lifestyle.allows_smoking = Some(false);

        assert!(!orchestrator.passes_filters(&smoker, &strict));
        assert!(!orchestrator.passes_filters(&strict, &smoker));

        let mut pet_owner = user(1000.0, 3);
        pet_owner.lifestyle.has_pets = Some(true);
        let relaxed = user(1000.0, 3);
        assert!(orchestrator.passes_filters(&pet_owner, &relaxed));

        strict.lifestyle.allows_pets = Some(false);
        assert!(!orchestrator.passes_filters(&pet_owner, &strict));
    }

    #[test]
    fn test_dynamic_threshold() {
        let orchestrator = MatchingOrchestrator::new(MatchingConfig::default());
        let mut a = user(1000.0, 3);
        let mut b = user(1000.0, 3);
        assert!((orchestrator.dynamic_threshold(&a, &b) - 0.5).abs() < 1e-12);

        a.verification.identity = true;
        b.verification.identity = true;
        a.verification.background_check = true;
        b.verification.background_check = true;
        assert!((orchestrator.dynamic_threshold(&a, &b) - 0.4).abs() < 1e-12);

        a.profile_completion = 90.0;
        b.profile_completion = 90.0;
        assert!((orchestrator.dynamic_threshold(&a, &b) - 0.3).abs() < 1e-12);

        a.profile_completion = 70.0;
        b.profile_completion = 60.0;
        assert!((orchestrator.dynamic_threshold(&a, &b) - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_match_reasons_capped() {
        let orchestrator = MatchingOrchestrator::new(MatchingConfig::default());
        let mut a = user(1200.0, 4);
        let mut b = user(1250.0, 5);
        a.verification.identity = true;
        b.verification.identity = true;
        a.verification.background_check = true;
        b.verification.background_check = true;

        let reasons = orchestrator.match_reasons(&a, &b, 0.9);
        assert_eq!(
            reasons,
            vec![
                "Similar budget preferences",
                "Both value cleanliness",
                "Both identity verified"
            ]
        );
    }

    #[test]
    fn test_find_matches_skips_self_and_sorts() {
        let orchestrator = MatchingOrchestrator::new(MatchingConfig::default());
        let mut me = user(1200.0, 4);
        me.verification.identity = true;

        let mut close = user(1210.0, 4);
        close.verification.identity = true;
        let mut near = user(1400.0, 4);
        near.verification.identity = true;
        let far = user(1500.0, 1);

        let candidates = [me.clone(), far, near.clone(), close.clone()];
        let matches = orchestrator.find_matches(&me, &candidates);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].candidate_id, close.id);
        assert_eq!(matches[1].candidate_id, near.id);
        assert!(matches[0].reasons.len() <= 3);
    }

    #[test]
    fn test_untrained_active_model_falls_back() {
        let mut manager = ModelManager::new();
        manager.create("default", ModelType::RandomForest);
        manager.set_active("default").unwrap();

        let config = MatchingConfig {
            use_ml: true,
            ..Default::default()
        };
        let orchestrator = MatchingOrchestrator::new(config).with_models(manager.into_handle());

        let a = user(1200.0, 4);
        let b = user(1250.0, 4);
        let rules = RuleBasedScorer::default().score(&a, &b);
        assert_eq!(orchestrator.compatibility(&a, &b), rules);
    }

    #[test]
    fn test_too_similar_predicate() {
        let a = user(1000.0, 3);
        let mut b = user(1000.0, 4);
        assert!(too_similar(&a, &b));

        b.account_type = AccountType::Provider;
        assert!(!too_similar(&a, &b));

        b.account_type = AccountType::Seeker;
        b.lifestyle.work_schedule = Some(WorkSchedule::Night);
        assert!(!too_similar(&a, &b));
    }

    #[test]
    fn test_promotion_policy() {
        let policy = PromotionPolicy::default();
        let mut metrics = TrainingMetrics {
            train_rmse: 0.1,
            val_rmse: 0.1,
            train_r2: 0.9,
            val_r2: 0.6,
            training_samples: 80,
            validation_samples: 20,
        };
        assert!(policy.accepts(&metrics));

        metrics.val_r2 = 0.5;
        assert!(!policy.accepts(&metrics));
        metrics.val_r2 = f64::NAN;
        assert!(!policy.accepts(&metrics));
    }
}
