//! Rule-Based Compatibility Scorer
//!
//! Deterministic weighted sum over a fixed set of comparable axes.
//! Each axis contributes `axis_score * weight`; the total is normalised by
//! the weight of the axes that actually applied, so an axis with missing
//! data on either side is skipped rather than counted as a mismatch.
use crate::models::UserRecord;
use crate::utils::clamp_unit;

#[derive(Debug, Clone, Copy)]
pub struct RuleWeights {
    pub budget: f64,
    pub cleanliness: f64,
    pub verification: f64,
    pub profile_completion: f64,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            budget: 30.0,
            cleanliness: 20.0,
            verification: 15.0,
            profile_completion: 10.0,
        }
    }
}

/// Budget gap at which the budget axis reaches zero
const BUDGET_SPAN: f64 = 1000.0;
/// Width of the 1-5 cleanliness scale
const CLEANLINESS_SPAN: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer {
    weights: RuleWeights,
}

impl RuleBasedScorer {
    pub fn new(weights: RuleWeights) -> Self {
        Self { weights }
    }

    /// Compatibility of two users in [0, 1]; O(1) per pair
    pub fn score(&self, user_a: &UserRecord, user_b: &UserRecord) -> f64 {
        let axes = [
            (budget_axis(user_a, user_b), self.weights.budget),
            (cleanliness_axis(user_a, user_b), self.weights.cleanliness),
            (Some(verification_axis(user_a, user_b)), self.weights.verification),
            (
                Some(profile_completion_axis(user_a, user_b)),
                self.weights.profile_completion,
            ),
        ];

        let mut score = 0.0;
        let mut total_weight = 0.0;
        for (axis_score, weight) in axes {
            if let Some(axis_score) = axis_score {
                score += axis_score * weight;
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            clamp_unit(score / total_weight)
        } else {
            0.0
        }
    }
}

fn budget_axis(user_a: &UserRecord, user_b: &UserRecord) -> Option<f64> {
    let budget_a = positive(user_a.preferences.budget)?;
    let budget_b = positive(user_b.preferences.budget)?;
    Some((1.0 - (budget_a - budget_b).abs() / BUDGET_SPAN).max(0.0))
}

fn cleanliness_axis(user_a: &UserRecord, user_b: &UserRecord) -> Option<f64> {
    let clean_a = f64::from(user_a.lifestyle.cleanliness.filter(|c| *c > 0)?);
    let clean_b = f64::from(user_b.lifestyle.cleanliness.filter(|c| *c > 0)?);
    Some((1.0 - (clean_a - clean_b).abs() / CLEANLINESS_SPAN).max(0.0))
}

/// Identity checks count 0.5 per side, background checks 0.25, capped at 1
fn verification_axis(user_a: &UserRecord, user_b: &UserRecord) -> f64 {
    let side = |user: &UserRecord| {
        let mut value: f64 = 0.0;
        if user.verification.identity {
            value += 0.5;
        }
        if user.verification.background_check {
            value += 0.25;
        }
        value
    };
    (side(user_a) + side(user_b)).min(1.0)
}

fn profile_completion_axis(user_a: &UserRecord, user_b: &UserRecord) -> f64 {
    clamp_unit((user_a.profile_completion + user_b.profile_completion) / 200.0)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(budget: Option<f64>, cleanliness: Option<u8>, identity: bool) -> UserRecord {
        let mut user = UserRecord::new(Uuid::new_v4());
        user.preferences.budget = budget;
        user.lifestyle.cleanliness = cleanliness;
        user.verification.identity = identity;
        user
    }

    #[test]
    fn test_close_verified_pair_scores_high() {
        let scorer = RuleBasedScorer::default();
        let a = user(Some(1200.0), Some(4), true);
        let b = user(Some(1250.0), Some(4), true);

        // (0.95 * 30 + 1.0 * 20 + 1.0 * 15 + 0 * 10) / 75
        let score = scorer.score(&a, &b);
        assert!((score - 63.5 / 75.0).abs() < 1e-9);
        assert!(score > 0.7);
    }

    #[test]
    fn test_symmetry() {
        let scorer = RuleBasedScorer::default();
        let mut a = user(Some(800.0), Some(2), false);
        let mut b = user(Some(1500.0), Some(5), true);
        a.profile_completion = 40.0;
        b.profile_completion = 90.0;
        b.verification.background_check = true;

        assert_eq!(scorer.score(&a, &b), scorer.score(&b, &a));
    }

    #[test]
    fn test_missing_axes_are_skipped() {
        let scorer = RuleBasedScorer::default();
        let a = user(None, None, true);
        let b = user(Some(1000.0), None, true);

        // Only verification (1.0 * 15) and completion (0 * 10) apply
        assert!((scorer.score(&a, &b) - 15.0 / 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_verification_axis_is_capped() {
        let scorer = RuleBasedScorer::default();
        let mut a = user(None, None, true);
        let mut b = user(None, None, true);
        a.verification.background_check = true;
        b.verification.background_check = true;
        a.profile_completion = 100.0;
        b.profile_completion = 100.0;

        assert!((scorer.score(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_budget_gap_zeroes_axis() {
        let scorer = RuleBasedScorer::default();
        let a = user(Some(500.0), Some(3), false);
        let b = user(Some(2500.0), Some(3), false);

        // budget 0, cleanliness 1, verification 0, completion 0
        assert!((scorer.score(&a, &b) - 20.0 / 75.0).abs() < 1e-9);
    }
}
