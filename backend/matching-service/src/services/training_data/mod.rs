// Labelled (user, user, compatibility) pairs for the regression model:
// real ones derived from match outcomes, and synthetic ones to bootstrap a
// first model before enough outcomes exist.

use crate::models::{
    AccountType, ConversationRecord, Lifestyle, MatchRecord, MatchStatus, Preferences, UserRecord,
    Verification, WorkSchedule,
};
use crate::services::features::{DEFAULT_BUDGET, DEFAULT_CLEANLINESS, DEFAULT_SOCIAL_LEVEL};
use crate::utils::clamp_unit;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

pub type TrainingPair = (UserRecord, UserRecord, f64);

/// Label for a mutual match before the conversation bonus
const MUTUAL_BASE: f64 = 0.8;
/// Subtracted from the predicted score of a declined match
const DECLINE_PENALTY: f64 = 0.3;

const SOCIAL_HABITS: [&str; 3] = ["quiet", "social", "party-friendly"];
const WORK_SCHEDULES: [WorkSchedule; 4] = [
    WorkSchedule::NineToFive,
    WorkSchedule::Remote,
    WorkSchedule::Flexible,
    WorkSchedule::Night,
];

/// Build training pairs from settled matches
///
/// Mutual matches are labelled `0.8 + conversation_score`, declined ones
/// keep their predicted score minus 0.3. Pending and expired matches carry
/// no outcome and are skipped, as are matches whose users are missing.
pub fn training_pairs(
    matches: &[MatchRecord],
    users: &[UserRecord],
    conversations: &[ConversationRecord],
) -> Vec<TrainingPair> {
    let by_id: HashMap<Uuid, &UserRecord> = users.iter().map(|u| (u.id, u)).collect();

    let pairs: Vec<TrainingPair> = matches
        .iter()
        .filter_map(|m| {
            let label = match m.status {
                MatchStatus::Mutual => {
                    let conversation = conversations
                        .iter()
                        .find(|c| c.is_between(m.user_id, m.target_id));
                    (MUTUAL_BASE + conversation.map_or(0.0, conversation_score)).min(1.0)
                }
                MatchStatus::Declined => (m.compatibility_score - DECLINE_PENALTY).max(0.0),
                MatchStatus::Pending | MatchStatus::Expired => return None,
            };

            let user = by_id.get(&m.user_id)?;
            let target = by_id.get(&m.target_id)?;
            Some(((*user).clone(), (*target).clone(), label))
        })
        .collect();

    debug!(matches = matches.len(), pairs = pairs.len(), "Training pairs built");
    pairs
}

/// Engagement bonus for a conversation, at most 0.4
pub fn conversation_score(conversation: &ConversationRecord) -> f64 {
    let messages = &conversation.messages;
    if messages.is_empty() {
        return 0.0;
    }

    let activity = (messages.len() as f64 * 0.02).min(0.2);

    let senders: HashSet<Uuid> = messages.iter().map(|m| m.sender_id).collect();
    let participation = if senders.len() == 2 { 0.1 } else { 0.0 };

    let sustained = if messages.len() > 5 {
        let first = messages.iter().map(|m| m.created_at).min();
        let last = messages.iter().map(|m| m.created_at).max();
        match (first, last) {
            (Some(first), Some(last)) => {
                let days = (last - first).num_days();
                if days > 1 {
                    (days as f64 * 0.02).min(0.1)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    } else {
        0.0
    };

    activity + participation + sustained
}

/// Random pairs labelled by a hand-written similarity plus ±0.1 noise
pub fn synthetic_pairs<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<TrainingPair> {
    (0..count)
        .map(|_| {
            let user_a = synthetic_user(rng);
            let user_b = synthetic_user(rng);
            let label = synthetic_compatibility(&user_a, &user_b, rng);
            (user_a, user_b, label)
        })
        .collect()
}

pub fn synthetic_user<R: Rng + ?Sized>(rng: &mut R) -> UserRecord {
    let now = Utc::now();
    let age: i64 = rng.gen_range(18..=45);

    let habit_count = rng.gen_range(1..=2);
    let social_habits = SOCIAL_HABITS
        .choose_multiple(rng, habit_count)
        .map(|h| h.to_string())
        .collect();

    UserRecord {
        id: Uuid::from_u128(rng.gen()),
        date_of_birth: Some((now - Duration::days(age * 365)).date_naive()),
        account_type: if rng.gen_bool(0.5) {
            AccountType::Seeker
        } else {
            AccountType::Provider
        },
        verification: Verification {
            email: rng.gen_bool(0.5),
            phone: rng.gen_bool(0.5),
            identity: rng.gen_bool(0.5),
            background_check: rng.gen_bool(0.5),
        },
        preferences: Preferences {
            budget: Some(f64::from(rng.gen_range(500u32..=3000))),
            location_importance: Some(rng.gen_range(0.3..1.0)),
            cleanliness_importance: Some(f64::from(rng.gen_range(1u8..=5))),
            social_level: Some(f64::from(rng.gen_range(1u8..=5))),
        },
        lifestyle: Lifestyle {
            cleanliness: Some(rng.gen_range(1..=5)),
            has_pets: Some(rng.gen_bool(0.5)),
            allows_pets: Some(rng.gen_bool(0.5)),
            is_smoker: Some(rng.gen_bool(0.5)),
            allows_smoking: Some(rng.gen_bool(0.5)),
            work_schedule: WORK_SCHEDULES.choose(rng).copied(),
            social_habits,
        },
        profile_completion: f64::from(rng.gen_range(20u8..=100)),
        bio: None,
        interests: Vec::new(),
        created_at: now - Duration::days(rng.gen_range(1..=365)),
    }
}

fn synthetic_compatibility<R: Rng + ?Sized>(
    user_a: &UserRecord,
    user_b: &UserRecord,
    rng: &mut R,
) -> f64 {
    let mut score = 0.5;

    let budget_a = user_a.preferences.budget.unwrap_or(DEFAULT_BUDGET);
    let budget_b = user_b.preferences.budget.unwrap_or(DEFAULT_BUDGET);
    score += (1.0 - (budget_a - budget_b).abs() / budget_a.max(budget_b)) * 0.2;

    let clean_a = f64::from(user_a.lifestyle.cleanliness.unwrap_or(DEFAULT_CLEANLINESS));
    let clean_b = f64::from(user_b.lifestyle.cleanliness.unwrap_or(DEFAULT_CLEANLINESS));
    score += (1.0 - (clean_a - clean_b).abs() / 4.0) * 0.15;

    let social_a = user_a.preferences.social_level.unwrap_or(DEFAULT_SOCIAL_LEVEL);
    let social_b = user_b.preferences.social_level.unwrap_or(DEFAULT_SOCIAL_LEVEL);
    score += (1.0 - (social_a - social_b).abs() / 4.0) * 0.15;

    if user_a.verification.identity && user_b.verification.identity {
        score += 0.1;
    }

    score += (user_a.profile_completion + user_b.profile_completion) / 200.0 * 0.1;
    score += rng.gen_range(-0.1..0.1);

    clamp_unit(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRecord;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn user(n: u128) -> UserRecord {
        UserRecord::new(Uuid::from_u128(n))
    }

    fn settled(user: u128, target: u128, status: MatchStatus, score: f64) -> MatchRecord {
        MatchRecord {
            user_id: Uuid::from_u128(user),
            target_id: Uuid::from_u128(target),
            status,
            user_action: None,
            compatibility_score: score,
            created_at: Utc::now(),
        }
    }

    fn chat(a: u128, b: u128, senders: &[u128], day_step: i64) -> ConversationRecord {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        ConversationRecord {
            id: Uuid::from_u128(999),
            participants: vec![Uuid::from_u128(a), Uuid::from_u128(b)],
            messages: senders
                .iter()
                .enumerate()
                .map(|(i, &s)| MessageRecord {
                    sender_id: Uuid::from_u128(s),
                    content: "hello".into(),
                    created_at: start + Duration::days(i as i64 * day_step),
                })
                .collect(),
            created_at: start,
        }
    }

    #[test]
    fn test_conversation_score_parts() {
        // 2 messages, both senders, no sustained bonus
        assert!((conversation_score(&chat(1, 2, &[1, 2], 1)) - 0.14).abs() < 1e-9);

        // 6 messages over 5 days: 0.12 + 0.1 + 0.1
        let long = chat(1, 2, &[1, 2, 1, 2, 1, 2], 1);
        assert!((conversation_score(&long) - 0.32).abs() < 1e-9);

        // One-sided chat gets no participation bonus
        assert!((conversation_score(&chat(1, 2, &[1, 1], 0)) - 0.04).abs() < 1e-9);
        assert_eq!(conversation_score(&chat(1, 2, &[], 0)), 0.0);
    }

    #[test]
    fn test_training_pair_labels() {
        let users = vec![user(1), user(2), user(3)];
        let matches = vec![
            settled(1, 2, MatchStatus::Mutual, 0.9),
            settled(1, 3, MatchStatus::Declined, 0.5),
            settled(2, 3, MatchStatus::Declined, 0.2),
            settled(2, 1, MatchStatus::Pending, 0.9),
            settled(3, 1, MatchStatus::Expired, 0.9),
        ];
        let conversations = vec![chat(1, 2, &[1, 2, 1, 2, 1, 2], 1)];

        let pairs = training_pairs(&matches, &users, &conversations);
        assert_eq!(pairs.len(), 3);

        assert_eq!(pairs[0].0.id, Uuid::from_u128(1));
        assert_eq!(pairs[0].1.id, Uuid::from_u128(2));
        assert!((pairs[0].2 - 1.0).abs() < 1e-9);
        assert!((pairs[1].2 - 0.2).abs() < 1e-9);
        assert_eq!(pairs[2].2, 0.0);
    }

    #[test]
    fn test_mutual_without_conversation() {
        let users = vec![user(1), user(2)];
        let pairs = training_pairs(&[settled(1, 2, MatchStatus::Mutual, 0.5)], &users, &[]);
        assert_eq!(pairs[0].2, 0.8);
    }

    #[test]
    fn test_missing_users_skipped() {
        let users = vec![user(1)];
        let pairs = training_pairs(&[settled(1, 2, MatchStatus::Mutual, 0.5)], &users, &[]);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_synthetic_pairs_are_bounded_and_seeded() {
        let mut rng = StdRng::seed_from_u64(42);
        let pairs = synthetic_pairs(50, &mut rng);
        assert_eq!(pairs.len(), 50);
        for (a, b, label) in &pairs {
            assert!((0.0..=1.0).contains(label));
            assert!((500.0..=3000.0).contains(&a.preferences.budget.unwrap()));
            assert!(!b.lifestyle.social_habits.is_empty());
        }

        let mut again = StdRng::seed_from_u64(42);
        let repeat = synthetic_pairs(50, &mut again);
        let labels: Vec<f64> = pairs.iter().map(|p| p.2).collect();
        let repeat_labels: Vec<f64> = repeat.iter().map(|p| p.2).collect();
        assert_eq!(labels, repeat_labels);
    }
}
