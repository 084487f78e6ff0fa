// ============================================
// Behavior Aggregator
// ============================================
//
// Turns stored activity into implicit ratings for the collaborative filter:
// 1. Match outcomes (status plus a conversation boost)
// 2. Two-party conversation engagement, one row per participant
// 3. Single actions (view, like, accept, ...) for incremental updates

use crate::error::Result;
use crate::models::{
    ActionKind, ConversationRecord, ImplicitRating, InteractionRecord, MatchRecord, MatchStatus,
    MessageRecord, Recommendation,
};
use crate::services::collaborative::{CollaborativeFilter, RecommendationMethod};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Fewer rating rows than this and `refresh` leaves the filter alone
    pub min_interactions: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self { min_interactions: 10 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BehaviorAggregator {
    config: BehaviorConfig,
}

impl BehaviorAggregator {
    pub fn new(config: BehaviorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    /// Rating carried by a match, boosted when the pair has been talking
    pub fn match_rating(&self, record: &MatchRecord, conversations: &[ConversationRecord]) -> f64 {
        let base = match record.status {
            MatchStatus::Mutual => 1.0,
            MatchStatus::Pending if record.user_action.as_deref() == Some("accepted") => 0.7,
            MatchStatus::Declined => 0.1,
            _ => 0.3,
        };

        let boost = conversations
            .iter()
            .find(|c| c.is_between(record.user_id, record.target_id))
            .filter(|c| !c.messages.is_empty())
            .map(|c| (c.messages.len() as f64 * 0.05).min(0.3))
            .unwrap_or(0.0);

        (base + boost).min(1.0)
    }

    /// One directed rating per participant of a two-party conversation
    ///
    /// Participation share, message length and conversation span all add
    /// to the rating. Rows with a zero rating are not emitted.
    pub fn conversation_ratings(&self, conversation: &ConversationRecord) -> Vec<ImplicitRating> {
        let (first, second) = match conversation.participants.as_slice() {
            [a, b] if a != b => (*a, *b),
            _ => return Vec::new(),
        };
        if conversation.messages.is_empty() {
            return Vec::new();
        }

        let duration_boost = (span_days(&conversation.messages) as f64 * 0.02).min(0.2);

        [(first, second), (second, first)]
            .into_iter()
            .filter_map(|(user_id, target_id)| {
                let rating = message_rating(&conversation.messages, user_id) + duration_boost;
                (rating > 0.0).then(|| ImplicitRating {
                    user_id,
                    target_id,
                    rating: rating.min(1.0),
                })
            })
            .collect()
    }

    /// Action log to rating rows; zero-rated actions (block) are dropped
    pub fn ratings_from_interactions(&self, records: &[InteractionRecord]) -> Vec<ImplicitRating> {
        records
            .iter()
            .map(ImplicitRating::from)
            .filter(|r| r.rating > 0.0)
            .collect()
    }

    /// All rating rows derivable from matches and conversations
    pub fn collect_ratings(
        &self,
        matches: &[MatchRecord],
        conversations: &[ConversationRecord],
    ) -> Vec<ImplicitRating> {
        let mut rows: Vec<ImplicitRating> = matches
            .iter()
            .filter_map(|m| {
                let rating = self.match_rating(m, conversations);
                (rating > 0.0).then_some(ImplicitRating {
                    user_id: m.user_id,
                    target_id: m.target_id,
                    rating,
                })
            })
            .collect();

        for conversation in conversations {
            rows.extend(self.conversation_ratings(conversation));
        }
        rows
    }

    /// Refit the filter from scratch
    ///
    /// Returns `Ok(false)` without touching the filter when there are fewer
    /// than `min_interactions` rows.
    pub fn refresh(
        &self,
        filter: &mut CollaborativeFilter,
        matches: &[MatchRecord],
        conversations: &[ConversationRecord],
    ) -> Result<bool> {
        let rows = self.collect_ratings(matches, conversations);
        if rows.len() < self.config.min_interactions {
            debug!(
                rows = rows.len(),
                min_interactions = self.config.min_interactions,
                "Not enough interactions to refit collaborative filter"
            );
            return Ok(false);
        }

        filter.fit(&rows)?;
        info!(rows = rows.len(), "Collaborative filter refreshed from activity");
        Ok(true)
    }

    /// Push one action into a fitted filter
    ///
    /// Zero-rated actions are ignored. Ids unknown to the filter wait for
    /// the next `refresh`.
    pub fn record_interaction(
        &self,
        filter: &mut CollaborativeFilter,
        actor_id: Uuid,
        target_id: Uuid,
        action: ActionKind,
    ) -> Result<bool> {
        let rating = action.implicit_rating();
        if rating <= 0.0 {
            return Ok(false);
        }
        filter.update_interaction(actor_id, target_id, rating)
    }

    pub fn recommend(
        &self,
        filter: &CollaborativeFilter,
        user_id: Uuid,
        method: RecommendationMethod,
        k: usize,
    ) -> Vec<Recommendation> {
        if !filter.is_fitted() {
            return Vec::new();
        }

        match filter.recommend(method, user_id, k) {
            Ok(recs) => recs,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Collaborative recommendation failed");
                Vec::new()
            }
        }
    }
}

/// Whole days between the first and last message
fn span_days(messages: &[MessageRecord]) -> i64 {
    if messages.len() < 2 {
        return 0;
    }
    let first = messages.iter().map(|m| m.created_at).min();
    let last = messages.iter().map(|m| m.created_at).max();
    match (first, last) {
        (Some(first), Some(last)) => (last - first).num_days(),
        _ => 0,
    }
}

fn message_rating(messages: &[MessageRecord], sender: Uuid) -> f64 {
    let own: Vec<&MessageRecord> = messages.iter().filter(|m| m.sender_id == sender).collect();
    if own.is_empty() {
        return 0.0;
    }

    let participation = own.len() as f64 / messages.len() as f64;
    let total_len: usize = own.iter().map(|m| m.content.chars().count()).sum();
    let avg_len = total_len as f64 / own.len() as f64;

    participation * 0.8 + (avg_len / 500.0).min(0.2)
}
