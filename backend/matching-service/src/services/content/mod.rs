// ============================================
// Content-Based Filtering
// ============================================
//
// Two independent pipelines, users and listings. Each row is
//   [scaled numeric features | TF-IDF of the record's free text]
// and a full cosine similarity matrix is built over the rows.
//
// fit_* calls are full rebuilds; there is no incremental mode.

use crate::error::{EngineError, Result};
use crate::models::{
    AccountType, ListingRecord, Recommendation, RecommendationSource, UserRecord,
};
use crate::services::features::{
    FeatureExtractor, FittedVectorizer, StandardScaler, TfidfVectorizer,
};
use crate::utils::{by_score_desc, clamp_unit, cosine_similarity_matrix};
use ndarray::{concatenate, Array2, Axis};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ContentConfig {
    /// Neighbours need at least this similarity
    pub min_similarity: f64,
    pub user_vocabulary: usize,
    pub listing_vocabulary: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.1,
            user_vocabulary: 100,
            listing_vocabulary: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContentStats {
    pub users_fitted: usize,
    pub listings_fitted: usize,
    pub user_features: usize,
    pub listing_features: usize,
    pub user_vocabulary_size: usize,
    pub listing_vocabulary_size: usize,
}

/// Fitted profiles of one kind (users or listings)
#[derive(Debug, Clone)]
struct ProfileIndex<T> {
    records: Vec<T>,
    index: HashMap<Uuid, usize>,
    feature_width: usize,
    similarity: Array2<f64>,
    vectorizer: FittedVectorizer,
}

impl<T> ProfileIndex<T> {
    fn build(
        records: Vec<T>,
        ids: Vec<Uuid>,
        numeric: Array2<f64>,
        documents: &[String],
        vocabulary: usize,
    ) -> Result<Self> {
        let scaler = StandardScaler::fit(&numeric)?;
        let scaled = scaler.transform(&numeric)?;

        let vectorizer = TfidfVectorizer::new(vocabulary).fit(documents);
        let text = vectorizer.transform_all(documents);

        let features = concatenate(Axis(1), &[scaled.view(), text.view()])
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let similarity = cosine_similarity_matrix(&features);

        let index = ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect();

        Ok(Self {
            records,
            index,
            feature_width: features.ncols(),
            similarity,
            vectorizer,
        })
    }

    /// Neighbours of `id` at or above `min_similarity`, self excluded
    fn neighbours(&self, id: Uuid, min_similarity: f64) -> Vec<(usize, f64)> {
        let idx = match self.index.get(&id) {
            Some(&idx) => idx,
            None => return Vec::new(),
        };

        let mut neighbours: Vec<(usize, f64)> = self
            .similarity
            .row(idx)
            .iter()
            .enumerate()
            .filter(|&(other, &sim)| other != idx && sim >= min_similarity)
            .map(|(other, &sim)| (other, sim))
            .collect();
        neighbours.sort_by(|a, b| by_score_desc(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        neighbours
    }
}

/// Keep the first record for each id
fn dedup_by_id<T: Clone>(records: &[T], id: impl Fn(&T) -> Uuid) -> (Vec<T>, Vec<Uuid>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        let record_id = id(record);
        if seen.insert(record_id) {
            kept.push(record.clone());
            ids.push(record_id);
        }
    }
    (kept, ids)
}

pub fn user_document(user: &UserRecord) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(bio) = user.bio.as_deref() {
        parts.push(bio);
    }
    parts.extend(user.interests.iter().map(String::as_str));
    parts.extend(user.lifestyle.social_habits.iter().map(String::as_str));
    if let Some(schedule) = user.lifestyle.work_schedule {
        parts.push(schedule.as_str());
    }
    parts.join(" ")
}

pub fn listing_document(listing: &ListingRecord) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for text in [&listing.title, &listing.description, &listing.neighborhood] {
        if let Some(text) = text.as_deref() {
            parts.push(text);
        }
    }
    parts.extend(listing.amenities.iter().map(String::as_str));
    parts.join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    config: ContentConfig,
    extractor: FeatureExtractor,
    users: Option<ProfileIndex<UserRecord>>,
    listings: Option<ProfileIndex<ListingRecord>>,
}

impl ContentFilter {
    pub fn new(config: ContentConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
            users: None,
            listings: None,
        }
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn fit_user_profiles(&mut self, users: &[UserRecord]) -> Result<()> {
        if users.is_empty() {
            return Err(EngineError::EmptyData);
        }

        let (records, ids) = dedup_by_id(users, |u| u.id);
        let profiles = self.user_index(records, ids)?;
        info!(
            users = profiles.records.len(),
            features = profiles.feature_width,
            vocabulary = profiles.vectorizer.vocabulary_size(),
            "User content profiles fitted"
        );

        self.users = Some(profiles);
        Ok(())
    }

    fn user_index(
        &self,
        records: Vec<UserRecord>,
        ids: Vec<Uuid>,
    ) -> Result<ProfileIndex<UserRecord>> {
        let mut numeric = Array2::zeros((records.len(), FeatureExtractor::dimension()));
        for (i, user) in records.iter().enumerate() {
            numeric.row_mut(i).assign(&self.extractor.extract(user));
        }
        let documents: Vec<String> = records.iter().map(user_document).collect();

        ProfileIndex::build(records, ids, numeric, &documents, self.config.user_vocabulary)
    }

    pub fn fit_listing_profiles(&mut self, listings: &[ListingRecord]) -> Result<()> {
        if listings.is_empty() {
            return Err(EngineError::EmptyData);
        }

        let (records, ids) = dedup_by_id(listings, |l| l.id);
        let width = FeatureExtractor::listing_feature_names().len();
        let mut numeric = Array2::zeros((records.len(), width));
        for (i, listing) in records.iter().enumerate() {
            numeric.row_mut(i).assign(&self.extractor.extract_listing(listing));
        }
        let documents: Vec<String> = records.iter().map(listing_document).collect();

        let vocabulary = self.config.listing_vocabulary;
        let profiles = ProfileIndex::build(records, ids, numeric, &documents, vocabulary)?;
        info!(
            listings = profiles.records.len(),
            features = profiles.feature_width,
            vocabulary = profiles.vectorizer.vocabulary_size(),
            "Listing content profiles fitted"
        );

        self.listings = Some(profiles);
        Ok(())
    }

    pub fn similar_users(&self, user_id: Uuid, k: usize) -> Result<Vec<Recommendation>> {
        let users = self.users.as_ref().ok_or(EngineError::NotFitted)?;
        Ok(users
            .neighbours(user_id, self.config.min_similarity)
            .into_iter()
            .take(k)
            .map(|(idx, sim)| content_recommendation(users.records[idx].id, sim, None))
            .collect())
    }

    pub fn similar_listings(&self, listing_id: Uuid, k: usize) -> Result<Vec<Recommendation>> {
        let listings = self.listings.as_ref().ok_or(EngineError::NotFitted)?;
        Ok(listings
            .neighbours(listing_id, self.config.min_similarity)
            .into_iter()
            .take(k)
            .map(|(idx, sim)| content_recommendation(listings.records[idx].id, sim, None))
            .collect())
    }

    /// Similar users, optionally restricted to one account type, each with
    /// a short explanation
    pub fn recommend_users_for_user(
        &self,
        user_id: Uuid,
        target_type: Option<AccountType>,
        k: usize,
    ) -> Result<Vec<Recommendation>> {
        let users = self.users.as_ref().ok_or(EngineError::NotFitted)?;
        let user = match users.index.get(&user_id) {
            Some(&idx) => &users.records[idx],
            None => return Ok(Vec::new()),
        };

        let recommendations: Vec<Recommendation> = users
            .neighbours(user_id, self.config.min_similarity)
            .into_iter()
            .take(k.saturating_mul(2))
            .map(|(idx, sim)| (&users.records[idx], sim))
            .filter(|(other, _)| target_type.map_or(true, |t| other.account_type == t))
            .take(k)
            .map(|(other, sim)| {
                let reason = self.similarity_reason(user, other);
                content_recommendation(other.id, sim, Some(reason))
            })
            .collect();

        debug!(
            user_id = %user_id,
            count = recommendations.len(),
            "Content recommendations built"
        );
        Ok(recommendations)
    }

    /// Fitted users closest to a bare profile holding only `interests`
    ///
    /// The query is scored against a throwaway index; the fitted profiles
    /// are left as they were.
    pub fn users_by_interests(
        &self,
        interests: &[String],
        k: usize,
    ) -> Result<Vec<Recommendation>> {
        if interests.iter().all(|tag| tag.trim().is_empty()) {
            return Err(EngineError::InvalidInput("interests must not be empty".to_string()));
        }
        let users = self.users.as_ref().ok_or(EngineError::NotFitted)?;

        let mut query = UserRecord::new(Uuid::new_v4());
        query.interests = interests.to_vec();
        query.profile_completion = 50.0;
        let query_id = query.id;

        let mut records = users.records.clone();
        records.push(query);
        let ids = records.iter().map(|u| u.id).collect();
        let index = self.user_index(records, ids)?;

        let shown = &interests[..interests.len().min(3)];
        let reason = format!("Shared interests: {}", shown.join(", "));
        let recommendations: Vec<Recommendation> = index
            .neighbours(query_id, self.config.min_similarity)
            .into_iter()
            .take(k)
            .map(|(idx, sim)| {
                content_recommendation(index.records[idx].id, sim, Some(reason.clone()))
            })
            .collect();

        debug!(
            interests = interests.len(),
            count = recommendations.len(),
            "Interest search finished"
        );
        Ok(recommendations)
    }

    /// Best-effort prose comparing a few concrete axes
    pub fn similarity_reason(&self, user: &UserRecord, other: &UserRecord) -> String {
        let mut reasons = Vec::new();

        if let (Some(a), Some(b)) = (self.extractor.age(user), self.extractor.age(other)) {
            if (a - b).abs() <= 3 {
                reasons.push("similar age");
            }
        }

        let budgets = (user.preferences.budget, other.preferences.budget);
        if let (Some(a), Some(b)) = budgets {
            if a > 0.0 && b > 0.0 && (a - b).abs() / a.max(b) < 0.2 {
                reasons.push("similar budget");
            }
        }

        if let (Some(a), Some(b)) = (user.lifestyle.cleanliness, other.lifestyle.cleanliness) {
            if a > 0 && b > 0 && a.abs_diff(b) <= 1 {
                reasons.push("similar cleanliness standards");
            }
        }

        if user.lifestyle.work_schedule.is_some()
            && user.lifestyle.work_schedule == other.lifestyle.work_schedule
        {
            reasons.push("similar work schedule");
        }

        if user.verification.identity && other.verification.identity {
            reasons.push("both verified");
        }

        if reasons.is_empty() {
            "compatible lifestyle".to_string()
        } else {
            reasons.join(", ")
        }
    }

    pub fn stats(&self) -> ContentStats {
        ContentStats {
            users_fitted: self.users.as_ref().map_or(0, |p| p.records.len()),
            listings_fitted: self.listings.as_ref().map_or(0, |p| p.records.len()),
            user_features: self.users.as_ref().map_or(0, |p| p.feature_width),
            listing_features: self.listings.as_ref().map_or(0, |p| p.feature_width),
            user_vocabulary_size: self
                .users
                .as_ref()
                .map_or(0, |p| p.vectorizer.vocabulary_size()),
            listing_vocabulary_size: self
                .listings
                .as_ref()
                .map_or(0, |p| p.vectorizer.vocabulary_size()),
        }
    }
}

fn content_recommendation(
    target_id: Uuid,
    similarity: f64,
    reason: Option<String>,
) -> Recommendation {
    Recommendation {
        target_id,
        score: clamp_unit(similarity),
        source: RecommendationSource::ContentBased,
        reason,
    }
}
