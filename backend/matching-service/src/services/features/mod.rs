// ============================================
// Feature Extraction
// ============================================
//
// Converts user and listing snapshots into fixed-order numeric vectors.
// The canonical name lists below define the column order shared by
// training and inference; artifacts embed them so a loader can refuse a
// model trained against a different layout.
//
// Free text (bio, interests, amenities) is not part of these vectors;
// the content filter handles it through the text pipeline.

pub mod scaler;
pub mod text;

pub use scaler::StandardScaler;
pub use text::{FittedVectorizer, TfidfVectorizer};

use crate::models::{ListingRecord, UserRecord};
use chrono::{Datelike, NaiveDate, Utc};
use ndarray::Array1;

/// Canonical user feature order
pub const USER_FEATURE_NAMES: [&str; 19] = [
    "age",
    "user_type",
    "verified_email",
    "verified_phone",
    "verified_identity",
    "background_checked",
    "profile_completion",
    "budget_normalized",
    "location_importance",
    "cleanliness_importance",
    "social_level",
    "lifestyle_cleanliness",
    "is_quiet",
    "is_social",
    "work_schedule",
    "has_pets",
    "allows_pets",
    "is_smoker",
    "allows_smoking",
];

/// Canonical listing feature order
pub const LISTING_FEATURE_NAMES: [&str; 10] = [
    "price_normalized",
    "latitude_normalized",
    "longitude_normalized",
    "bedrooms",
    "bathrooms",
    "furnished",
    "pets_allowed",
    "smoking_allowed",
    "listing_type",
    "is_available",
];

// Population defaults substituted for missing fields
pub const DEFAULT_AGE: f64 = 25.0;
pub const DEFAULT_BUDGET: f64 = 1000.0;
pub const DEFAULT_LOCATION_IMPORTANCE: f64 = 0.5;
pub const DEFAULT_CLEANLINESS_IMPORTANCE: f64 = 3.0;
pub const DEFAULT_SOCIAL_LEVEL: f64 = 3.0;
pub const DEFAULT_CLEANLINESS: u8 = 3;
pub const DEFAULT_PRICE: f64 = 1000.0;

/// Normaliser for budgets and prices (max expected monthly amount)
const MAX_EXPECTED_BUDGET: f64 = 3000.0;

/// Deterministic record → vector conversion
///
/// Age is computed against `reference_date`, so two extractors built with
/// the same date always produce identical vectors for the same record.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    reference_date: NaiveDate,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    /// Extractor anchored to today's date
    pub fn new() -> Self {
        Self {
            reference_date: Utc::now().date_naive(),
        }
    }

    pub fn with_reference_date(reference_date: NaiveDate) -> Self {
        Self { reference_date }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Canonical user feature names, in vector order
    pub fn feature_names() -> Vec<String> {
        USER_FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    pub fn listing_feature_names() -> Vec<String> {
        LISTING_FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    pub fn dimension() -> usize {
        USER_FEATURE_NAMES.len()
    }

    /// Age in whole years at the reference date
    pub fn age(&self, user: &UserRecord) -> Option<i32> {
        let dob = user.date_of_birth?;
        let today = self.reference_date;
        let before_birthday = (today.month(), today.day()) < (dob.month(), dob.day());
        Some(today.year() - dob.year() - i32::from(before_birthday))
    }

    /// Extract the user feature vector; never fails on missing fields
    pub fn extract(&self, user: &UserRecord) -> Array1<f64> {
        let prefs = &user.preferences;
        let lifestyle = &user.lifestyle;
        let verification = &user.verification;

        let age = self.age(user).map(f64::from).unwrap_or(DEFAULT_AGE);
        let budget = finite_or(prefs.budget, DEFAULT_BUDGET);
        let cleanliness = lifestyle.cleanliness.unwrap_or(DEFAULT_CLEANLINESS);
        let schedule = lifestyle.work_schedule.unwrap_or_default();
        let has_habit = |tag: &str| {
            lifestyle
                .social_habits
                .iter()
                .any(|h| h.eq_ignore_ascii_case(tag))
        };

        let features = vec![
            age,
            user.account_type.code(),
            flag(verification.email),
            flag(verification.phone),
            flag(verification.identity),
            flag(verification.background_check),
            finite_or(Some(user.profile_completion), 0.0) / 100.0,
            budget / MAX_EXPECTED_BUDGET,
            finite_or(prefs.location_importance, DEFAULT_LOCATION_IMPORTANCE),
            finite_or(prefs.cleanliness_importance, DEFAULT_CLEANLINESS_IMPORTANCE) / 5.0,
            finite_or(prefs.social_level, DEFAULT_SOCIAL_LEVEL) / 5.0,
            f64::from(cleanliness) / 5.0,
            flag(has_habit("quiet")),
            flag(has_habit("social")),
            schedule.code() / 3.0,
            flag(lifestyle.has_pets.unwrap_or(false)),
            flag(lifestyle.allows_pets.unwrap_or(true)),
            flag(lifestyle.is_smoker.unwrap_or(false)),
            flag(lifestyle.allows_smoking.unwrap_or(false)),
        ];

        debug_assert_eq!(features.len(), USER_FEATURE_NAMES.len());
        Array1::from(features)
    }

    /// Extract the listing feature vector
    pub fn extract_listing(&self, listing: &ListingRecord) -> Array1<f64> {
        let features = vec![
            finite_or(listing.price, DEFAULT_PRICE) / MAX_EXPECTED_BUDGET,
            finite_or(listing.latitude, 0.0) / 90.0,
            finite_or(listing.longitude, 0.0) / 180.0,
            f64::from(listing.bedrooms.unwrap_or(1)),
            f64::from(listing.bathrooms.unwrap_or(1)),
            flag(listing.furnished.unwrap_or(false)),
            flag(listing.pets_allowed.unwrap_or(true)),
            flag(listing.smoking_allowed.unwrap_or(false)),
            listing.listing_type.code() / 2.0,
            flag(listing.is_available),
        ];

        debug_assert_eq!(features.len(), LISTING_FEATURE_NAMES.len());
        Array1::from(features)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountType, WorkSchedule};
    use uuid::Uuid;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let user = UserRecord::new(Uuid::new_v4());
        let features = extractor().extract(&user);

        assert_eq!(features.len(), USER_FEATURE_NAMES.len());
        assert_eq!(features[0], DEFAULT_AGE);
        assert!((features[7] - 1000.0 / 3000.0).abs() < 1e-12);
        assert!((features[11] - 0.6).abs() < 1e-12);
        assert!((features[14] - 2.0 / 3.0).abs() < 1e-12); // flexible
        assert_eq!(features[16], 1.0); // allows_pets defaults to true
        assert_eq!(features[18], 0.0); // allows_smoking defaults to false
    }

    #[test]
    fn test_age_respects_birthday() {
        let extractor = extractor();
        let mut user = UserRecord::new(Uuid::new_v4());

        user.date_of_birth = NaiveDate::from_ymd_opt(2000, 6, 16);
        assert_eq!(extractor.age(&user), Some(23));

        user.date_of_birth = NaiveDate::from_ymd_opt(2000, 6, 15);
        assert_eq!(extractor.age(&user), Some(24));
    }

    #[test]
    fn test_categorical_encoding() {
        let mut user = UserRecord::new(Uuid::new_v4());
        user.account_type = AccountType::Agent;
        user.lifestyle.work_schedule = Some(WorkSchedule::Night);
        user.lifestyle.social_habits = vec!["Quiet".to_string()];

        let features = extractor().extract(&user);
        assert_eq!(features[1], 2.0);
        assert_eq!(features[12], 1.0);
        assert_eq!(features[13], 0.0);
        assert_eq!(features[14], 1.0);
    }

    #[test]
    fn test_non_finite_budget_falls_back() {
        let mut user = UserRecord::new(Uuid::new_v4());
        user.preferences.budget = Some(f64::NAN);

        let features = extractor().extract(&user);
        assert!((features[7] - DEFAULT_BUDGET / 3000.0).abs() < 1e-12);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = extractor();
        let mut user = UserRecord::new(Uuid::new_v4());
        user.date_of_birth = NaiveDate::from_ymd_opt(1995, 1, 1);
        user.preferences.budget = Some(1450.0);

        assert_eq!(extractor.extract(&user), extractor.extract(&user));
    }

    #[test]
    fn test_listing_features() {
        let mut listing = ListingRecord::new(Uuid::new_v4());
        listing.price = Some(1500.0);
        listing.latitude = Some(45.0);
        listing.bedrooms = Some(2);

        let features = extractor().extract_listing(&listing);
        assert_eq!(features.len(), LISTING_FEATURE_NAMES.len());
        assert!((features[0] - 0.5).abs() < 1e-12);
        assert!((features[1] - 0.5).abs() < 1e-12);
        assert_eq!(features[3], 2.0);
        assert_eq!(features[9], 1.0);
    }
}
