use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Seeker,
    Provider,
    Agent,
    Admin,
}

impl AccountType {
    /// Fixed enumeration code used by the feature extractor
    pub fn code(&self) -> f64 {
        match self {
            AccountType::Seeker => 0.0,
            AccountType::Provider => 1.0,
            AccountType::Agent => 2.0,
            AccountType::Admin => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkSchedule {
    #[serde(alias = "9-to-5")]
    NineToFive,
    Remote,
    #[default]
    Flexible,
    Night,
}

impl WorkSchedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkSchedule::NineToFive => "9-to-5",
            WorkSchedule::Remote => "remote",
            WorkSchedule::Flexible => "flexible",
            WorkSchedule::Night => "night",
        }
    }

    pub fn code(&self) -> f64 {
        match self {
            WorkSchedule::NineToFive => 0.0,
            WorkSchedule::Remote => 1.0,
            WorkSchedule::Flexible => 2.0,
            WorkSchedule::Night => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    #[default]
    Room,
    Apartment,
    House,
}

impl ListingType {
    pub fn code(&self) -> f64 {
        match self {
            ListingType::Room => 0.0,
            ListingType::Apartment => 1.0,
            ListingType::House => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Verification {
    pub email: bool,
    pub phone: bool,
    pub identity: bool,
    pub background_check: bool,
}

/// Stated housing preferences; every field may be missing on sparse profiles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Preferences {
    pub budget: Option<f64>,
    pub location_importance: Option<f64>,
    pub cleanliness_importance: Option<f64>,
    /// 1 = very quiet, 5 = very social
    pub social_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Lifestyle {
    /// 1-5 scale
    pub cleanliness: Option<u8>,
    pub has_pets: Option<bool>,
    pub allows_pets: Option<bool>,
    pub is_smoker: Option<bool>,
    pub allows_smoking: Option<bool>,
    pub work_schedule: Option<WorkSchedule>,
    #[serde(default)]
    pub social_habits: Vec<String>,
}

/// Read-only snapshot of a user as supplied by the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub lifestyle: Lifestyle,
    /// Percentage in 0..=100
    #[serde(default)]
    pub profile_completion: f64,
    pub bio: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Bare record with every optional field missing
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            date_of_birth: None,
            account_type: AccountType::default(),
            verification: Verification::default(),
            preferences: Preferences::default(),
            lifestyle: Lifestyle::default(),
            profile_completion: 0.0,
            bio: None,
            interests: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub id: Uuid,
    pub price: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub neighborhood: Option<String>,
    pub furnished: Option<bool>,
    pub pets_allowed: Option<bool>,
    pub smoking_allowed: Option<bool>,
    #[serde(default)]
    pub listing_type: ListingType,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

impl ListingRecord {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            price: None,
            latitude: None,
            longitude: None,
            bedrooms: None,
            bathrooms: None,
            amenities: Vec::new(),
            title: None,
            description: None,
            neighborhood: None,
            furnished: None,
            pets_allowed: None,
            smoking_allowed: None,
            listing_type: ListingType::default(),
            is_available: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ProfileView,
    Like,
    Accept,
    Message,
    Decline,
    Block,
}

impl ActionKind {
    /// Implicit rating carried by the action (view < like < accept)
    pub fn implicit_rating(&self) -> f64 {
        match self {
            ActionKind::ProfileView => 0.1,
            ActionKind::Like => 0.7,
            ActionKind::Accept => 1.0,
            ActionKind::Message => 0.8,
            ActionKind::Decline => 0.05,
            ActionKind::Block => 0.0,
        }
    }
}

/// Immutable record of one user acting on another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionRecord {
    pub actor_id: Uuid,
    pub target_id: Uuid,
    pub action: ActionKind,
    pub timestamp: DateTime<Utc>,
}

/// One cell of the interaction matrix, rating in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ImplicitRating {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub rating: f64,
}

impl From<&InteractionRecord> for ImplicitRating {
    fn from(record: &InteractionRecord) -> Self {
        Self {
            user_id: record.actor_id,
            target_id: record.target_id,
            rating: record.action.implicit_rating(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Mutual,
    Declined,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub status: MatchStatus,
    pub user_action: Option<String>,
    #[serde(default)]
    pub compatibility_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    pub created_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// True when this is a two-party conversation between `a` and `b`
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        self.participants.len() == 2
            && self.participants.contains(&a)
            && self.participants.contains(&b)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    UserBased,
    ItemBased,
    MatrixFactorization,
    Hybrid,
    ContentBased,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub target_id: Uuid,
    pub score: f64,
    pub source: RecommendationSource,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub candidate_id: Uuid,
    pub score: f64,
    pub reasons: Vec<String>,
}
