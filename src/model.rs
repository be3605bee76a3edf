//! Normalized domain records produced by the API decoder.
//!
//! These are the shapes the store and repository work with; the irregular
//! wire forms live in [`crate::api::wire`] and are converted on decode.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A game as cached locally: the bulk listing carries exactly these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Opaque id assigned by the remote service.
    pub id: String,
    pub abbreviation: String,
    pub name: String,
}

/// Timing methods a game supports for submitted runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMethod {
    Realtime,
    RealtimeNoloads,
    Ingame,
}

/// Per-game submission rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Ruleset {
    pub show_milliseconds: bool,
    pub require_verification: bool,
    pub require_video: bool,
    pub emulators_allowed: bool,
    /// Supported timing methods, in the game's configured order.
    pub run_times: Vec<TimingMethod>,
    pub default_time: TimingMethod,
}

/// Full game metadata with embedded categories, variables, moderators and
/// levels. Session-only; never written to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct FullGame {
    pub id: String,
    pub abbreviation: String,
    pub name: String,
    pub weblink: String,
    /// Release year as reported by the API.
    pub released: i32,
    pub release_date: Option<NaiveDate>,
    /// When the game was added to the remote database.
    pub added: Option<DateTime<Utc>>,
    pub ruleset: Ruleset,
    pub romhack: bool,
    pub gametype_ids: Vec<String>,
    pub platform_ids: Vec<String>,
    pub region_ids: Vec<String>,
    pub genre_ids: Vec<String>,
    pub engine_ids: Vec<String>,
    pub developer_ids: Vec<String>,
    pub publisher_ids: Vec<String>,
    pub moderators: Vec<User>,
    pub categories: Vec<Category>,
    pub levels: Vec<Level>,
}

impl FullGame {
    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }
}

/// Whether a category ranks whole-game or individual-level runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryType {
    #[serde(rename = "per-game")]
    PerGame,
    #[serde(rename = "per-level")]
    PerLevel,
}

/// How many players a category's runs are played by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCount {
    Exactly(u32),
    UpTo(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub weblink: String,
    pub kind: CategoryType,
    pub rules: Option<String>,
    pub players: PlayerCount,
    pub miscellaneous: bool,
    /// Variables embedded with the category, in API order.
    pub variables: Vec<Variable>,
}

/// Where a variable applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    #[serde(rename = "global")]
    Global,
    #[serde(rename = "full-game")]
    FullGame,
    #[serde(rename = "all-levels")]
    AllLevels,
    #[serde(rename = "single-level")]
    SingleLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableScope {
    pub kind: ScopeKind,
    /// Set only for single-level scope.
    pub level_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: String,
    pub name: String,
    /// None means the variable applies at game scope.
    pub category_id: Option<String>,
    pub scope: VariableScope,
    pub mandatory: bool,
    pub user_defined: bool,
    pub is_subcategory: bool,
    /// Whether selecting a value obsoletes runs with other values.
    pub obsoletes: bool,
    pub values: Vec<Value>,
    pub default_value_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub id: String,
    pub label: String,
    pub rules: Option<String>,
    pub miscellaneous: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub id: String,
    pub name: String,
    pub weblink: Option<String>,
    pub rules: Option<String>,
}

/// Site-wide role of a registered account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Banned,
    User,
    Trusted,
    Moderator,
    Admin,
    Programmer,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    pub country_code: Option<String>,
    pub weblink: String,
}

/// A run participant: either a registered account or an unregistered guest.
/// Decoded by dispatching on the wire `rel` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Player {
    User(User),
    Guest {
        name: String,
        country_code: Option<String>,
    },
}

impl Player {
    pub fn display_name(&self) -> &str {
        match self {
            Player::User(user) => &user.name,
            Player::Guest { name, .. } => name,
        }
    }
}

/// Moderation state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Pending,
    Approved {
        examiner_id: Option<String>,
        verify_date: Option<DateTime<Utc>>,
    },
    Rejected {
        examiner_id: Option<String>,
    },
}

/// Reported durations in seconds, one slot per timing method. A method the
/// runner did not submit is absent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunTimes {
    pub primary: Option<f64>,
    pub realtime: Option<f64>,
    pub realtime_noloads: Option<f64>,
    pub ingame: Option<f64>,
}

impl RunTimes {
    pub fn for_method(&self, method: TimingMethod) -> Option<f64> {
        match method {
            TimingMethod::Realtime => self.realtime,
            TimingMethod::RealtimeNoloads => self.realtime_noloads,
            TimingMethod::Ingame => self.ingame,
        }
    }
}

/// One (variable, value) selection, used both on runs and in filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePair {
    pub variable_id: String,
    pub value_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    pub weblink: String,
    pub game_id: String,
    pub category_id: String,
    pub level_id: Option<String>,
    pub status: RunStatus,
    pub players: Vec<Player>,
    pub values: Vec<ValuePair>,
    pub times: RunTimes,
    /// Date the run was played.
    pub date: Option<NaiveDate>,
    /// When the run was submitted to the site.
    pub submitted: Option<DateTime<Utc>>,
    pub video_links: Vec<String>,
    pub splits_link: Option<String>,
}
