//! Wire-format types for the speedrun.com v1 API.
//!
//! The shapes here belong to a third-party service and are irregular in ways
//! the rest of the crate should never see: enums as lowercase tokens,
//! players polymorphic on a `rel` discriminator, value maps keyed by domain
//! ids, and a level embed that substitutes an empty structure for null.
//! Everything decodes into [`crate::model`] records; an unrecognized token or
//! a missing required field is a decode error, never a silent default.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::model::{
    Category, CategoryType, FullGame, Game, Level, Player, PlayerCount, Run, RunStatus, RunTimes,
    Ruleset, ScopeKind, TimingMethod, User, UserRole, ValuePair, Value, Variable, VariableScope,
};

/// Standard response envelope: a `data` payload plus, for list endpoints, a
/// `pagination` block.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub pagination: Option<PaginationResource>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationResource {
    pub offset: u32,
    pub max: u32,
    pub size: u32,
}

/// One decoded page of a list endpoint.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: u32,
    /// Requested page size.
    pub max: u32,
    /// Returned item count.
    pub size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: PaginationResource) -> Self {
        Self {
            items,
            offset: pagination.offset,
            max: pagination.max,
            size: pagination.size,
        }
    }

    /// The page sentinel: a short page is the last one.
    pub fn is_last(&self) -> bool {
        self.size < self.max
    }
}

/// Embed wrapper: `{"data": ...}` around an inlined sub-resource.
#[derive(Debug, Deserialize)]
pub struct Embedded<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct NamesResource {
    pub international: String,
    #[serde(default)]
    pub japanese: Option<String>,
}

/// Game record as returned by the bulk listing.
#[derive(Debug, Deserialize)]
pub struct GameResource {
    pub id: String,
    pub names: NamesResource,
    pub abbreviation: String,
}

impl From<GameResource> for Game {
    fn from(resource: GameResource) -> Self {
        Game {
            id: resource.id,
            abbreviation: resource.abbreviation,
            name: resource.names.international,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RulesetResource {
    #[serde(rename = "show-milliseconds")]
    pub show_milliseconds: bool,
    #[serde(rename = "require-verification")]
    pub require_verification: bool,
    #[serde(rename = "require-video")]
    pub require_video: bool,
    #[serde(rename = "run-times")]
    pub run_times: Vec<TimingMethod>,
    #[serde(rename = "default-time")]
    pub default_time: TimingMethod,
    #[serde(rename = "emulators-allowed")]
    pub emulators_allowed: bool,
}

impl From<RulesetResource> for Ruleset {
    fn from(resource: RulesetResource) -> Self {
        Ruleset {
            show_milliseconds: resource.show_milliseconds,
            require_verification: resource.require_verification,
            require_video: resource.require_video,
            emulators_allowed: resource.emulators_allowed,
            run_times: resource.run_times,
            default_time: resource.default_time,
        }
    }
}

/// Full game resource with `embed=categories.variables,moderators,levels`.
#[derive(Debug, Deserialize)]
pub struct FullGameResource {
    pub id: String,
    pub names: NamesResource,
    pub abbreviation: String,
    pub weblink: String,
    pub released: i32,
    #[serde(default, rename = "release-date")]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    pub ruleset: RulesetResource,
    pub romhack: bool,
    #[serde(default)]
    pub gametypes: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    pub moderators: Embedded<Vec<UserResource>>,
    pub categories: Embedded<Vec<CategoryResource>>,
    #[serde(default)]
    pub levels: Option<Embedded<Vec<LevelResource>>>,
}

impl From<FullGameResource> for FullGame {
    fn from(resource: FullGameResource) -> Self {
        FullGame {
            id: resource.id,
            abbreviation: resource.abbreviation,
            name: resource.names.international,
            weblink: resource.weblink,
            released: resource.released,
            release_date: resource.release_date,
            added: resource.created,
            ruleset: resource.ruleset.into(),
            romhack: resource.romhack,
            gametype_ids: resource.gametypes,
            platform_ids: resource.platforms,
            region_ids: resource.regions,
            genre_ids: resource.genres,
            engine_ids: resource.engines,
            developer_ids: resource.developers,
            publisher_ids: resource.publishers,
            moderators: resource.moderators.data.into_iter().map(User::from).collect(),
            categories: resource
                .categories
                .data
                .into_iter()
                .map(Category::from)
                .collect(),
            levels: resource
                .levels
                .map(|embedded| embedded.data.into_iter().map(Level::from).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum PlayerCountKind {
    #[serde(rename = "exactly")]
    Exactly,
    #[serde(rename = "up-to")]
    UpTo,
}

#[derive(Debug, Deserialize)]
pub struct PlayersResource {
    #[serde(rename = "type")]
    pub kind: PlayerCountKind,
    pub value: u32,
}

impl From<PlayersResource> for PlayerCount {
    fn from(resource: PlayersResource) -> Self {
        match resource.kind {
            PlayerCountKind::Exactly => PlayerCount::Exactly(resource.value),
            PlayerCountKind::UpTo => PlayerCount::UpTo(resource.value),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryResource {
    pub id: String,
    pub name: String,
    pub weblink: String,
    #[serde(rename = "type")]
    pub kind: CategoryType,
    #[serde(default)]
    pub rules: Option<String>,
    pub players: PlayersResource,
    pub miscellaneous: bool,
    #[serde(default)]
    pub variables: Option<Embedded<Vec<VariableResource>>>,
}

impl From<CategoryResource> for Category {
    fn from(resource: CategoryResource) -> Self {
        Category {
            id: resource.id,
            name: resource.name,
            weblink: resource.weblink,
            kind: resource.kind,
            rules: resource.rules,
            players: resource.players.into(),
            miscellaneous: resource.miscellaneous,
            variables: resource
                .variables
                .map(|embedded| embedded.data.into_iter().map(Variable::from).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScopeResource {
    #[serde(rename = "type")]
    pub kind: ScopeKind,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VariableResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub scope: ScopeResource,
    pub mandatory: bool,
    #[serde(rename = "user-defined")]
    pub user_defined: bool,
    pub obsoletes: bool,
    #[serde(rename = "is-subcategory")]
    pub is_subcategory: bool,
    pub values: ValueTableResource,
}

impl From<VariableResource> for Variable {
    fn from(resource: VariableResource) -> Self {
        Variable {
            id: resource.id,
            name: resource.name,
            category_id: resource.category,
            scope: VariableScope {
                kind: resource.scope.kind,
                level_id: resource.scope.level,
            },
            mandatory: resource.mandatory,
            user_defined: resource.user_defined,
            is_subcategory: resource.is_subcategory,
            obsoletes: resource.obsoletes,
            values: resource
                .values
                .values
                .into_iter()
                .map(|(id, value)| Value {
                    id,
                    label: value.label,
                    rules: value.rules,
                    miscellaneous: value.flags.and_then(|f| f.miscellaneous),
                })
                .collect(),
            default_value_id: resource.values.default,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValueResource {
    pub label: String,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub flags: Option<ValueFlags>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ValueFlags {
    #[serde(default)]
    pub miscellaneous: Option<bool>,
}

/// A variable's value table: a JSON object whose keys are value ids, with a
/// `"default"` key alongside the definitions naming the default value id.
#[derive(Debug, Default)]
pub struct ValueTableResource {
    pub values: Vec<(String, ValueResource)>,
    pub default: Option<String>,
}

impl<'de> Deserialize<'de> for ValueTableResource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = serde_json::Map::deserialize(deserializer)?;
        let mut table = ValueTableResource::default();
        for (key, raw) in entries {
            if key == "default" {
                table.default = match raw {
                    JsonValue::Null => None,
                    JsonValue::String(id) => Some(id),
                    other => {
                        return Err(de::Error::custom(format!(
                            "default must be a value id, got {other}"
                        )))
                    }
                };
            } else {
                let value: ValueResource =
                    serde_json::from_value(raw).map_err(de::Error::custom)?;
                table.values.push((key, value));
            }
        }
        Ok(table)
    }
}

#[derive(Debug, Deserialize)]
pub struct LevelResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub weblink: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
}

impl From<LevelResource> for Level {
    fn from(resource: LevelResource) -> Self {
        Level {
            id: resource.id,
            name: resource.name,
            weblink: resource.weblink,
            rules: resource.rules,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CountryResource {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationResource {
    pub country: CountryResource,
}

#[derive(Debug, Deserialize)]
pub struct UserResource {
    pub id: String,
    pub names: NamesResource,
    pub weblink: String,
    // Required: a registered user without a role fails decode.
    pub role: UserRole,
    #[serde(default)]
    pub location: Option<LocationResource>,
}

impl From<UserResource> for User {
    fn from(resource: UserResource) -> Self {
        User {
            id: resource.id,
            name: resource.names.international,
            role: resource.role,
            country_code: resource.location.map(|l| l.country.code),
            weblink: resource.weblink,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GuestResource {
    pub name: String,
    #[serde(default)]
    pub location: Option<LocationResource>,
}

/// Polymorphic player record, dispatched on the `rel` discriminator before
/// the remainder of the shape is parsed.
#[derive(Debug, Deserialize)]
#[serde(tag = "rel")]
pub enum PlayerResource {
    #[serde(rename = "user")]
    User(UserResource),
    #[serde(rename = "guest")]
    Guest(GuestResource),
}

impl From<PlayerResource> for Player {
    fn from(resource: PlayerResource) -> Self {
        match resource {
            PlayerResource::User(user) => Player::User(user.into()),
            PlayerResource::Guest(guest) => Player::Guest {
                name: guest.name,
                country_code: guest.location.map(|l| l.country.code),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatusKind {
    New,
    Verified,
    Rejected,
}

#[derive(Debug, Deserialize)]
pub struct RunStatusResource {
    pub status: RunStatusKind,
    #[serde(default)]
    pub examiner: Option<String>,
    #[serde(default, rename = "verify-date")]
    pub verify_date: Option<DateTime<Utc>>,
}

impl From<RunStatusResource> for RunStatus {
    fn from(resource: RunStatusResource) -> Self {
        match resource.status {
            RunStatusKind::New => RunStatus::Pending,
            RunStatusKind::Verified => RunStatus::Approved {
                examiner_id: resource.examiner,
                verify_date: resource.verify_date,
            },
            RunStatusKind::Rejected => RunStatus::Rejected {
                examiner_id: resource.examiner,
            },
        }
    }
}

/// The `*_t` fields carry the duration in seconds; the ISO-8601 strings next
/// to them are redundant and ignored. The API reports 0 rather than null for
/// a timing method the runner did not submit.
#[derive(Debug, Default, Deserialize)]
pub struct TimesResource {
    #[serde(default)]
    pub primary_t: Option<f64>,
    #[serde(default)]
    pub realtime_t: Option<f64>,
    #[serde(default)]
    pub realtime_noloads_t: Option<f64>,
    #[serde(default)]
    pub ingame_t: Option<f64>,
}

impl From<TimesResource> for RunTimes {
    fn from(resource: TimesResource) -> Self {
        RunTimes {
            primary: resource.primary_t.filter(|t| *t > 0.0),
            realtime: resource.realtime_t.filter(|t| *t > 0.0),
            realtime_noloads: resource.realtime_noloads_t.filter(|t| *t > 0.0),
            ingame: resource.ingame_t.filter(|t| *t > 0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkResource {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct VideosResource {
    #[serde(default)]
    pub links: Vec<LinkResource>,
}

#[derive(Debug, Deserialize)]
pub struct SplitsResource {
    pub uri: String,
}

/// Run record with `embed=players,level`.
#[derive(Debug, Deserialize)]
pub struct RunResource {
    pub id: String,
    pub weblink: String,
    pub game: String,
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_embedded_level")]
    pub level: Option<LevelResource>,
    #[serde(default)]
    pub videos: Option<VideosResource>,
    pub status: RunStatusResource,
    pub players: Embedded<Vec<PlayerResource>>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub submitted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub times: TimesResource,
    #[serde(default)]
    pub splits: Option<SplitsResource>,
    /// Sparse map: keys are variable ids, values are value ids.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// With `embed=level` the API wraps the level in `{"data": ...}` and, when a
/// run has no level, substitutes an empty array for the object instead of
/// using null. Both shapes mean "absent".
fn deserialize_embedded_level<'de, D>(deserializer: D) -> Result<Option<LevelResource>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = JsonValue::deserialize(deserializer)?;
    let inner = match raw {
        JsonValue::Null => return Ok(None),
        JsonValue::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            // Not an embed wrapper: a plain level object.
            None => JsonValue::Object(map),
        },
        other => other,
    };
    match inner {
        JsonValue::Null => Ok(None),
        JsonValue::Array(items) if items.is_empty() => Ok(None),
        JsonValue::Object(_) => serde_json::from_value(inner)
            .map(Some)
            .map_err(de::Error::custom),
        other => Err(de::Error::custom(format!(
            "unexpected level embed shape: {other}"
        ))),
    }
}

impl From<RunResource> for Run {
    fn from(resource: RunResource) -> Self {
        Run {
            id: resource.id,
            weblink: resource.weblink,
            game_id: resource.game,
            category_id: resource.category,
            level_id: resource.level.map(|l| l.id),
            status: resource.status.into(),
            players: resource
                .players
                .data
                .into_iter()
                .map(Player::from)
                .collect(),
            values: resource
                .values
                .into_iter()
                .map(|(variable_id, value_id)| ValuePair {
                    variable_id,
                    value_id,
                })
                .collect(),
            times: resource.times.into(),
            date: resource.date,
            submitted: resource.submitted,
            video_links: resource
                .videos
                .map(|v| v.links.into_iter().map(|l| l.uri).collect())
                .unwrap_or_default(),
            splits_link: resource.splits.map(|s| s.uri),
        }
    }
}
