//! User-selected leaderboard view configuration.
//!
//! A pure value type: the store persists and streams it, the repository reads
//! it to build request parameters. Nothing here talks to the network or the
//! database.

use serde::{Deserialize, Serialize};

use crate::model::ValuePair;

/// Run-status filter applied to leaderboard fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatusFilter {
    Any,
    Pending,
    Approved,
    Rejected,
}

impl RunStatusFilter {
    /// Token stored in the settings row.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatusFilter::Any => "any",
            RunStatusFilter::Pending => "pending",
            RunStatusFilter::Approved => "approved",
            RunStatusFilter::Rejected => "rejected",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "any" => Some(RunStatusFilter::Any),
            "pending" => Some(RunStatusFilter::Pending),
            "approved" => Some(RunStatusFilter::Approved),
            "rejected" => Some(RunStatusFilter::Rejected),
            _ => None,
        }
    }

    /// Query-parameter value for the runs endpoint; `Any` sends no parameter.
    pub fn wire_token(self) -> Option<&'static str> {
        match self {
            RunStatusFilter::Any => None,
            RunStatusFilter::Pending => Some("new"),
            RunStatusFilter::Approved => Some("verified"),
            RunStatusFilter::Rejected => Some("rejected"),
        }
    }
}

/// Sort discriminator for run listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortField {
    Date,
    Submitted,
    Status,
    VerifyDate,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::Submitted => "submitted",
            SortField::Status => "status",
            SortField::VerifyDate => "verify-date",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "date" => Some(SortField::Date),
            "submitted" => Some(SortField::Submitted),
            "status" => Some(SortField::Status),
            "verify-date" => Some(SortField::VerifyDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// The single persisted view configuration. One logical row in the cache;
/// every effective write is pushed to subscribers of the settings stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardSettings {
    pub game_id: Option<String>,
    pub category_id: Option<String>,
    pub run_status: RunStatusFilter,
    /// At most one pair per distinct variable id.
    pub variable_values: Vec<ValuePair>,
    /// Leaderboard style: keep only each player's first run in sort order.
    pub one_run_per_player: bool,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            game_id: None,
            category_id: None,
            run_status: RunStatusFilter::Approved,
            variable_values: Vec::new(),
            one_run_per_player: false,
            sort_field: SortField::Date,
            sort_direction: SortDirection::Desc,
        }
    }
}

impl LeaderboardSettings {
    /// Select a value for a variable, replacing any existing pair for the
    /// same variable id.
    pub fn set_variable(&mut self, variable_id: impl Into<String>, value_id: impl Into<String>) {
        let variable_id = variable_id.into();
        self.variable_values.retain(|p| p.variable_id != variable_id);
        self.variable_values.push(ValuePair {
            variable_id,
            value_id: value_id.into(),
        });
    }

    pub fn clear_variable(&mut self, variable_id: &str) {
        self.variable_values.retain(|p| p.variable_id != variable_id);
    }

    /// Enforce the one-pair-per-variable invariant on a value built without
    /// [`set_variable`](Self::set_variable); the last pair for an id wins.
    pub fn dedup_variables(&mut self) {
        let mut seen = std::collections::HashSet::new();
        let mut kept: Vec<ValuePair> = Vec::with_capacity(self.variable_values.len());
        for pair in self.variable_values.drain(..).rev() {
            if seen.insert(pair.variable_id.clone()) {
                kept.push(pair);
            }
        }
        kept.reverse();
        self.variable_values = kept;
    }

    /// Switch the selected game, clearing the filters that depend on it.
    /// Returns false when the game id is unchanged.
    pub fn select_game(&mut self, game_id: Option<String>) -> bool {
        if self.game_id == game_id {
            return false;
        }
        self.game_id = game_id;
        self.category_id = None;
        self.variable_values.clear();
        true
    }
}
