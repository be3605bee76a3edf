//! Cache row types

use rusqlite::Row;

use crate::error::{Error, Result};
use crate::model::Game;
use crate::settings::{LeaderboardSettings, RunStatusFilter, SortDirection, SortField};

pub(crate) fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        abbreviation: row.get(1)?,
        name: row.get(2)?,
    })
}

/// Raw columns of the singleton settings row. Enum tokens and the JSON
/// variable-filter column are validated on conversion, not in `from_row`.
#[derive(Debug, Clone)]
pub(crate) struct SettingsRow {
    pub game_id: Option<String>,
    pub category_id: Option<String>,
    pub run_status: String,
    pub variable_values: String,
    pub one_run_per_player: bool,
    pub sort_field: String,
    pub sort_direction: String,
}

impl SettingsRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            game_id: row.get(0)?,
            category_id: row.get(1)?,
            run_status: row.get(2)?,
            variable_values: row.get(3)?,
            one_run_per_player: row.get::<_, i64>(4)? != 0,
            sort_field: row.get(5)?,
            sort_direction: row.get(6)?,
        })
    }

    pub fn into_settings(self) -> Result<LeaderboardSettings> {
        let run_status = RunStatusFilter::parse(&self.run_status).ok_or_else(|| {
            Error::decode("settings row", format!("unknown status token {:?}", self.run_status))
        })?;
        let sort_field = SortField::parse(&self.sort_field).ok_or_else(|| {
            Error::decode("settings row", format!("unknown sort token {:?}", self.sort_field))
        })?;
        let sort_direction = SortDirection::parse(&self.sort_direction).ok_or_else(|| {
            Error::decode(
                "settings row",
                format!("unknown direction token {:?}", self.sort_direction),
            )
        })?;
        Ok(LeaderboardSettings {
            game_id: self.game_id,
            category_id: self.category_id,
            run_status,
            variable_values: serde_json::from_str(&self.variable_values)?,
            one_run_per_player: self.one_run_per_player,
            sort_field,
            sort_direction,
        })
    }
}
