//! HTTP client for the speedrun.com REST API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use crate::api::wire::{Envelope, FullGameResource, GameResource, Page, RunResource};
use crate::error::{Error, Result};
use crate::model::{FullGame, Game, Run};
use crate::settings::{LeaderboardSettings, RunStatusFilter, SortDirection, SortField};

const BASE_URL: &str = "https://www.speedrun.com/api/v1";
const CLIENT_AGENT: &str = concat!("splitscout/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for the unfiltered bulk game listing.
pub const BULK_PAGE_SIZE: u32 = 1000;
/// Page size for free-text game search.
pub const SEARCH_PAGE_SIZE: u32 = 20;
/// Page size for run listings.
pub const RUNS_PAGE_SIZE: u32 = 200;

const FULL_GAME_EMBEDS: &str = "categories.variables,moderators,levels";
const RUN_EMBEDS: &str = "players,level";

/// Query shape for the games endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GamesQuery {
    /// Unfiltered bulk listing, large fixed page size.
    Bulk { offset: u32 },
    /// Free-text name search, small page size. The remote service treats the
    /// text as a fuzzy name match.
    Name { text: String },
}

/// Parameters for one runs-endpoint page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunsRequest {
    pub game_id: String,
    pub category_id: Option<String>,
    pub status: RunStatusFilter,
    pub sort_field: Option<SortField>,
    pub sort_direction: SortDirection,
    pub offset: u32,
}

impl RunsRequest {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            category_id: None,
            status: RunStatusFilter::Any,
            sort_field: None,
            sort_direction: SortDirection::Desc,
            offset: 0,
        }
    }

    /// Merge the settings-derived filters the remote API can express into
    /// query parameters. Variable/value pairs and the one-run-per-player
    /// reduction are applied by the repository after fetching.
    pub fn from_settings(game_id: impl Into<String>, settings: &LeaderboardSettings) -> Self {
        Self {
            game_id: game_id.into(),
            category_id: settings.category_id.clone(),
            status: settings.run_status,
            sort_field: Some(settings.sort_field),
            sort_direction: settings.sort_direction,
            offset: 0,
        }
    }

    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("game", self.game_id.clone()),
            ("max", RUNS_PAGE_SIZE.to_string()),
            ("offset", self.offset.to_string()),
            ("embed", RUN_EMBEDS.to_string()),
        ];
        if let Some(category_id) = &self.category_id {
            params.push(("category", category_id.clone()));
        }
        if let Some(status) = self.status.wire_token() {
            params.push(("status", status.to_string()));
        }
        if let Some(sort_field) = self.sort_field {
            params.push(("orderby", sort_field.as_str().to_string()));
            params.push(("direction", self.sort_direction.as_str().to_string()));
        }
        params
    }
}

/// Typed client for the remote leaderboard service. Cheap to clone; no retry
/// logic lives here.
#[derive(Debug, Clone)]
pub struct SpeedrunClient {
    client: reqwest::Client,
    base_url: String,
}

impl SpeedrunClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    /// Point the client at a different base URL (local test servers).
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Agent", HeaderValue::from_static(CLIENT_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(CLIENT_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T>(
        &self,
        path: &str,
        params: &[(&str, String)],
        context: &'static str,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GET");

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::decode(context, e))
    }

    /// Fetch one page of the game listing, bulk or name-filtered.
    pub async fn fetch_games(&self, query: &GamesQuery) -> Result<Page<Game>> {
        let params = match query {
            GamesQuery::Bulk { offset } => vec![
                ("_bulk", "yes".to_string()),
                ("max", BULK_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ],
            GamesQuery::Name { text } => vec![
                ("name", text.clone()),
                ("max", SEARCH_PAGE_SIZE.to_string()),
            ],
        };

        let envelope: Envelope<Vec<GameResource>> =
            self.get_json("/games", &params, "games page").await?;
        let pagination = envelope
            .pagination
            .ok_or_else(|| Error::decode("games page", "missing pagination block"))?;
        Ok(Page::new(
            envelope.data.into_iter().map(Game::from).collect(),
            pagination,
        ))
    }

    /// Fetch a single game with categories, variables, moderators and levels
    /// inlined through the embed directive.
    pub async fn fetch_full_game(&self, game_id: &str) -> Result<FullGame> {
        let params = vec![("embed", FULL_GAME_EMBEDS.to_string())];
        let envelope: Envelope<FullGameResource> = self
            .get_json(&format!("/games/{game_id}"), &params, "full game")
            .await?;
        Ok(envelope.data.into())
    }

    /// Fetch one page of runs with embedded player and level data.
    pub async fn fetch_runs(&self, request: &RunsRequest) -> Result<Page<Run>> {
        let envelope: Envelope<Vec<RunResource>> = self
            .get_json("/runs", &request.query_params(), "runs page")
            .await?;
        let pagination = envelope
            .pagination
            .ok_or_else(|| Error::decode("runs page", "missing pagination block"))?;
        Ok(Page::new(
            envelope.data.into_iter().map(Run::from).collect(),
            pagination,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_request_merges_settings_filters() {
        let mut settings = LeaderboardSettings::default();
        settings.category_id = Some("cat1".to_string());
        settings.run_status = RunStatusFilter::Approved;
        settings.set_variable("var1", "val1");

        let request = RunsRequest::from_settings("game1", &settings);
        let params = request.query_params();

        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("game"), Some("game1"));
        assert_eq!(get("category"), Some("cat1"));
        assert_eq!(get("status"), Some("verified"));
        assert_eq!(get("orderby"), Some("date"));
        assert_eq!(get("direction"), Some("desc"));
        assert_eq!(get("embed"), Some("players,level"));
        // Variable selections never appear in the query string.
        assert!(params.iter().all(|(_, v)| v != "val1"));
    }

    #[test]
    fn any_status_sends_no_status_parameter() {
        let request = RunsRequest::new("game1");
        assert!(request.query_params().iter().all(|(k, _)| *k != "status"));
    }
}
