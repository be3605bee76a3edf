//! Network/cache orchestration.
//!
//! The repository is the only component that decides between serving from the
//! local cache and fetching from the remote API. Errors from the client and
//! decoder pass through untouched; nothing below this layer retries or
//! substitutes default data.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{GamesApi, GamesQuery, RunsRequest};
use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::{FullGame, Game, Player, Run, ValuePair};
use crate::settings::LeaderboardSettings;

/// Defensive cap on sequential page fetches. A server that keeps returning
/// full pages past this point has broken the short-page sentinel, so the
/// loop fails instead of running forever.
const MAX_PAGES: u32 = 200;

/// Outcome of one catalog population pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePopulation {
    pub pages_fetched: u32,
    pub games_cached: usize,
    pub already_populated: bool,
}

pub struct Repository<A: GamesApi> {
    api: A,
    store: Arc<Store>,
}

impl<A: GamesApi> Repository<A> {
    pub fn new(api: A, store: Arc<Store>) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Free-text game search. Always network-backed; filtered results are
    /// never cached.
    pub async fn search_games(&self, text: &str) -> Result<Vec<Game>> {
        let page = self
            .api
            .fetch_games(&GamesQuery::Name {
                text: text.to_string(),
            })
            .await?;
        Ok(page.items)
    }

    /// Populate the game catalog on first run. No-ops with zero network
    /// calls when the cache already holds games; otherwise walks the bulk
    /// listing to exhaustion, reports one progress message per page, and
    /// commits everything in a single transaction.
    pub async fn cache_games_if_needed<F>(&self, progress: Option<F>) -> Result<CachePopulation>
    where
        F: Fn(&str) + Send + Sync,
    {
        let cached = self.with_store(|store| store.count_games()).await?;
        if cached > 0 {
            tracing::debug!(cached, "game catalog already populated");
            return Ok(CachePopulation {
                pages_fetched: 0,
                games_cached: cached as usize,
                already_populated: true,
            });
        }

        let mut games: Vec<Game> = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0u32;
        let mut pages = 0u32;

        loop {
            if pages >= MAX_PAGES {
                return Err(Error::Pagination { pages });
            }

            let page = self.api.fetch_games(&GamesQuery::Bulk { offset }).await?;
            if page.size > page.max {
                return Err(Error::Pagination { pages });
            }
            pages += 1;

            let fetched = page.items.len();
            let is_last = page.is_last();
            for game in page.items {
                if seen.insert(game.id.clone()) {
                    games.push(game);
                }
            }

            tracing::info!(page = pages, fetched, total = games.len(), "fetched catalog page");
            if let Some(ref callback) = progress {
                callback(&format!(
                    "Fetched page {pages} ({fetched} games, {} total)",
                    games.len()
                ));
            }

            if is_last {
                break;
            }
            offset += page.max;
        }

        let count = games.len();
        self.with_store(move |store| store.upsert_games(&games))
            .await?;
        tracing::info!(pages, games = count, "game catalog populated");

        Ok(CachePopulation {
            pages_fetched: pages,
            games_cached: count,
            already_populated: false,
        })
    }

    /// Full game metadata is considered too volatile to cache; every call
    /// fetches fresh.
    pub async fn full_game(&self, game_id: &str) -> Result<FullGame> {
        self.api.fetch_full_game(game_id).await
    }

    /// Fetch every page of runs for the request. The API guarantees no total
    /// count, so completion is detected only by the short-page sentinel.
    pub async fn runs(&self, request: &RunsRequest) -> Result<Vec<Run>> {
        self.runs_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Like [`runs`](Self::runs), but checks the token between pages; a
    /// cancelled loop returns [`Error::Cancelled`] without applying anything.
    pub async fn runs_cancellable(
        &self,
        request: &RunsRequest,
        token: &CancellationToken,
    ) -> Result<Vec<Run>> {
        let mut request = request.clone();
        let mut runs: Vec<Run> = Vec::new();
        let mut seen = HashSet::new();
        let mut pages = 0u32;

        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if pages >= MAX_PAGES {
                return Err(Error::Pagination { pages });
            }

            let page = self.api.fetch_runs(&request).await?;
            if page.size > page.max {
                return Err(Error::Pagination { pages });
            }
            pages += 1;

            // Pages can overlap when the listing shifts under us.
            let is_last = page.is_last();
            let page_max = page.max;
            for run in page.items {
                if seen.insert(run.id.clone()) {
                    runs.push(run);
                }
            }

            if is_last {
                break;
            }
            request.offset += page_max;
        }

        tracing::debug!(pages, runs = runs.len(), game = %request.game_id, "runs fetched");
        Ok(runs)
    }

    /// Fetch the runs described by the settings row. Game, category, status
    /// and sort order become query parameters; the variable selections and
    /// the one-run-per-player style are applied here because the remote API
    /// cannot express them.
    pub async fn cached_runs(&self, settings: &LeaderboardSettings) -> Result<Vec<Run>> {
        self.cached_runs_cancellable(settings, &CancellationToken::new())
            .await
    }

    pub async fn cached_runs_cancellable(
        &self,
        settings: &LeaderboardSettings,
        token: &CancellationToken,
    ) -> Result<Vec<Run>> {
        let Some(game_id) = settings.game_id.clone() else {
            return Ok(Vec::new());
        };

        let request = RunsRequest::from_settings(game_id, settings);
        let mut runs = self.runs_cancellable(&request, token).await?;

        if !settings.variable_values.is_empty() {
            runs.retain(|run| matches_filters(run, &settings.variable_values));
        }
        if settings.one_run_per_player {
            runs = first_run_per_player(runs);
        }
        Ok(runs)
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .expect("cache task panicked")
    }
}

fn matches_filters(run: &Run, filters: &[ValuePair]) -> bool {
    filters.iter().all(|pair| run.values.contains(pair))
}

/// Keep each player line-up's first run in the current sort order.
fn first_run_per_player(runs: Vec<Run>) -> Vec<Run> {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut kept = Vec::with_capacity(runs.len());
    for run in runs {
        let key: Vec<String> = run.players.iter().map(player_key).collect();
        if seen.insert(key) {
            kept.push(run);
        }
    }
    kept
}

fn player_key(player: &Player) -> String {
    match player {
        Player::User(user) => format!("user:{}", user.id),
        Player::Guest { name, .. } => format!("guest:{}", name.to_lowercase()),
    }
}
