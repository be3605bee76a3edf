//! speedrun.com API integration

pub mod client;
pub mod wire;

pub use client::{
    GamesQuery, RunsRequest, SpeedrunClient, BULK_PAGE_SIZE, RUNS_PAGE_SIZE, SEARCH_PAGE_SIZE,
};
pub use wire::Page;

use crate::error::Result;
use crate::model::{FullGame, Game, Run};

/// Remote API surface consumed by the repository. The repository is the only
/// component allowed to decide network-vs-cache, so this seam is all it sees
/// of the network.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GamesApi: Send + Sync {
    async fn fetch_games(&self, query: &GamesQuery) -> Result<Page<Game>>;

    async fn fetch_full_game(&self, game_id: &str) -> Result<FullGame>;

    async fn fetch_runs(&self, request: &RunsRequest) -> Result<Page<Run>>;
}

#[async_trait::async_trait]
impl<T: GamesApi + ?Sized> GamesApi for std::sync::Arc<T> {
    async fn fetch_games(&self, query: &GamesQuery) -> Result<Page<Game>> {
        (**self).fetch_games(query).await
    }

    async fn fetch_full_game(&self, game_id: &str) -> Result<FullGame> {
        (**self).fetch_full_game(game_id).await
    }

    async fn fetch_runs(&self, request: &RunsRequest) -> Result<Page<Run>> {
        (**self).fetch_runs(request).await
    }
}

#[async_trait::async_trait]
impl GamesApi for SpeedrunClient {
    async fn fetch_games(&self, query: &GamesQuery) -> Result<Page<Game>> {
        SpeedrunClient::fetch_games(self, query).await
    }

    async fn fetch_full_game(&self, game_id: &str) -> Result<FullGame> {
        SpeedrunClient::fetch_full_game(self, game_id).await
    }

    async fn fetch_runs(&self, request: &RunsRequest) -> Result<Page<Run>> {
        SpeedrunClient::fetch_runs(self, request).await
    }
}
