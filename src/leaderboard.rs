//! Settings-driven leaderboard refresh.
//!
//! A long-lived worker observes the settings stream and keeps a leaderboard
//! snapshot current: every settings change cancels the in-flight refresh and
//! starts exactly one new one, so the published state always reflects the
//! most recently requested configuration. A cancelled refresh publishes
//! nothing.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::GamesApi;
use crate::model::{FullGame, Run};
use crate::repo::Repository;
use crate::settings::LeaderboardSettings;

/// Published snapshot of the leaderboard view.
#[derive(Debug, Clone, Default)]
pub enum LeaderboardState {
    /// No game selected.
    #[default]
    Idle,
    Loading {
        game_id: String,
    },
    Ready {
        game: Arc<FullGame>,
        runs: Vec<Run>,
    },
    Failed {
        game_id: String,
        message: String,
    },
}

/// One logical request slot: beginning a new request cancels the previous
/// one.
#[derive(Default)]
struct RequestSlot {
    current: Option<CancellationToken>,
}

impl RequestSlot {
    fn begin(&mut self) -> CancellationToken {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.current = Some(token.clone());
        token
    }
}

type SessionGame = Arc<Mutex<Option<Arc<FullGame>>>>;

pub struct LeaderboardWorker {
    handle: JoinHandle<()>,
    state_rx: watch::Receiver<LeaderboardState>,
}

impl LeaderboardWorker {
    /// Spawn the worker on the current runtime. It runs until dropped.
    pub fn spawn<A: GamesApi + 'static>(repo: Arc<Repository<A>>) -> Self {
        let (state_tx, state_rx) = watch::channel(LeaderboardState::Idle);
        let mut settings_rx = repo.store().watch_settings();
        let session_game: SessionGame = SessionGame::default();

        let handle = tokio::spawn(async move {
            let mut slot = RequestSlot::default();
            loop {
                let settings = settings_rx.borrow_and_update().clone();
                let token = slot.begin();
                let repo = Arc::clone(&repo);
                let state_tx = state_tx.clone();
                let session_game = Arc::clone(&session_game);
                tokio::spawn(async move {
                    refresh(repo, settings, token, state_tx, session_game).await;
                });

                if settings_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Self { handle, state_rx }
    }

    /// Subscribe to the published leaderboard state.
    pub fn state(&self) -> watch::Receiver<LeaderboardState> {
        self.state_rx.clone()
    }
}

impl Drop for LeaderboardWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn refresh<A: GamesApi>(
    repo: Arc<Repository<A>>,
    settings: LeaderboardSettings,
    token: CancellationToken,
    state_tx: watch::Sender<LeaderboardState>,
    session_game: SessionGame,
) {
    let Some(game_id) = settings.game_id.clone() else {
        session_game.lock().await.take();
        if !token.is_cancelled() {
            let _ = state_tx.send(LeaderboardState::Idle);
        }
        return;
    };

    if token.is_cancelled() {
        return;
    }
    let _ = state_tx.send(LeaderboardState::Loading {
        game_id: game_id.clone(),
    });

    // The full game is fetched once per game-selection change and reused for
    // filter-only refreshes within the session.
    let cached = {
        let guard = session_game.lock().await;
        guard.as_ref().filter(|game| game.id == game_id).cloned()
    };
    let game = match cached {
        Some(game) => game,
        None => {
            let fetched = tokio::select! {
                _ = token.cancelled() => return,
                result = repo.full_game(&game_id) => result,
            };
            match fetched {
                Ok(game) => {
                    let game = Arc::new(game);
                    if token.is_cancelled() {
                        return;
                    }
                    *session_game.lock().await = Some(Arc::clone(&game));
                    game
                }
                Err(err) => {
                    tracing::warn!(game = %game_id, error = %err, "full game fetch failed");
                    if !token.is_cancelled() {
                        let _ = state_tx.send(LeaderboardState::Failed {
                            game_id,
                            message: err.to_string(),
                        });
                    }
                    return;
                }
            }
        }
    };

    match repo.cached_runs_cancellable(&settings, &token).await {
        Ok(runs) => {
            if !token.is_cancelled() {
                let _ = state_tx.send(LeaderboardState::Ready { game, runs });
            }
        }
        Err(err) if err.is_cancelled() => {}
        Err(err) => {
            tracing::warn!(game = %game_id, error = %err, "leaderboard refresh failed");
            if !token.is_cancelled() {
                let _ = state_tx.send(LeaderboardState::Failed {
                    game_id,
                    message: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::api::{GamesApi, GamesQuery, Page, RunsRequest};
    use crate::db::Store;
    use crate::error::Result;
    use crate::model::{
        Category, CategoryType, Game, Player, PlayerCount, Run, RunStatus, RunTimes, Ruleset,
        TimingMethod, User, UserRole,
    };
    use crate::settings::RunStatusFilter;

    fn full_game(id: &str) -> FullGame {
        FullGame {
            id: id.to_string(),
            abbreviation: id.to_string(),
            name: format!("Game {id}"),
            weblink: format!("https://example.test/{id}"),
            released: 2004,
            release_date: None,
            added: None,
            ruleset: Ruleset {
                show_milliseconds: false,
                require_verification: true,
                require_video: false,
                emulators_allowed: true,
                run_times: vec![TimingMethod::Realtime],
                default_time: TimingMethod::Realtime,
            },
            romhack: false,
            gametype_ids: Vec::new(),
            platform_ids: Vec::new(),
            region_ids: Vec::new(),
            genre_ids: Vec::new(),
            engine_ids: Vec::new(),
            developer_ids: Vec::new(),
            publisher_ids: Vec::new(),
            moderators: Vec::new(),
            categories: vec![Category {
                id: "cat1".to_string(),
                name: "Any%".to_string(),
                weblink: format!("https://example.test/{id}#Any"),
                kind: CategoryType::PerGame,
                rules: None,
                players: PlayerCount::Exactly(1),
                miscellaneous: false,
                variables: Vec::new(),
            }],
            levels: Vec::new(),
        }
    }

    fn run(id: &str) -> Run {
        Run {
            id: id.to_string(),
            weblink: format!("https://example.test/runs/{id}"),
            game_id: "abc123".to_string(),
            category_id: "cat1".to_string(),
            level_id: None,
            status: RunStatus::Pending,
            players: vec![Player::User(User {
                id: "u1".to_string(),
                name: "runner1".to_string(),
                role: UserRole::User,
                country_code: None,
                weblink: "https://example.test/users/u1".to_string(),
            })],
            values: Vec::new(),
            times: RunTimes::default(),
            date: None,
            submitted: None,
            video_links: Vec::new(),
            splits_link: None,
        }
    }

    /// Scripted client: the first runs fetch blocks until released so the
    /// test can supersede it mid-flight.
    struct ScriptedApi {
        first_runs_entered: Notify,
        release_first_runs: Notify,
        full_game_calls: AtomicU32,
        runs_calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new() -> Self {
            Self {
                first_runs_entered: Notify::new(),
                release_first_runs: Notify::new(),
                full_game_calls: AtomicU32::new(0),
                runs_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl GamesApi for ScriptedApi {
        async fn fetch_games(&self, _query: &GamesQuery) -> Result<Page<Game>> {
            panic!("leaderboard refresh must not touch the games endpoint");
        }

        async fn fetch_full_game(&self, game_id: &str) -> Result<FullGame> {
            self.full_game_calls.fetch_add(1, Ordering::SeqCst);
            Ok(full_game(game_id))
        }

        async fn fetch_runs(&self, _request: &RunsRequest) -> Result<Page<Run>> {
            let call = self.runs_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let items = if call == 1 {
                self.first_runs_entered.notify_one();
                self.release_first_runs.notified().await;
                vec![run("stale")]
            } else {
                vec![run("fresh")]
            };
            let size = items.len() as u32;
            Ok(Page {
                items,
                offset: 0,
                max: 200,
                size,
            })
        }
    }

    async fn wait_for_ready(
        state: &mut watch::Receiver<LeaderboardState>,
    ) -> (Arc<FullGame>, Vec<Run>) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let current = state.borrow_and_update().clone();
                if let LeaderboardState::Ready { game, runs } = current {
                    return (game, runs);
                }
                state.changed().await.unwrap();
            }
        })
        .await
        .expect("leaderboard never became ready")
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_refresh_is_cancelled_and_publishes_nothing() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let api = Arc::new(ScriptedApi::new());
        let repo = Arc::new(Repository::new(Arc::clone(&api), Arc::clone(&store)));
        let worker = LeaderboardWorker::spawn(repo);
        let mut state = worker.state();

        store.set_selected_game(Some("abc123".to_string())).unwrap();

        // First refresh is now blocked inside its run fetch.
        tokio::time::timeout(Duration::from_secs(10), api.first_runs_entered.notified())
            .await
            .expect("first refresh never started fetching runs");

        // Supersede it with a status-filter change.
        let mut settings = store.settings();
        settings.run_status = RunStatusFilter::Pending;
        store.set_settings(settings).unwrap();

        let (game, runs) = wait_for_ready(&mut state).await;
        assert_eq!(game.id, "abc123");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "fresh");

        // Let the cancelled refresh run to completion; it must not overwrite
        // the published state with its stale result.
        api.release_first_runs.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = state.borrow().clone();
        match current {
            LeaderboardState::Ready { runs, .. } => assert_eq!(runs[0].id, "fresh"),
            other => panic!("expected ready state, got {other:?}"),
        }

        // One game selection, one full-game fetch; both refreshes shared it.
        assert_eq!(api.full_game_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.runs_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clearing_the_game_returns_to_idle() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let api = Arc::new(ScriptedApi::new());
        api.release_first_runs.notify_one();
        let repo = Arc::new(Repository::new(Arc::clone(&api), Arc::clone(&store)));
        let worker = LeaderboardWorker::spawn(repo);
        let mut state = worker.state();

        store.set_selected_game(Some("abc123".to_string())).unwrap();
        wait_for_ready(&mut state).await;

        store.set_selected_game(None).unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if matches!(*state.borrow_and_update(), LeaderboardState::Idle) {
                    break;
                }
                state.changed().await.unwrap();
            }
        })
        .await
        .expect("leaderboard never went idle");
    }

    #[test]
    fn request_slot_cancels_the_previous_token() {
        let mut slot = RequestSlot::default();
        let first = slot.begin();
        assert!(!first.is_cancelled());
        let second = slot.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }
}
