//! Embedded SQLite cache for the game catalog, leaderboard settings and run
//! selection.
//!
//! Single-writer, many-reader: all access goes through one connection behind
//! a mutex, every multi-row mutation is one transaction, and every effective
//! write pushes fresh values to the reactive subscriptions so readers never
//! re-issue queries.

mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::Result;
use crate::model::Game;
use crate::settings::LeaderboardSettings;
use schema::{game_from_row, SettingsRow};

const SCHEMA_VERSION: i32 = 1;

/// Upper bound on rows returned by a catalog search.
pub const SEARCH_RESULT_LIMIT: usize = 50;

/// Which logical table a committed write touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Games,
    Settings,
    Selection,
}

pub struct Store {
    conn: Mutex<Connection>,
    settings_tx: watch::Sender<LeaderboardSettings>,
    selection_tx: watch::Sender<Option<String>>,
    changes_tx: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// Open or create the cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let settings = read_settings(&conn)?;
        let selection = read_selection(&conn)?;

        let (settings_tx, _) = watch::channel(settings);
        let (selection_tx, _) = watch::channel(selection);
        let (changes_tx, _) = broadcast::channel(64);

        Ok(Self {
            conn: Mutex::new(conn),
            settings_tx,
            selection_tx,
            changes_tx,
        })
    }

    // ========== Game Catalog ==========

    /// Insert or overwrite games by id in a single transaction.
    pub fn upsert_games(&self, games: &[Game]) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO games (id, abbreviation, name) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         abbreviation = excluded.abbreviation,
                         name = excluded.name",
                )?;
                for game in games {
                    stmt.execute(params![game.id, game.abbreviation, game.name])?;
                }
            }
            tx.commit()?;
        }
        let _ = self.changes_tx.send(StoreEvent::Games);
        Ok(())
    }

    pub fn count_games(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?)
    }

    /// Case-insensitive name search. Each whitespace run in the query matches
    /// any text, so "super mario" finds "Super Something Mario Bros".
    pub fn search_games(&self, query: &str, limit: usize) -> Result<Vec<Game>> {
        let pattern = search_pattern(query);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, abbreviation, name FROM games
             WHERE name LIKE ?1 ESCAPE '\\'
             ORDER BY name ASC
             LIMIT ?2",
        )?;
        let games = stmt
            .query_map(params![pattern, limit as i64], game_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(games)
    }

    // ========== Settings ==========

    /// Current settings snapshot.
    pub fn settings(&self) -> LeaderboardSettings {
        self.settings_tx.borrow().clone()
    }

    /// Reactive settings stream; receivers always hold the latest committed
    /// value and are only woken by effective writes.
    pub fn watch_settings(&self) -> watch::Receiver<LeaderboardSettings> {
        self.settings_tx.subscribe()
    }

    /// Replace the settings row. A value equal to the stored one is a no-op:
    /// nothing is written and no subscriber wakes up. Returns whether the
    /// row changed.
    pub fn set_settings(&self, mut new: LeaderboardSettings) -> Result<bool> {
        new.dedup_variables();
        {
            let conn = self.conn.lock().unwrap();
            let tx = conn.unchecked_transaction()?;
            let current = read_settings(&tx)?;
            if current == new {
                return Ok(false);
            }
            write_settings_row(&tx, &new)?;
            tx.commit()?;
        }
        self.settings_tx.send_replace(new);
        let _ = self.changes_tx.send(StoreEvent::Settings);
        Ok(true)
    }

    /// Switch the selected game, clearing the category and variable filters
    /// that depend on it, all in one transaction. Re-selecting the current
    /// game is a no-op.
    pub fn set_selected_game(&self, game_id: Option<String>) -> Result<bool> {
        let updated = {
            let conn = self.conn.lock().unwrap();
            let tx = conn.unchecked_transaction()?;
            let mut settings = read_settings(&tx)?;
            if !settings.select_game(game_id) {
                return Ok(false);
            }
            write_settings_row(&tx, &settings)?;
            tx.commit()?;
            settings
        };
        self.settings_tx.send_replace(updated);
        let _ = self.changes_tx.send(StoreEvent::Settings);
        Ok(true)
    }

    // ========== Run Selection ==========

    pub fn selected_run(&self) -> Option<String> {
        self.selection_tx.borrow().clone()
    }

    pub fn watch_selected_run(&self) -> watch::Receiver<Option<String>> {
        self.selection_tx.subscribe()
    }

    /// Set or clear the selected run id, independent of the settings row.
    pub fn set_selected_run(&self, run_id: Option<String>) -> Result<bool> {
        {
            let conn = self.conn.lock().unwrap();
            let current = read_selection(&conn)?;
            if current == run_id {
                return Ok(false);
            }
            conn.execute(
                "UPDATE selection SET run_id = ?1 WHERE id = 1",
                params![run_id],
            )?;
        }
        self.selection_tx.send_replace(run_id);
        let _ = self.changes_tx.send(StoreEvent::Selection);
        Ok(true)
    }

    // ========== Subscriptions ==========

    /// Raw change feed, one event per committed effective write.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes_tx.subscribe()
    }

    /// Push fresh search results to the returned channel after every change
    /// to the games table. The first message carries the current results;
    /// the feed stops when the receiver is dropped.
    pub fn spawn_games_feed(
        self: Arc<Self>,
        query: String,
        limit: usize,
    ) -> mpsc::Receiver<Vec<Game>> {
        let (tx, rx) = mpsc::channel(8);
        let store = self;
        let mut changes = store.subscribe();

        tokio::spawn(async move {
            loop {
                let results = {
                    let store = Arc::clone(&store);
                    let query = query.clone();
                    tokio::task::spawn_blocking(move || store.search_games(&query, limit))
                        .await
                        .expect("cache task panicked")
                };
                let results = match results {
                    Ok(results) => results,
                    Err(err) => {
                        tracing::warn!(error = %err, "games feed query failed");
                        break;
                    }
                };
                if tx.send(results).await.is_err() {
                    break;
                }
                loop {
                    match changes.recv().await {
                        Ok(StoreEvent::Games) => break,
                        Ok(_) => continue,
                        // Missed events: refresh unconditionally.
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        rx
    }
}

/// Create-if-absent, stamp, short-circuit on version match. Any other stored
/// version means the cache predates this schema; it is disposable and gets
/// rebuilt wholesale.
fn init_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == SCHEMA_VERSION {
        return Ok(());
    }
    if version != 0 {
        tracing::warn!(
            found = version,
            expected = SCHEMA_VERSION,
            "schema version mismatch, rebuilding cache"
        );
        conn.execute_batch(
            "DROP TABLE IF EXISTS games;
             DROP TABLE IF EXISTS settings;
             DROP TABLE IF EXISTS selection;",
        )?;
    }

    conn.execute_batch(
        r#"
        -- Bulk game catalog, populated once and reused
        CREATE TABLE IF NOT EXISTS games (
            id TEXT PRIMARY KEY,
            abbreviation TEXT NOT NULL,
            name TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_games_name ON games(name);

        -- Singleton leaderboard view configuration
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            game_id TEXT,
            category_id TEXT,
            run_status TEXT NOT NULL,
            variable_values TEXT NOT NULL,
            one_run_per_player INTEGER NOT NULL,
            sort_field TEXT NOT NULL,
            sort_direction TEXT NOT NULL
        );

        -- Singleton run selection, independent of settings
        CREATE TABLE IF NOT EXISTS selection (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            run_id TEXT
        );
        "#,
    )?;

    let defaults = LeaderboardSettings::default();
    let variable_values = serde_json::to_string(&defaults.variable_values)?;
    conn.execute(
        "INSERT OR IGNORE INTO settings
             (id, game_id, category_id, run_status, variable_values,
              one_run_per_player, sort_field, sort_direction)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            defaults.game_id,
            defaults.category_id,
            defaults.run_status.as_str(),
            variable_values,
            defaults.one_run_per_player as i64,
            defaults.sort_field.as_str(),
            defaults.sort_direction.as_str(),
        ],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO selection (id, run_id) VALUES (1, NULL)",
        [],
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn write_settings_row(conn: &Connection, settings: &LeaderboardSettings) -> Result<()> {
    let variable_values = serde_json::to_string(&settings.variable_values)?;
    conn.execute(
        "UPDATE settings SET
             game_id = ?1,
             category_id = ?2,
             run_status = ?3,
             variable_values = ?4,
             one_run_per_player = ?5,
             sort_field = ?6,
             sort_direction = ?7
         WHERE id = 1",
        params![
            settings.game_id,
            settings.category_id,
            settings.run_status.as_str(),
            variable_values,
            settings.one_run_per_player as i64,
            settings.sort_field.as_str(),
            settings.sort_direction.as_str(),
        ],
    )?;
    Ok(())
}

fn read_settings(conn: &Connection) -> Result<LeaderboardSettings> {
    let row = conn.query_row(
        "SELECT game_id, category_id, run_status, variable_values,
                one_run_per_player, sort_field, sort_direction
         FROM settings WHERE id = 1",
        [],
        SettingsRow::from_row,
    )?;
    row.into_settings()
}

fn read_selection(conn: &Connection) -> Result<Option<String>> {
    Ok(conn.query_row("SELECT run_id FROM selection WHERE id = 1", [], |row| {
        row.get(0)
    })?)
}

/// Turn user input into a LIKE pattern: literal metacharacters are escaped
/// and each whitespace run becomes a multi-character wildcard.
fn search_pattern(query: &str) -> String {
    let mut pattern = String::from("%");
    for part in query.split_whitespace() {
        for c in part.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RunStatusFilter;

    fn game(id: &str, name: &str) -> Game {
        Game {
            id: id.to_string(),
            abbreviation: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn upsert_same_id_overwrites_in_place() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_games(&[game("g1", "First Name")]).unwrap();
        store.upsert_games(&[game("g1", "Second Name")]).unwrap();

        assert_eq!(store.count_games().unwrap(), 1);
        let found = store.search_games("second", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Second Name");
    }

    #[test]
    fn search_treats_spaces_as_wildcards() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_games(&[
                game("g1", "Super Something Mario Bros"),
                game("g2", "Mario Super Show"),
                game("g3", "Unrelated Game"),
            ])
            .unwrap();

        let found = store.search_games("super mario", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "g1");
    }

    #[test]
    fn search_is_case_insensitive_and_bounded() {
        let store = Store::open_in_memory().unwrap();
        let games: Vec<Game> = (0..10)
            .map(|i| game(&format!("g{i}"), &format!("Portal {i}")))
            .collect();
        store.upsert_games(&games).unwrap();

        assert_eq!(store.search_games("PORTAL", 3).unwrap().len(), 3);
    }

    #[test]
    fn search_escapes_like_metacharacters() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_games(&[game("g1", "100% Orange"), game("g2", "100x Orange")])
            .unwrap();

        let found = store.search_games("100%", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "g1");
    }

    #[test]
    fn settings_row_exists_with_defaults() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.settings(), LeaderboardSettings::default());
    }

    #[test]
    fn equal_settings_write_is_a_noop() {
        let store = Store::open_in_memory().unwrap();
        let mut rx = store.watch_settings();
        rx.borrow_and_update();

        assert!(!store.set_settings(store.settings()).unwrap());
        assert!(!rx.has_changed().unwrap());

        let mut changed = store.settings();
        changed.run_status = RunStatusFilter::Rejected;
        assert!(store.set_settings(changed).unwrap());
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn selecting_game_clears_dependent_filters() {
        let store = Store::open_in_memory().unwrap();
        let mut settings = store.settings();
        settings.game_id = Some("old".to_string());
        settings.category_id = Some("cat1".to_string());
        settings.set_variable("var1", "val1");
        store.set_settings(settings).unwrap();

        assert!(store.set_selected_game(Some("new".to_string())).unwrap());
        let settings = store.settings();
        assert_eq!(settings.game_id.as_deref(), Some("new"));
        assert_eq!(settings.category_id, None);
        assert!(settings.variable_values.is_empty());

        // Same game again: nothing changes.
        assert!(!store.set_selected_game(Some("new".to_string())).unwrap());
    }

    #[test]
    fn selected_run_is_independent_of_settings() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.selected_run(), None);

        assert!(store.set_selected_run(Some("run1".to_string())).unwrap());
        assert_eq!(store.selected_run().as_deref(), Some("run1"));
        assert!(!store.set_selected_run(Some("run1".to_string())).unwrap());

        store.set_selected_game(Some("game".to_string())).unwrap();
        assert_eq!(store.selected_run().as_deref(), Some("run1"));

        assert!(store.set_selected_run(None).unwrap());
        assert_eq!(store.selected_run(), None);
    }

    #[test]
    fn settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let store = Store::open(&path).unwrap();
            store.upsert_games(&[game("g1", "Persisted Game")]).unwrap();
            let mut settings = store.settings();
            settings.game_id = Some("g1".to_string());
            store.set_settings(settings).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_games().unwrap(), 1);
        assert_eq!(store.settings().game_id.as_deref(), Some("g1"));
    }

    #[test]
    fn version_mismatch_wipes_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let store = Store::open(&path).unwrap();
            store.upsert_games(&[game("g1", "Old Game")]).unwrap();
        }
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 99).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_games().unwrap(), 0);
        assert_eq!(store.settings(), LeaderboardSettings::default());
    }

    #[tokio::test]
    async fn games_feed_pushes_results_on_change() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut feed = Arc::clone(&store).spawn_games_feed("celeste".to_string(), 10);

        let initial = feed.recv().await.unwrap();
        assert!(initial.is_empty());

        store.upsert_games(&[game("g1", "Celeste")]).unwrap();
        let updated = feed.recv().await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].name, "Celeste");
    }
}
