use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::{Game, GameRecord, ScoringCode};

/// Store shared between the scheduler and in-flight refresh cycles.
pub type SharedStore = Arc<RwLock<GameStore>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Merge was called for an event that was never created.
    #[error("no game tracked for event {0}")]
    UnknownEvent(String),
}

/// What a merge observed about the record's last play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub scoring: Option<ScoringCode>,
    /// Same last-play code and same score as before this merge
    pub repeated: bool,
}

/// All games seen since startup, keyed by event id.
///
/// Games are never removed; `ids()` yields them in first-seen order.
#[derive(Debug, Default)]
pub struct GameStore {
    games: HashMap<String, Game>,
    order: Vec<String>,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Build a game from `record` and insert it under its event id.
    ///
    /// The caller guarantees a non-empty event id. Creating an id that is
    /// already tracked replaces that game and keeps its position in `ids()`.
    pub fn create(&mut self, record: &GameRecord) -> &Game {
        self.create_at(record, Utc::now())
    }

    fn create_at(&mut self, record: &GameRecord, now: DateTime<Utc>) -> &Game {
        let id = record.event_id.clone();
        if !self.games.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.games.insert(id.clone(), Game::from_record(record, now));
        &self.games[&id]
    }

    /// Overwrite the live state of game `id` from `record`.
    pub fn merge(&mut self, id: &str, record: &GameRecord) -> Result<MergeOutcome, StoreError> {
        self.merge_at(id, record, Utc::now())
    }

    fn merge_at(
        &mut self,
        id: &str,
        record: &GameRecord,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, StoreError> {
        let game = self
            .games
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownEvent(id.to_string()))?;

        let repeated = game.scoring_event == record.last_play
            && game.home_score == record.home_score
            && game.away_score == record.away_score;

        // Two merges inside one clock tick must still move `updated` forward.
        let updated = if now > game.updated {
            now
        } else {
            game.updated + Duration::microseconds(1)
        };
        game.apply(record, updated);

        Ok(MergeOutcome {
            scoring: record.scoring_code(),
            repeated,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Game> {
        self.games.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.games.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Event ids in first-seen order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn completed_ids(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| self.games.get(id.as_str()).is_some_and(|g| g.completed))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, home: (&str, &str), away: (&str, &str), possession: &str) -> GameRecord {
        GameRecord {
            event_id: id.into(),
            event_name: format!("{} @ {}", away.0, home.0),
            home_team: home.0.into(),
            home_id: home.1.into(),
            away_team: away.0.into(),
            away_id: away.1.into(),
            possession_id: possession.into(),
            home_score: "0".into(),
            away_score: "0".into(),
            state: "in".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_sets_init_equal_updated() {
        let mut store = GameStore::new();
        let game = store.create(&record("A", ("HOU", "10"), ("IND", "11"), "11"));
        assert_eq!(game.init_time, game.updated);
        assert_eq!(game.possession, "IND");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_two_game_scenario() {
        let mut store = GameStore::new();
        store.create(&record("A", ("HOU", "10"), ("IND", "11"), "11"));
        store.create(&record("B", ("NE", "20"), ("BUF", "21"), "20"));

        assert_eq!(store.get("A").unwrap().possession, "IND");
        assert_eq!(store.get("B").unwrap().possession, "NE");
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_merge_updates_strictly_increase() {
        let mut store = GameStore::new();
        let rec = record("A", ("HOU", "10"), ("IND", "11"), "11");
        let now = Utc::now();
        store.create_at(&rec, now);
        let init = store.get("A").unwrap().init_time;

        let mut last = store.get("A").unwrap().updated;
        // Same timestamp and an older timestamp both still advance.
        for at in [now, now - Duration::seconds(5), now + Duration::seconds(3)] {
            store.merge_at("A", &rec, at).unwrap();
            let game = store.get("A").unwrap();
            assert!(game.updated > last);
            assert_eq!(game.init_time, init);
            last = game.updated;
        }
    }

    #[test]
    fn test_merge_recomputes_possession_every_time() {
        let mut store = GameStore::new();
        store.create(&record("A", ("HOU", "10"), ("IND", "11"), "11"));

        for (raw, expected) in [("10", "HOU"), ("11", "IND"), ("", "HOU"), ("42", "HOU"), ("11", "IND")] {
            let rec = record("A", ("HOU", "10"), ("IND", "11"), raw);
            store.merge("A", &rec).unwrap();
            assert_eq!(store.get("A").unwrap().possession, expected, "raw id {:?}", raw);
        }
    }

    #[test]
    fn test_merge_unknown_event_errors() {
        let mut store = GameStore::new();
        let rec = record("Z", ("HOU", "10"), ("IND", "11"), "11");
        assert_eq!(
            store.merge("Z", &rec),
            Err(StoreError::UnknownEvent("Z".into()))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_merge_reports_scoring_and_repeats() {
        let mut store = GameStore::new();
        let mut rec = record("A", ("HOU", "10"), ("IND", "11"), "11");
        store.create(&rec);

        rec.last_play = "TD".into();
        rec.away_score = "7".into();
        let first = store.merge("A", &rec).unwrap();
        assert_eq!(first.scoring, Some(ScoringCode::Touchdown));
        assert!(!first.repeated);

        let second = store.merge("A", &rec).unwrap();
        assert_eq!(second.scoring, Some(ScoringCode::Touchdown));
        assert!(second.repeated);

        rec.last_play = "KICKOFF".into();
        let third = store.merge("A", &rec).unwrap();
        assert_eq!(third.scoring, None);
        assert_eq!(store.get("A").unwrap().scoring_event, "KICKOFF");
    }

    #[test]
    fn test_completed_games_are_kept() {
        let mut store = GameStore::new();
        let mut rec = record("A", ("HOU", "10"), ("IND", "11"), "11");
        store.create(&rec);
        store.create(&record("B", ("NE", "20"), ("BUF", "21"), "20"));

        rec.completed = true;
        rec.state = "post".into();
        store.merge("A", &rec).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.completed_ids().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn test_state_regression_is_accepted() {
        let mut store = GameStore::new();
        let mut rec = record("A", ("HOU", "10"), ("IND", "11"), "11");
        rec.state = "post".into();
        rec.completed = true;
        store.create(&rec);

        rec.state = "in".into();
        rec.completed = false;
        store.merge("A", &rec).unwrap();
        let game = store.get("A").unwrap();
        assert_eq!(game.state, "in");
        assert!(!game.completed);
    }
}
