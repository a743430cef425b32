use chrono::{DateTime, Utc};
use serde::Serialize;

/// One per-game record extracted from a feed snapshot.
///
/// Fields the feed omitted or sent in an unexpected shape are zero-valued
/// (empty string, `false`, `0`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameRecord {
    pub event_id: String,
    pub event_name: String,
    pub date: String,

    pub down_distance: String,
    /// Feed's possession text, e.g. "IND 34"
    pub spot: String,
    pub redzone: bool,
    /// Team id of the side in possession, as reported by the feed
    pub possession_id: String,
    pub game_clock: String,
    pub quarter: u32,
    pub completed: bool,
    /// "pre" | "in" | "post" on ESPN; any string is accepted
    pub state: String,

    pub home_team: String,
    pub home_id: String,
    pub home_score: String,

    pub away_team: String,
    pub away_id: String,
    pub away_score: String,

    /// Type abbreviation of the most recent play, e.g. "TD", "FG", "PASS"
    pub last_play: String,
}

impl GameRecord {
    /// Resolve the raw possession id to a team abbreviation.
    ///
    /// Anything other than the away team's id resolves to the home team.
    pub fn possession_team(&self) -> &str {
        if self.possession_id == self.away_id {
            &self.away_team
        } else {
            &self.home_team
        }
    }

    pub fn scoring_code(&self) -> Option<ScoringCode> {
        ScoringCode::from_abbreviation(&self.last_play)
    }
}

/// Play types that count as a scoring event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScoringCode {
    FieldGoal,
    Touchdown,
}

impl ScoringCode {
    pub fn from_abbreviation(code: &str) -> Option<Self> {
        match code {
            "FG" => Some(ScoringCode::FieldGoal),
            "TD" => Some(ScoringCode::Touchdown),
            _ => None,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            ScoringCode::FieldGoal => "FG",
            ScoringCode::Touchdown => "TD",
        }
    }
}

impl std::fmt::Display for ScoringCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Coarse lifecycle of a game, derived from the feed's status state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GamePhase {
    Pre,
    In,
    Post,
    Unknown(String),
}

impl GamePhase {
    pub fn from_state(state: &str) -> Self {
        match state {
            "pre" => GamePhase::Pre,
            "in" => GamePhase::In,
            "post" => GamePhase::Post,
            other => GamePhase::Unknown(other.to_string()),
        }
    }
}

/// Tracked state of one contest.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub event_id: String,
    pub event_name: String,
    pub date: String,
    pub init_time: DateTime<Utc>,
    /// Last time this game was present in a merged snapshot
    pub updated: DateTime<Utc>,

    pub down_distance: String,
    pub spot: String,
    pub redzone: bool,
    /// Abbreviation of the team in possession
    pub possession: String,
    pub game_clock: String,
    pub quarter: u32,
    pub completed: bool,
    pub state: String,
    /// Last-play code as reported by the feed; empty when none
    pub scoring_event: String,

    pub home_team: String,
    pub home_id: String,
    pub home_score: String,

    pub away_team: String,
    pub away_id: String,
    pub away_score: String,
}

impl Game {
    pub fn from_record(record: &GameRecord, now: DateTime<Utc>) -> Self {
        Game {
            event_id: record.event_id.clone(),
            event_name: record.event_name.clone(),
            date: record.date.clone(),
            init_time: now,
            updated: now,

            down_distance: record.down_distance.clone(),
            spot: record.spot.clone(),
            redzone: record.redzone,
            possession: record.possession_team().to_string(),
            game_clock: record.game_clock.clone(),
            quarter: record.quarter,
            completed: record.completed,
            state: record.state.clone(),
            scoring_event: record.last_play.clone(),

            home_team: record.home_team.clone(),
            home_id: record.home_id.clone(),
            home_score: record.home_score.clone(),

            away_team: record.away_team.clone(),
            away_id: record.away_id.clone(),
            away_score: record.away_score.clone(),
        }
    }

    /// Overwrite the live fields from `record`. Descriptive fields stay as
    /// they were at creation, and possession is resolved against this
    /// game's own team ids.
    pub fn apply(&mut self, record: &GameRecord, now: DateTime<Utc>) {
        self.updated = now;

        self.down_distance = record.down_distance.clone();
        self.spot = record.spot.clone();
        self.redzone = record.redzone;
        self.possession = if record.possession_id == self.away_id {
            self.away_team.clone()
        } else {
            self.home_team.clone()
        };
        self.game_clock = record.game_clock.clone();
        self.quarter = record.quarter;
        self.completed = record.completed;
        self.state = record.state.clone();
        self.scoring_event = record.last_play.clone();

        self.home_score = record.home_score.clone();
        self.away_score = record.away_score.clone();
    }

    pub fn phase(&self) -> GamePhase {
        GamePhase::from_state(&self.state)
    }

    pub fn scoreline(&self) -> String {
        format!(
            "{} {} - {} {}",
            self.away_team, self.away_score, self.home_score, self.home_team
        )
    }
}

/// A scoring play observed during a refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringNotice {
    pub event_id: String,
    pub event_name: String,
    pub code: ScoringCode,
    pub home_score: String,
    pub away_score: String,
    pub detected_at: DateTime<Utc>,
}
