use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::FeedClient;
use crate::games::GameRecord;

/// Feed client for the ESPN site API scoreboard.
/// e.g. <http://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard>
pub struct EspnScoreboard {
    http: Client,
    url: String,
}

impl EspnScoreboard {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EspnScoreboard {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl FeedClient for EspnScoreboard {
    fn name(&self) -> &str {
        "ESPN"
    }

    async fn fetch_snapshot(&self) -> Result<Vec<GameRecord>> {
        debug!("Fetching scoreboard from {}", self.url);

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Scoreboard request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Scoreboard error: {}", resp.status());
        }

        let raw: Value = resp
            .json()
            .await
            .context("Failed to parse scoreboard response")?;

        Ok(parse_scoreboard(&raw))
    }
}

/// Extract one record per element of the `events` array.
///
/// A missing `events` array is an empty snapshot. Events without an id are
/// skipped; any other missing field becomes its zero value.
pub fn parse_scoreboard(raw: &Value) -> Vec<GameRecord> {
    let events = match raw["events"].as_array() {
        Some(a) => a,
        None => return vec![],
    };

    events
        .iter()
        .filter_map(|ev| {
            let record = parse_event(ev);
            if record.event_id.is_empty() {
                warn!("Skipping scoreboard event without an id: {}", ev["shortName"]);
                None
            } else {
                Some(record)
            }
        })
        .collect()
}

fn parse_event(ev: &Value) -> GameRecord {
    let comp = &ev["competitions"][0];
    let situation = &comp["situation"];
    let status = &comp["status"];
    let (home, away) = home_and_away(comp);

    GameRecord {
        event_id: text(&ev["id"]),
        event_name: text(&ev["shortName"]),
        date: text(&ev["date"]),

        down_distance: text(&situation["shortDownDistanceText"]),
        spot: text(&situation["possessionText"]),
        redzone: situation["isRedZone"].as_bool().unwrap_or(false),
        possession_id: text(&situation["possession"]),
        game_clock: text(&status["displayClock"]),
        quarter: status["period"]
            .as_u64()
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(0),
        completed: status["type"]["completed"].as_bool().unwrap_or(false),
        state: text(&status["type"]["state"]),

        home_team: text(&home["team"]["abbreviation"]),
        home_id: text(&home["team"]["id"]),
        home_score: text(&home["score"]),

        away_team: text(&away["team"]["abbreviation"]),
        away_id: text(&away["team"]["id"]),
        away_score: text(&away["score"]),

        last_play: text(&situation["lastPlay"]["type"]["abbreviation"]),
    }
}

/// Pick the home and away competitors by their `homeAway` marker, falling
/// back to positions 0 and 1.
fn home_and_away(comp: &Value) -> (&Value, &Value) {
    let competitors = comp["competitors"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let side = |name: &str| {
        competitors
            .iter()
            .position(|c| c["homeAway"].as_str() == Some(name))
    };
    // First competitor other than `taken`; out of range (a null leaf) if none.
    let other = |taken: usize| {
        (0..competitors.len())
            .find(|&i| i != taken)
            .unwrap_or(competitors.len())
    };

    let (home, away) = match (side("home"), side("away")) {
        (Some(h), Some(a)) => (h, a),
        (Some(h), None) => (h, other(h)),
        (None, Some(a)) => (other(a), a),
        (None, None) => (0, 1),
    };
    (&comp["competitors"][home], &comp["competitors"][away])
}

/// String value of a JSON leaf. Numbers are rendered in their JSON form,
/// anything else is empty.
fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
