use tracing::{debug, info, warn};

use crate::games::ScoringNotice;

/// Consumer of everything the scheduler surfaces.
pub trait Reporter: Send + Sync {
    /// A scoring play was observed for a game.
    fn scoring(&self, tick: u64, notice: &ScoringNotice);

    /// A quiet tick rotated the queue into `order`.
    fn rotation(&self, tick: u64, order: &[String]);

    /// A refresh cycle launched on `tick` could not fetch the feed.
    fn fetch_failed(&self, tick: u64, error: &anyhow::Error);
}

/// Writes everything through `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn scoring(&self, tick: u64, notice: &ScoringNotice) {
        info!(
            "🏈 [tick {}] scoring event in {} ({}): {} | {}-{}",
            tick,
            notice.event_id,
            notice.event_name,
            notice.code,
            notice.away_score,
            notice.home_score
        );
        if let Ok(json) = serde_json::to_string(notice) {
            debug!("notice: {}", json);
        }
    }

    fn rotation(&self, tick: u64, order: &[String]) {
        info!("[tick {}] no scoring event, rotation: {:?}", tick, order);
    }

    fn fetch_failed(&self, tick: u64, error: &anyhow::Error) {
        warn!("[tick {}] feed fetch failed: {:#}", tick, error);
    }
}
