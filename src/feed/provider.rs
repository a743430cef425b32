use anyhow::Result;
use async_trait::async_trait;

use crate::games::GameRecord;

/// Source of scoreboard snapshots.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch the current feed and return one record per game, in feed order.
    async fn fetch_snapshot(&self) -> Result<Vec<GameRecord>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
