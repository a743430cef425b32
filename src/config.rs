use clap::{Parser, ValueEnum};

use crate::notify::OverflowPolicy;

/// Live scoreboard watcher: polls the feed, tracks games, announces scoring plays
#[derive(Parser, Debug, Clone)]
#[command(name = "scoreboard-watch", version, about)]
pub struct Config {
    /// Scoreboard feed URL
    #[arg(
        long,
        env = "FEED_URL",
        default_value = "http://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard"
    )]
    pub feed_url: String,

    /// Scheduler tick interval in seconds
    #[arg(long, env = "TICK_INTERVAL_SECS", default_value = "3")]
    pub tick_interval_secs: u64,

    /// HTTP timeout for a single feed fetch in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "10")]
    pub fetch_timeout_secs: u64,

    /// Maximum number of scoring notices buffered between ticks
    #[arg(long, env = "NOTIFY_CAPACITY", default_value = "16")]
    pub notify_capacity: usize,

    /// Which notice to discard when the notification buffer is full
    #[arg(long, env = "OVERFLOW_POLICY", value_enum, default_value = "drop-oldest")]
    pub overflow_policy: PolicyArg,

    /// Only notify when a scoring play differs from the last one seen for that game
    #[arg(long, env = "SUPPRESS_REPEAT_SCORES", default_value = "false")]
    pub suppress_repeat_scores: bool,

    /// Add games discovered after startup to the rotation queue
    #[arg(
        long,
        env = "RESYNC_ROTATION",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub resync_rotation: bool,

    /// Remove completed games from the rotation queue (requires --resync-rotation)
    #[arg(long, env = "DROP_COMPLETED", default_value = "false")]
    pub drop_completed: bool,

    /// Upper bound, in ticks, of the pause between refreshes after failed fetches
    #[arg(long, env = "MAX_BACKOFF_TICKS", default_value = "8")]
    pub max_backoff_ticks: u32,

    /// Terminate the process when a feed fetch fails instead of backing off
    #[arg(long, env = "EXIT_ON_FETCH_ERROR", default_value = "false")]
    pub exit_on_fetch_error: bool,

    /// Number of attempts for the initial feed fetch before giving up
    #[arg(long, env = "STARTUP_ATTEMPTS", default_value = "5")]
    pub startup_attempts: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    DropOldest,
    DropNewest,
}

impl From<PolicyArg> for OverflowPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::DropOldest => OverflowPolicy::DropOldest,
            PolicyArg::DropNewest => OverflowPolicy::DropNewest,
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.feed_url)
            .map_err(|e| anyhow::anyhow!("feed_url '{}' is not a valid URL: {}", self.feed_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("feed_url must use http or https, got '{}'", url.scheme());
        }
        if self.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be positive");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be positive");
        }
        if self.notify_capacity == 0 {
            anyhow::bail!("notify_capacity must be at least 1");
        }
        if self.max_backoff_ticks == 0 {
            anyhow::bail!("max_backoff_ticks must be at least 1");
        }
        if self.startup_attempts == 0 {
            anyhow::bail!("startup_attempts must be at least 1");
        }
        if self.drop_completed && !self.resync_rotation {
            anyhow::bail!("--drop-completed has no effect without --resync-rotation");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["scoreboard-watch"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        assert_eq!(config.tick_interval_secs, 3);
        assert_eq!(config.overflow_policy, PolicyArg::DropOldest);
        assert!(config.resync_rotation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_url() {
        let config = parse(&["--feed-url", "not a url"]);
        assert!(config.validate().is_err());

        let config = parse(&["--feed-url", "ftp://example.com/feed"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interval_and_capacity() {
        assert!(parse(&["--tick-interval-secs", "0"]).validate().is_err());
        assert!(parse(&["--notify-capacity", "0"]).validate().is_err());
    }

    #[test]
    fn test_drop_completed_requires_resync() {
        let config = parse(&["--resync-rotation", "false", "--drop-completed"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_conversion() {
        let config = parse(&["--overflow-policy", "drop-newest"]);
        assert_eq!(
            OverflowPolicy::from(config.overflow_policy),
            OverflowPolicy::DropNewest
        );
    }
}
