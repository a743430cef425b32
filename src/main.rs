use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod config;
mod feed;
mod games;
mod notify;
mod report;
mod rotation;
mod scheduler;

use config::Config;
use feed::{EspnScoreboard, FeedClient};
use report::ConsoleReporter;
use scheduler::{Scheduler, SchedulerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let feed: Arc<dyn FeedClient> = Arc::new(EspnScoreboard::new(
        &config.feed_url,
        Duration::from_secs(config.fetch_timeout_secs),
    )?);
    info!("Watching {} ({})", config.feed_url, feed.name());

    let mut scheduler = Scheduler::new(
        feed,
        Arc::new(ConsoleReporter),
        SchedulerOptions::from(&config),
    );

    let games = scheduler.initial_population().await?;
    info!("Initial snapshot: {} game(s)", games);

    scheduler.run().await
}
