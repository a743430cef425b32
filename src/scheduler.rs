//! Tick loop tying the feed, the game store, the rotation queue and the
//! notification channel together.
//!
//! ```text
//!  interval tick ──▶ Scheduler::step
//!                      │ spawn ──▶ refresh_cycle ──fetch──▶ FeedClient
//!                      │              │ write lock: create / merge in feed order
//!                      │              └─ scoring plays ──▶ NotificationSender
//!                      │
//!                      └ poll_tick: drain notices (never blocks)
//!                           ├─ notices  → Reporter::scoring, no rotation
//!                           └─ none     → RotationQueue::rotate → Reporter::rotation
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::feed::FeedClient;
use crate::games::{GameRecord, GameStore, ScoringNotice, SharedStore};
use crate::notify::{
    notification_channel, NotificationReceiver, NotificationSender, OverflowPolicy, SendOutcome,
};
use crate::report::Reporter;
use crate::rotation::RotationQueue;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub interval: Duration,
    pub notify_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub suppress_repeat_scores: bool,
    pub resync_rotation: bool,
    pub drop_completed: bool,
    pub max_backoff_ticks: u32,
    pub exit_on_fetch_error: bool,
    pub startup_attempts: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            interval: Duration::from_secs(3),
            notify_capacity: 16,
            overflow_policy: OverflowPolicy::DropOldest,
            suppress_repeat_scores: false,
            resync_rotation: true,
            drop_completed: false,
            max_backoff_ticks: 8,
            exit_on_fetch_error: false,
            startup_attempts: 5,
        }
    }
}

impl From<&Config> for SchedulerOptions {
    fn from(config: &Config) -> Self {
        SchedulerOptions {
            interval: Duration::from_secs(config.tick_interval_secs),
            notify_capacity: config.notify_capacity,
            overflow_policy: config.overflow_policy.into(),
            suppress_repeat_scores: config.suppress_repeat_scores,
            resync_rotation: config.resync_rotation,
            drop_completed: config.drop_completed,
            max_backoff_ticks: config.max_backoff_ticks,
            exit_on_fetch_error: config.exit_on_fetch_error,
            startup_attempts: config.startup_attempts,
        }
    }
}

/// What a single tick surfaced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Notices were pending; the queue was left as is.
    Scoring(Vec<ScoringNotice>),
    /// Nothing pending; the queue rotated into this order.
    Rotated(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub records: usize,
    pub created: usize,
    pub merged: usize,
    pub notified: usize,
    pub suppressed: usize,
    pub dropped: usize,
}

/// Completion report of a refresh cycle, sent back to the scheduler.
#[derive(Debug)]
pub struct CycleResult {
    /// Tick that launched the cycle
    pub tick: u64,
    pub outcome: Result<CycleStats>,
}

/// One fetch-and-merge pass.
///
/// The whole snapshot is merged under a single write guard, so snapshots
/// from overlapping cycles never interleave. Games not seen before are
/// created rather than merged. Notices are sent once the guard is released.
pub async fn refresh_cycle(
    feed: Arc<dyn FeedClient>,
    store: SharedStore,
    notices: NotificationSender,
    suppress_repeats: bool,
) -> Result<CycleStats> {
    let records = feed
        .fetch_snapshot()
        .await
        .with_context(|| format!("{} fetch failed", feed.name()))?;

    let mut stats = CycleStats {
        records: records.len(),
        ..Default::default()
    };
    let mut pending = Vec::new();
    {
        let mut store = store.write().await;
        for record in &records {
            if !store.contains(&record.event_id) {
                let game = store.create(record);
                info!("New game discovered: {} ({})", game.event_id, game.event_name);
                stats.created += 1;
                continue;
            }

            let outcome = match store.merge(&record.event_id, record) {
                Ok(o) => o,
                Err(e) => {
                    error!("Internal error while merging snapshot: {}", e);
                    continue;
                }
            };
            stats.merged += 1;

            let Some(code) = outcome.scoring else {
                continue;
            };
            if suppress_repeats && outcome.repeated {
                stats.suppressed += 1;
                continue;
            }
            if let Some(game) = store.get(&record.event_id) {
                debug!(
                    "{} in {}: {} (Q{} {}, {:?})",
                    code,
                    game.event_name,
                    game.scoreline(),
                    game.quarter,
                    game.game_clock,
                    game.phase()
                );
            }
            pending.push(ScoringNotice {
                event_id: record.event_id.clone(),
                event_name: record.event_name.clone(),
                code,
                home_score: record.home_score.clone(),
                away_score: record.away_score.clone(),
                detected_at: Utc::now(),
            });
        }
    }

    for notice in pending {
        match notices.send(notice) {
            SendOutcome::Queued => stats.notified += 1,
            // Drop-oldest evictions surface as `Lagged` when the tick drains.
            SendOutcome::Rejected(new) => {
                stats.dropped += 1;
                warn!(
                    "Notification buffer full, notice DROPPED: {} {}",
                    new.event_id, new.code
                );
            }
        }
    }

    Ok(stats)
}

/// Ticks to sit out after `failures` consecutive failed fetches: the
/// refresh window doubles per failure up to `max_ticks`.
pub fn backoff_skip_ticks(failures: u32, max_ticks: u32) -> u32 {
    if failures == 0 {
        return 0;
    }
    let window = 1u32
        .checked_shl(failures - 1)
        .unwrap_or(u32::MAX)
        .min(max_ticks.max(1));
    window - 1
}

/// Delay before startup fetch attempt `attempt + 1`, with up to 250ms of jitter.
fn startup_delay(attempt: u32) -> Duration {
    let base_secs = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX)
        .min(30);
    let jitter_ms = rand::thread_rng().gen_range(0..=250u64);
    Duration::from_secs(base_secs) + Duration::from_millis(jitter_ms)
}

pub struct Scheduler {
    feed: Arc<dyn FeedClient>,
    store: SharedStore,
    rotation: RotationQueue,
    notify_tx: NotificationSender,
    notify_rx: NotificationReceiver,
    cycle_tx: mpsc::UnboundedSender<CycleResult>,
    cycle_rx: mpsc::UnboundedReceiver<CycleResult>,
    reporter: Arc<dyn Reporter>,
    options: SchedulerOptions,
    tick: u64,
    in_flight: usize,
    consecutive_failures: u32,
    skip_ticks: u32,
}

impl Scheduler {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        reporter: Arc<dyn Reporter>,
        options: SchedulerOptions,
    ) -> Self {
        let (notify_tx, notify_rx) =
            notification_channel(options.notify_capacity, options.overflow_policy);
        let (cycle_tx, cycle_rx) = mpsc::unbounded_channel();
        Scheduler {
            feed,
            store: GameStore::new().shared(),
            rotation: RotationQueue::new(),
            notify_tx,
            notify_rx,
            cycle_tx,
            cycle_rx,
            reporter,
            options,
            tick: 0,
            in_flight: 0,
            consecutive_failures: 0,
            skip_ticks: 0,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    #[cfg(test)]
    pub fn rotation_order(&self) -> Vec<String> {
        self.rotation.order()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Fetch the first snapshot, create every game in it and seed the
    /// rotation queue. Retries with jittered exponential backoff up to
    /// `startup_attempts` times.
    pub async fn initial_population(&mut self) -> Result<usize> {
        let mut attempt = 0;
        let records = loop {
            attempt += 1;
            match self.feed.fetch_snapshot().await {
                Ok(records) => break records,
                Err(e) if attempt < self.options.startup_attempts => {
                    let delay = startup_delay(attempt);
                    warn!(
                        "Initial {} fetch failed (attempt {}/{}): {:#}; retrying in {:?}",
                        self.feed.name(),
                        attempt,
                        self.options.startup_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "initial {} fetch failed after {} attempt(s)",
                        self.feed.name(),
                        attempt
                    )))
                }
            }
        };

        self.populate(&records).await;
        Ok(records.len())
    }

    /// Create a game per record and set the rotation to first-seen order.
    pub async fn populate(&mut self, records: &[GameRecord]) {
        let mut store = self.store.write().await;
        for record in records {
            store.create(record);
        }
        self.rotation.populate(store.ids());
        if store.is_empty() {
            warn!("Initial snapshot lists no games; waiting for the feed to add some");
        }
        info!("Tracking {} game(s): {:?}", store.len(), self.rotation.order());
    }

    /// One scheduler tick: collect finished cycles, launch a refresh unless
    /// backing off, then notify or rotate.
    pub fn step(&mut self) -> Result<TickOutcome> {
        while let Ok(result) = self.cycle_rx.try_recv() {
            self.handle_cycle_result(result)?;
        }

        if self.skip_ticks > 0 {
            self.skip_ticks -= 1;
            info!(
                "[tick {}] backing off after {} failed fetch(es), {} tick(s) left",
                self.tick, self.consecutive_failures, self.skip_ticks
            );
        } else {
            self.launch_refresh();
        }

        Ok(self.poll_tick())
    }

    fn launch_refresh(&mut self) {
        self.in_flight += 1;
        if self.in_flight > 1 {
            warn!(
                "[tick {}] {} refresh cycles in flight; fetches are slower than the tick interval",
                self.tick, self.in_flight
            );
        }

        let tick = self.tick;
        let feed = Arc::clone(&self.feed);
        let store = Arc::clone(&self.store);
        let notices = self.notify_tx.clone();
        let cycle_tx = self.cycle_tx.clone();
        let suppress = self.options.suppress_repeat_scores;

        tokio::spawn(async move {
            let outcome = refresh_cycle(feed, store, notices, suppress).await;
            // The receiver lives as long as the scheduler.
            let _ = cycle_tx.send(CycleResult { tick, outcome });
        });
    }

    fn handle_cycle_result(&mut self, result: CycleResult) -> Result<()> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result.outcome {
            Ok(stats) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "Feed recovered after {} failed fetch(es)",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                self.skip_ticks = 0;
                debug!(
                    "[tick {}] refresh cycle done: {} record(s), {} new, {} merged, {} notified, {} suppressed, {} dropped",
                    result.tick,
                    stats.records,
                    stats.created,
                    stats.merged,
                    stats.notified,
                    stats.suppressed,
                    stats.dropped
                );
            }
            Err(e) => {
                self.reporter.fetch_failed(result.tick, &e);
                if self.options.exit_on_fetch_error {
                    return Err(e.context(format!("refresh cycle for tick {} failed", result.tick)));
                }
                self.consecutive_failures += 1;
                self.skip_ticks =
                    backoff_skip_ticks(self.consecutive_failures, self.options.max_backoff_ticks);
                if self.skip_ticks > 0 {
                    warn!(
                        "{} consecutive failed fetch(es), skipping the next {} refresh(es)",
                        self.consecutive_failures, self.skip_ticks
                    );
                }
            }
        }
        Ok(())
    }

    /// Non-blocking half of a tick: report pending notices, or rotate the
    /// queue when there are none.
    pub fn poll_tick(&mut self) -> TickOutcome {
        let tick = self.tick;
        if self.options.resync_rotation {
            self.resync_rotation();
        }

        let notices = self.notify_rx.drain();
        let outcome = if notices.is_empty() {
            let order = self.rotation.rotate();
            self.reporter.rotation(tick, &order);
            TickOutcome::Rotated(order)
        } else {
            for notice in &notices {
                self.reporter.scoring(tick, notice);
            }
            TickOutcome::Scoring(notices)
        };

        self.tick += 1;
        outcome
    }

    fn resync_rotation(&mut self) {
        // A cycle holding the write guard just defers the resync to a later tick.
        let Ok(store) = self.store.try_read() else {
            debug!("[tick {}] store busy, rotation resync deferred", self.tick);
            return;
        };
        let (added, removed) =
            self.rotation
                .sync(store.ids(), store.completed_ids(), self.options.drop_completed);
        if added > 0 || removed > 0 {
            info!(
                "Rotation resynced: +{} -{} ({} queued)",
                added,
                removed,
                self.rotation.len()
            );
        }
    }

    /// Tick until Ctrl-C, or until a failed fetch when `exit_on_fetch_error`
    /// is set.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the first refresh waits a full interval.
        interval.tick().await;

        info!(
            "Scheduler started (feed={}, interval={:?}, games={})",
            self.feed.name(),
            self.options.interval,
            self.rotation.len()
        );
        if self.rotation.is_empty() && !self.options.resync_rotation {
            warn!("Rotation queue is empty and resync is disabled; ticks will not rotate any game");
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.step()?;
                }
                Some(result) = self.cycle_rx.recv() => {
                    self.handle_cycle_result(result)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(
                        "Shutting down after {} tick(s), {} notice(s) dropped on overflow",
                        self.tick_count(),
                        self.notify_rx.dropped()
                    );
                    return Ok(());
                }
            }
        }
    }
}
