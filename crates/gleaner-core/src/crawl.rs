use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::budget::{RunBudget, format_remaining};
use crate::checkpoint::RecordStore;
use crate::classify::{Recovery, TransientClassifier};
use crate::engagement::{EngagementConfig, EngagementHarvester};
use crate::error::HarvestError;
use crate::extract::RecordExtractor;
use crate::ledger::Ledger;
use crate::record::default_output_name;
use crate::session::{Authenticator, Selectors, SessionDriver};

pub const DEFAULT_OUTPUT_PREFIX: &str = "records";

/// Tunables for one harvesting run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Feed URL the main loop harvests.
    pub target_url: String,
    /// Checkpoint destination. `None` derives a timestamped name from
    /// `output_prefix`.
    pub output_path: Option<PathBuf>,
    pub output_prefix: String,
    /// Run the per-unit engagement sub-harvest for each new record.
    pub harvest_engagements: bool,
    pub selectors: Selectors,
    /// Independent login attempts before the run is abandoned.
    pub login_attempts: u32,
    /// Wait for the target feed to render after navigation.
    pub target_timeout: Duration,
    /// Wait for content units per fetch cycle.
    pub fetch_timeout: Duration,
    /// Settle pause after each scroll.
    pub scroll_pause: Duration,
    /// Per-unit retries when an element handle goes stale.
    pub stale_retries: u32,
    pub stale_pause: Duration,
    /// Settle time before clicking through a transient platform error.
    pub glitch_pause: Duration,
    pub engagement: EngagementConfig,
}

impl CrawlConfig {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            output_path: None,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            harvest_engagements: false,
            selectors: Selectors::default(),
            login_attempts: 3,
            target_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(3),
            scroll_pause: Duration::from_millis(1500),
            stale_retries: 3,
            stale_pause: Duration::from_millis(500),
            glitch_pause: Duration::from_secs(20),
            engagement: EngagementConfig::default(),
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_engagements(mut self, enabled: bool) -> Self {
        self.harvest_engagements = enabled;
        self
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_output_name(&self.output_prefix)))
    }
}

/// How a run ended. The first three are orderly terminations; the
/// remainder abandon or abort the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The time budget was consumed.
    TimeExhausted,
    /// Consecutive cycles produced no new records.
    Stagnated,
    /// Cancelled out-of-band at a cycle boundary.
    Aborted,
    /// Every login attempt failed. No collection happened.
    AuthenticationFailed { attempts: u32 },
    /// The target feed never rendered. No collection happened.
    TargetUnreachable { error: String },
    /// An unhandled error interrupted collection mid-run.
    Failed { error: String },
}

impl Outcome {
    /// Orderly terminations: the run did what it could and checkpointed.
    pub fn is_orderly(&self) -> bool {
        matches!(
            self,
            Outcome::TimeExhausted | Outcome::Stagnated | Outcome::Aborted
        )
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::TimeExhausted => write!(f, "time budget exhausted"),
            Outcome::Stagnated => write!(f, "feed stagnated"),
            Outcome::Aborted => write!(f, "aborted"),
            Outcome::AuthenticationFailed { attempts } => {
                write!(f, "authentication failed after {attempts} attempts")
            }
            Outcome::TargetUnreachable { error } => write!(f, "target unreachable: {error}"),
            Outcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Final accounting for one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: Outcome,
    /// Units inspected across all cycles, including re-renders.
    pub attempted: u64,
    /// New records admitted to the ledger.
    pub accepted: u64,
    /// Units skipped because their identity was already known.
    pub duplicates: u64,
    pub cycles: u64,
    /// Where the merged ledger was persisted, when it was.
    pub checkpoint: Option<PathBuf>,
    /// Records in the persisted checkpoint (prior plus new).
    pub total_persisted: usize,
}

/// Events emitted by the crawl loop for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    Started {
        run_id: Uuid,
        target_url: &'a str,
    },
    AuthAttempt {
        attempt: u32,
        max_attempts: u32,
    },
    Authenticated,
    TargetLoaded,
    Cycle {
        cycle: u64,
        remaining: Duration,
    },
    RecordAccepted {
        author: &'a str,
        total_new: usize,
    },
    DuplicateSkipped {
        author: &'a str,
    },
    StagnationTick {
        streak: u32,
        limit: u32,
    },
    Draining {
        outcome: &'a Outcome,
    },
    CheckpointWritten {
        path: &'a Path,
        total: usize,
    },
    CheckpointFailed {
        error: &'a str,
    },
    Finished {
        report: &'a RunReport,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl CrawlReporter for TracingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::Started { run_id, target_url } => {
                tracing::info!(%run_id, %target_url, "Run started");
            }
            CrawlEvent::AuthAttempt {
                attempt,
                max_attempts,
            } => {
                tracing::info!(attempt, max_attempts, "Attempting login");
            }
            CrawlEvent::Authenticated => {
                tracing::info!("Logged in");
            }
            CrawlEvent::TargetLoaded => {
                tracing::info!("Target feed loaded");
            }
            CrawlEvent::Cycle { cycle, remaining } => {
                tracing::debug!(cycle, remaining = %format_remaining(remaining), "Fetch cycle");
            }
            CrawlEvent::RecordAccepted { author, total_new } => {
                tracing::info!(%author, total_new, "Record accepted");
            }
            CrawlEvent::DuplicateSkipped { author } => {
                tracing::debug!(%author, "Duplicate skipped");
            }
            CrawlEvent::StagnationTick { streak, limit } => {
                tracing::debug!(streak, limit, "No new records this cycle");
            }
            CrawlEvent::Draining { outcome } => {
                tracing::info!(%outcome, "Run draining");
            }
            CrawlEvent::CheckpointWritten { path, total } => {
                tracing::info!(path = %path.display(), total, "Checkpoint written");
            }
            CrawlEvent::CheckpointFailed { error } => {
                tracing::error!(%error, "Checkpoint write failed");
            }
            CrawlEvent::Finished { report } => {
                tracing::info!(
                    run_id = %report.run_id,
                    outcome = %report.outcome,
                    accepted = report.accepted,
                    duplicates = report.duplicates,
                    cycles = report.cycles,
                    "Run finished"
                );
            }
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    attempted: u64,
    accepted: u64,
    duplicates: u64,
    cycles: u64,
}

/// Time-boxed, resumable harvesting loop.
///
/// Phases run in order: authenticate, load the target feed, then
/// fetch/extract/scroll cycles until the budget, the feed, or the
/// operator says stop. Every exit path after the feed has loaded
/// persists the merged ledger exactly once.
pub struct CrawlLoop<D, A, S>
where
    D: SessionDriver,
    A: Authenticator<D>,
    S: RecordStore,
{
    driver: D,
    auth: A,
    store: S,
    config: CrawlConfig,
    budget: RunBudget,
    ledger: Ledger,
    run_id: Uuid,
}

impl<D, A, S> CrawlLoop<D, A, S>
where
    D: SessionDriver,
    A: Authenticator<D>,
    S: RecordStore,
{
    pub fn new(
        driver: D,
        auth: A,
        store: S,
        config: CrawlConfig,
        budget: RunBudget,
        ledger: Ledger,
    ) -> Self {
        Self {
            driver,
            auth,
            store,
            config,
            budget,
            ledger,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drive the run to completion. Consumes the loop; the returned
    /// report is the single source of truth about what happened.
    pub async fn run<R: CrawlReporter>(
        mut self,
        cancel: CancellationToken,
        reporter: &R,
    ) -> RunReport {
        reporter.report(CrawlEvent::Started {
            run_id: self.run_id,
            target_url: &self.config.target_url,
        });

        let mut stats = RunStats::default();

        if let Some(outcome) = self.authenticate(reporter).await {
            // Nothing was collected yet, so there is nothing to persist.
            return self.finish(outcome, stats, None, reporter);
        }

        if let Err(err) = self.load_target().await {
            let outcome = Outcome::TargetUnreachable {
                error: err.to_string(),
            };
            return self.finish(outcome, stats, None, reporter);
        }
        reporter.report(CrawlEvent::TargetLoaded);

        let outcome = Self::run_cycles(
            &self.driver,
            &self.config,
            &self.budget,
            &mut self.ledger,
            &cancel,
            reporter,
            &mut stats,
        )
        .await;
        reporter.report(CrawlEvent::Draining { outcome: &outcome });

        let checkpoint = self.write_checkpoint(reporter).await;
        self.finish(outcome, stats, checkpoint, reporter)
    }

    /// Run the login sequence. `Some(outcome)` means the run is over
    /// before collection started.
    async fn authenticate<R: CrawlReporter>(&self, reporter: &R) -> Option<Outcome> {
        let max_attempts = self.config.login_attempts;
        for attempt in 1..=max_attempts {
            reporter.report(CrawlEvent::AuthAttempt {
                attempt,
                max_attempts,
            });
            match self.auth.attempt(&self.driver).await {
                Ok(true) => {
                    reporter.report(CrawlEvent::Authenticated);
                    return None;
                }
                Ok(false) => {
                    tracing::warn!(attempt, max_attempts, "Login attempt failed");
                }
                Err(err) => {
                    tracing::warn!(attempt, max_attempts, error = %err, "Login attempt errored");
                }
            }
        }
        Some(Outcome::AuthenticationFailed {
            attempts: max_attempts,
        })
    }

    async fn load_target(&self) -> Result<(), HarvestError> {
        self.driver.navigate(&self.config.target_url).await?;
        self.driver
            .wait_for_one(&self.config.selectors.content_unit, self.config.target_timeout)
            .await?;
        Ok(())
    }

    async fn run_cycles<R: CrawlReporter>(
        driver: &D,
        config: &CrawlConfig,
        budget: &RunBudget,
        ledger: &mut Ledger,
        cancel: &CancellationToken,
        reporter: &R,
        stats: &mut RunStats,
    ) -> Outcome {
        let sel = &config.selectors;
        let extractor =
            RecordExtractor::new(driver, sel, config.stale_retries, config.stale_pause);
        let classifier =
            TransientClassifier::new(driver, sel, config.glitch_pause, config.fetch_timeout);
        let harvester = EngagementHarvester::new(
            driver,
            sel,
            config.engagement.clone(),
            config.glitch_pause,
            cancel.clone(),
        );

        let mut stagnation_streak: u32 = 0;
        loop {
            // Cancellation and the deadline are only observed here, at
            // the cycle boundary. A cycle in flight always completes.
            if cancel.is_cancelled() {
                return Outcome::Aborted;
            }
            if budget.deadline_reached() {
                return Outcome::TimeExhausted;
            }

            stats.cycles += 1;
            reporter.report(CrawlEvent::Cycle {
                cycle: stats.cycles,
                remaining: budget.remaining(),
            });

            let units = match driver.wait_for_all(&sel.content_unit, config.fetch_timeout).await
            {
                Ok(units) => units,
                Err(err) if err.is_wait_timeout() => {
                    match classifier.classify_and_recover().await {
                        Ok(Recovery::Resumed) => continue,
                        Ok(Recovery::CleanEmpty) => Vec::new(),
                        Err(err) => {
                            return Outcome::Failed {
                                error: err.to_string(),
                            };
                        }
                    }
                }
                Err(err) => {
                    return Outcome::Failed {
                        error: err.to_string(),
                    };
                }
            };

            let mut accepted_this_cycle: u64 = 0;
            for unit in &units {
                stats.attempted += 1;
                let mut record = match extractor.extract(unit).await {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(err) => {
                        return Outcome::Failed {
                            error: err.to_string(),
                        };
                    }
                };

                // Dedup before the sub-harvest so known units never cost
                // a secondary context.
                if ledger.contains(&record.identity()) {
                    stats.duplicates += 1;
                    reporter.report(CrawlEvent::DuplicateSkipped {
                        author: &record.author,
                    });
                    continue;
                }

                if config.harvest_engagements {
                    record.engagement_texts = harvester.harvest(unit).await;
                }

                let author = record.author.clone();
                if ledger.accept(record) {
                    stats.accepted += 1;
                    accepted_this_cycle += 1;
                    reporter.report(CrawlEvent::RecordAccepted {
                        author: &author,
                        total_new: ledger.new_len(),
                    });
                } else {
                    stats.duplicates += 1;
                }
            }

            if accepted_this_cycle == 0 {
                stagnation_streak += 1;
                reporter.report(CrawlEvent::StagnationTick {
                    streak: stagnation_streak,
                    limit: budget.stagnation_limit(),
                });
                if stagnation_streak >= budget.stagnation_limit() {
                    return Outcome::Stagnated;
                }
            } else {
                stagnation_streak = 0;
            }

            if let Err(err) = driver.scroll_viewport().await {
                return Outcome::Failed {
                    error: err.to_string(),
                };
            }
            tokio::time::sleep(config.scroll_pause).await;
        }
    }

    /// Persist the merged ledger. Called exactly once per run, after any
    /// post-load exit. A failed write is reported but does not replace
    /// the outcome.
    async fn write_checkpoint<R: CrawlReporter>(&self, reporter: &R) -> Option<PathBuf> {
        let path = self.config.checkpoint_path();
        let merged = self.ledger.merged();
        match self.store.write(&path, &merged).await {
            Ok(()) => {
                reporter.report(CrawlEvent::CheckpointWritten {
                    path: &path,
                    total: merged.len(),
                });
                Some(path)
            }
            Err(err) => {
                reporter.report(CrawlEvent::CheckpointFailed {
                    error: &err.to_string(),
                });
                None
            }
        }
    }

    fn finish<R: CrawlReporter>(
        &self,
        outcome: Outcome,
        stats: RunStats,
        checkpoint: Option<PathBuf>,
        reporter: &R,
    ) -> RunReport {
        let report = RunReport {
            run_id: self.run_id,
            outcome,
            attempted: stats.attempted,
            accepted: stats.accepted,
            duplicates: stats.duplicates,
            cycles: stats.cycles,
            checkpoint,
            total_persisted: self.ledger.prior_len() + self.ledger.new_len(),
        };
        reporter.report(CrawlEvent::Finished { report: &report });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::session::NoAuth;
    use crate::testutil::{FakeUnit, FeedView, MemoryStore, RecordingReporter, ScriptedDriver};
    use chrono::{DateTime, Utc};

    fn record(time: &str, author: &str, body: &str) -> Record {
        Record::new(time.parse::<DateTime<Utc>>().unwrap(), author, body)
    }

    fn fast_config() -> CrawlConfig {
        let mut config = CrawlConfig::new("https://example.test/feed")
            .with_output("/tmp/ignored.json");
        config.target_timeout = Duration::from_millis(50);
        config.fetch_timeout = Duration::from_millis(50);
        config.scroll_pause = Duration::ZERO;
        config.stale_pause = Duration::ZERO;
        config.glitch_pause = Duration::ZERO;
        config.engagement.retry_pause = Duration::ZERO;
        config.engagement.menu_timeout = Duration::from_millis(50);
        config.engagement.fetch_timeout = Duration::from_millis(50);
        config.engagement.scroll_pause = Duration::ZERO;
        config
    }

    fn budget(limit: Duration, stagnation: u32) -> RunBudget {
        RunBudget::started(limit, stagnation)
    }

    #[tokio::test]
    async fn test_dedup_against_prior_and_in_session_records() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![
            FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hello"),
            FakeUnit::new("2024-03-01T08:05:00Z", "bob", "world"),
        ]));

        let prior = vec![record("2024-03-01T08:00:00Z", "alice", "hello")];
        let store = MemoryStore::default();
        let ledger = Ledger::seeded(prior.clone());

        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), 1),
            ledger,
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.outcome, Outcome::Stagnated);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.duplicates, 3);
        assert_eq!(report.attempted, 4);
        assert_eq!(report.total_persisted, 2);

        let written = store.last_write().expect("checkpoint written");
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], prior[0]);
        assert_eq!(written[1].author, "bob");
    }

    #[tokio::test]
    async fn test_stagnation_terminates_after_limit() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "hello",
        )]));

        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store,
            config,
            budget(Duration::from_secs(60), 3),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.outcome, Outcome::Stagnated);
        // One productive cycle, then the streak runs to the limit.
        assert_eq!(report.cycles, 4);
        assert_eq!(report.accepted, 1);
    }

    #[tokio::test]
    async fn test_deadline_terminates_run() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "hello",
        )]));

        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_millis(50), u32::MAX),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.outcome, Outcome::TimeExhausted);
        assert_eq!(report.accepted, 1);
        assert!(store.last_write().is_some());
    }

    #[tokio::test]
    async fn test_cancellation_at_cycle_boundary() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "hello",
        )]));

        let cancel = CancellationToken::new();
        let reporter = RecordingReporter::cancelling_on_cycle(2, cancel.clone());
        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), u32::MAX),
            Ledger::new(),
        )
        .run(cancel, &reporter)
        .await;

        assert_eq!(report.outcome, Outcome::Aborted);
        // The cycle in flight completed before the token was observed.
        assert_eq!(report.cycles, 2);
        assert!(store.last_write().is_some());
        assert!(reporter.saw("checkpoint_written"));
    }

    #[tokio::test]
    async fn test_auth_failure_abandons_without_checkpoint() {
        struct RejectingAuth;
        impl Authenticator<ScriptedDriver> for RejectingAuth {
            async fn attempt(&self, _driver: &ScriptedDriver) -> Result<bool, HarvestError> {
                Ok(false)
            }
        }

        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            RejectingAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), 3),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.outcome, Outcome::AuthenticationFailed { attempts: 3 });
        assert!(report.checkpoint.is_none());
        assert!(store.last_write().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_target_abandons_without_checkpoint() {
        let config = fast_config();
        // No staged views: the target feed never renders.
        let driver = ScriptedDriver::new(config.selectors.clone());
        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), 3),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert!(matches!(report.outcome, Outcome::TargetUnreachable { .. }));
        assert!(store.last_write().is_none());
    }

    #[tokio::test]
    async fn test_unhandled_fetch_state_checkpoints_partials() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "hello",
        )]));
        driver.stage_view(FeedView::Timeout);

        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), u32::MAX),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert!(matches!(report.outcome, Outcome::Failed { .. }));
        let written = store.last_write().expect("partial checkpoint written");
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].author, "alice");
    }

    #[tokio::test]
    async fn test_glitch_cycle_recovers_and_continues() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "hello",
        )]));
        driver.stage_view(FeedView::Timeout);
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:05:00Z",
            "bob",
            "world",
        )]));
        driver.push_notice(&config.selectors.glitch_text);

        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), 1),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.outcome, Outcome::Stagnated);
        assert_eq!(report.accepted, 2);
        let written = store.last_write().unwrap();
        assert_eq!(written.len(), 2);
    }

    #[tokio::test]
    async fn test_engagement_texts_attached_to_new_records() {
        let config = fast_config().with_engagements(true);
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![
            FakeUnit::new("2024-03-01T08:00:00Z", "alice", "hello")
                .with_engagement_href("/unit/1/engagements"),
        ]));
        driver.stage_engagement_feed("/unit/1/engagements", vec![vec!["nice".into()]]);

        let store = MemoryStore::default();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store.clone(),
            config,
            budget(Duration::from_secs(60), 1),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.accepted, 1);
        let written = store.last_write().unwrap();
        assert_eq!(written[0].engagement_texts, vec!["nice"]);
    }

    #[tokio::test]
    async fn test_failed_checkpoint_reports_but_keeps_outcome() {
        let config = fast_config();
        let driver = ScriptedDriver::new(config.selectors.clone());
        driver.stage_view(FeedView::Units(vec![FakeUnit::new(
            "2024-03-01T08:00:00Z",
            "alice",
            "hello",
        )]));

        let store = MemoryStore::failing_writes();
        let report = CrawlLoop::new(
            driver,
            NoAuth,
            store,
            config,
            budget(Duration::from_secs(60), 1),
            Ledger::new(),
        )
        .run(CancellationToken::new(), &TracingReporter)
        .await;

        assert_eq!(report.outcome, Outcome::Stagnated);
        assert!(report.checkpoint.is_none());
    }

    #[test]
    fn test_outcome_orderliness() {
        assert!(Outcome::TimeExhausted.is_orderly());
        assert!(Outcome::Stagnated.is_orderly());
        assert!(Outcome::Aborted.is_orderly());
        assert!(!Outcome::AuthenticationFailed { attempts: 3 }.is_orderly());
        assert!(
            !Outcome::Failed {
                error: "boom".into()
            }
            .is_orderly()
        );
    }
}
