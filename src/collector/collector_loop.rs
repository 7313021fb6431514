//! The collection state machine.
//!
//! `RUNNING` fetches and merges a batch, `ANALYZING` runs the analysis
//! pass, `WAITING` sleeps until the next cycle and `TERMINATED` ends the
//! run. Reaching the runtime ceiling and an operator stop are both normal
//! terminations that flush pending posts through one last analysis.

use crate::analysis::{run_analysis_pass, should_analyze, AnalysisOutcome, Analyzer};
use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::ratelimit::RateLimiter;
use crate::report::Notifier;
use crate::store::CollectionStore;
use anyhow::Result;
use chrono::Local;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Loop settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub target_count: usize,
    pub interval: Duration,
    pub max_runtime: Duration,
    pub cooldown: Duration,
    pub recipient: String,
}

impl From<&Config> for CollectorSettings {
    fn from(config: &Config) -> Self {
        Self {
            target_count: config.collector.target_count,
            interval: config.collector.interval(),
            max_runtime: config.collector.max_runtime(),
            cooldown: config.collector.cooldown(),
            recipient: config.email.recipient.clone(),
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Running,
    Waiting,
    Analyzing,
    Terminated,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorState::Running => write!(f, "RUNNING"),
            CollectorState::Waiting => write!(f, "WAITING"),
            CollectorState::Analyzing => write!(f, "ANALYZING"),
            CollectorState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    CeilingReached,
    Interrupted,
}

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: TerminationReason,
    pub cycles: usize,
    pub analyses: usize,
    pub elapsed: Duration,
}

/// The collection loop and everything it owns.
pub struct Collector<F, A, N> {
    settings: CollectorSettings,
    store: CollectionStore,
    limiter: RateLimiter,
    fetcher: F,
    analyzer: A,
    notifier: N,
    shutdown: watch::Receiver<bool>,
    state: CollectorState,
    cycles: usize,
    analyses: usize,
}

impl<F, A, N> Collector<F, A, N>
where
    F: FeedFetcher,
    A: Analyzer,
    N: Notifier,
{
    pub fn new(
        settings: CollectorSettings,
        store: CollectionStore,
        limiter: RateLimiter,
        fetcher: F,
        analyzer: A,
        notifier: N,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            store,
            limiter,
            fetcher,
            analyzer,
            notifier,
            shutdown,
            state: CollectorState::Running,
            cycles: 0,
            analyses: 0,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    fn transition(&mut self, next: CollectorState) {
        if self.state != next {
            debug!("{} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run cycles until the ceiling is reached or a stop is requested.
    pub async fn run(&mut self) -> RunSummary {
        let started = Instant::now();
        let max_runtime = self.settings.max_runtime;
        self.transition(CollectorState::Running);

        info!(
            "Starting continuous collection at {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        info!(
            "Will stop after {} (checking every {} minutes)",
            format_duration(max_runtime),
            self.settings.interval.as_secs() / 60
        );
        info!(
            "Current collection has {} posts",
            self.store.total_posts()
        );

        let reason = loop {
            if self.stop_requested() {
                info!("Collection stopped by user");
                break TerminationReason::Interrupted;
            }

            let elapsed = started.elapsed();
            if elapsed >= max_runtime {
                info!(
                    "Reached maximum runtime of {}",
                    format_duration(max_runtime)
                );
                break TerminationReason::CeilingReached;
            }

            self.transition(CollectorState::Running);
            self.cycles += 1;
            info!(
                "[{}] Fetching new posts ({} until shutdown)...",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                format_duration(max_runtime - elapsed)
            );

            let pause = match self.run_cycle().await {
                Ok(()) => self.settings.interval,
                Err(e) => {
                    error!("Error in collection loop: {:#}", e);
                    if self.store.has_pending() {
                        info!("Running analysis on collected posts before retry...");
                        self.analyze_best_effort().await;
                    }
                    self.settings.cooldown
                }
            };

            self.transition(CollectorState::Waiting);
            info!(
                "Waiting {} before next collection...",
                format_duration(pause)
            );
            if self.wait(pause).await {
                info!("Collection stopped by user");
                break TerminationReason::Interrupted;
            }
        };

        if self.store.has_pending() {
            info!("Running final analysis before exit...");
            self.analyze_best_effort().await;
        }

        self.transition(CollectorState::Terminated);
        let elapsed = started.elapsed();
        info!("Collection ended. Total runtime: {}", format_duration(elapsed));

        RunSummary {
            reason,
            cycles: self.cycles,
            analyses: self.analyses,
            elapsed,
        }
    }

    /// Fetch one batch and analyze whatever is pending, without looping.
    pub async fn run_once(&mut self) -> Result<Option<AnalysisOutcome>> {
        self.transition(CollectorState::Running);
        self.cycles += 1;
        self.fetch_and_merge().await?;

        let outcome = if self.store.has_pending() {
            Some(self.analyze().await?)
        } else {
            None
        };

        self.transition(CollectorState::Terminated);
        Ok(outcome)
    }

    /// One `RUNNING` step: fetch, merge, persist, maybe analyze.
    async fn run_cycle(&mut self) -> Result<()> {
        if self.fetch_and_merge().await?
            && should_analyze(self.store.collection(), self.settings.target_count)
        {
            self.analyze().await?;
            self.transition(CollectorState::Running);
        }
        Ok(())
    }

    /// Returns whether a batch was merged. Fetch failures are logged, not returned.
    async fn fetch_and_merge(&mut self) -> Result<bool> {
        match self.fetcher.fetch_batch(&mut self.limiter).await {
            Ok(batch) => {
                let added = self.store.merge(batch);
                self.store.persist()?;
                info!(
                    "Added {} new posts. Total posts collected: {}",
                    added,
                    self.store.total_posts()
                );
                Ok(true)
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("Failed to fetch posts: {}", e);
                } else {
                    error!("Failed to fetch posts: {}", e);
                }
                Ok(false)
            }
        }
    }

    async fn analyze(&mut self) -> Result<AnalysisOutcome> {
        self.transition(CollectorState::Analyzing);
        self.analyses += 1;

        run_analysis_pass(
            &mut self.store,
            &self.analyzer,
            &self.notifier,
            &self.settings.recipient,
        )
        .await
    }

    async fn analyze_best_effort(&mut self) {
        if let Err(e) = self.analyze().await {
            error!("Analysis pass failed: {:#}", e);
        }
    }

    /// Sleep for `duration`. Returns `true` if a stop was requested meanwhile.
    async fn wait(&mut self, duration: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }

        tokio::select! {
            _ = sleep(duration) => false,
            _ = stop_signalled(&mut self.shutdown) => true,
        }
    }
}

/// Resolves once the shutdown flag is `true`. Never resolves if the
/// sender is dropped without flipping it.
async fn stop_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// `H:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
