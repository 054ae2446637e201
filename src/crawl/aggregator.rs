use crate::config::RunOptions;
use crate::crawl::fetcher::PacedFetcher;
use crate::crawl::tracker::FailureTracker;
use crate::error::Result;
use crate::models::{FetchOutcome, Record, Schema, WorkUnit};
use crate::scrapers::Site;
use crate::table::{FlushMarker, RecordSink};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Draining,
    Flushing,
    Done,
}

/// Everything a run accumulates. Owned by one aggregator for one run.
#[derive(Debug)]
struct RunState {
    phase: Phase,
    records: Vec<Record>,
    schema: Schema,
    tracker: FailureTracker,
    attempted: usize,
    succeeded: usize,
    recovered: usize,
    /// Index of the unit the latest checkpoint was taken after
    last_flushed: Option<usize>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            records: Vec::new(),
            schema: Schema::default(),
            tracker: FailureTracker::new(),
            attempted: 0,
            succeeded: 0,
            recovered: 0,
            last_flushed: None,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "run phase");
        self.phase = phase;
    }

    fn absorb(&mut self, records: Vec<Record>) {
        for record in &records {
            let added = self.schema.observe(record);
            if !added.is_empty() && self.schema.len() > added.len() {
                let preview: Vec<_> = added.iter().take(3).map(String::as_str).collect();
                info!(count = added.len(), "🆕 new fields: {}", preview.join(", "));
            }
        }
        self.records.extend(records);
    }

    fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        let failed = self.tracker.history().len();
        (self.attempted.saturating_sub(failed)) as f64 / self.attempted as f64 * 100.0
    }
}

/// Final accounting of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub units_attempted: usize,
    pub units_succeeded: usize,
    /// Failures recorded during the main pass, recovered or not
    pub failures_recorded: usize,
    /// Failed units that succeeded on the deferred pass
    pub recovered: usize,
    /// Units still failed after the deferred pass, in failure order
    pub unresolved: Vec<WorkUnit>,
    pub records: usize,
    pub columns: usize,
    pub elapsed: Duration,
    pub interrupted: bool,
    /// Index of the unit the latest checkpoint was taken after, if any
    pub last_checkpoint: Option<usize>,
    pub final_path: PathBuf,
}

impl RunSummary {
    pub fn records_per_minute(&self) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.records as f64 / minutes
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.units_attempted == 0 {
            return 0.0;
        }
        let failed = self.failures_recorded.saturating_sub(self.recovered);
        (self.units_attempted.saturating_sub(failed)) as f64 / self.units_attempted as f64 * 100.0
    }
}

/// Summary plus the records that went into the final file
#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub records: Vec<Record>,
}

/// Drives the sequential fetch loop, checkpoints, and the deferred retry pass.
pub struct Aggregator<S, K> {
    fetcher: PacedFetcher<S>,
    sink: K,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<S: Site, K: RecordSink> Aggregator<S, K> {
    pub fn new(fetcher: PacedFetcher<S>, sink: K, options: RunOptions) -> Self {
        Self {
            fetcher,
            sink,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the run early when the token fires; accumulated records are still written.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn fetcher(&self) -> &PacedFetcher<S> {
        &self.fetcher
    }

    /// Gives the site back once the run is over, for its own bookkeeping.
    pub fn into_site(self) -> S {
        self.fetcher.into_site()
    }

    /// Processes `units` in order, skipping those whose index is below `start_index`.
    pub async fn run<I>(&mut self, units: I, start_index: usize) -> Result<RunOutput>
    where
        I: IntoIterator<Item = WorkUnit>,
    {
        let source = self.fetcher.site().source_name();
        let started = Instant::now();
        let mut state = RunState::new();
        let mut interrupted = false;

        if start_index > 0 {
            info!(source, start_index, "resuming");
        }
        state.enter(Phase::Running);

        for unit in units.into_iter().skip_while(|u| u.index < start_index) {
            let Some(outcome) = self.fetch_or_cancel(&unit).await else {
                interrupted = true;
                break;
            };
            state.attempted += 1;

            match outcome {
                FetchOutcome::Success(records) => {
                    let count = records.len();
                    state.absorb(records);
                    state.succeeded += 1;
                    info!(
                        source,
                        unit = %unit,
                        count,
                        total = state.records.len(),
                        failed = state.tracker.history().len(),
                        success_rate = format!("{:.1}%", state.success_rate()),
                        "✅ fetched"
                    );
                }
                FetchOutcome::EmptySuccess => {
                    info!(source, unit = %unit, "🏁 no more data");
                    break;
                }
                FetchOutcome::Failure(reason) => {
                    warn!(source, unit = %unit, %reason, "unit failed, queued for retry");
                    state.tracker.record_failure(unit.clone());
                }
            }

            if self.options.should_flush(unit.index, state.attempted) {
                self.checkpoint(&mut state, &unit, started);
            }
        }

        let mut unresolved = Vec::new();
        if interrupted {
            warn!(source, attempted = state.attempted, "🛑 interrupted, writing what we have");
        } else if !state.tracker.is_empty() {
            state.enter(Phase::Draining);
            interrupted = self.drain(&mut state, &mut unresolved).await;
        }
        unresolved.extend(state.tracker.remaining().cloned());

        state.enter(Phase::Flushing);
        let final_path = self
            .sink
            .write(&FlushMarker::Final, &state.schema, &state.records)?;
        state.enter(Phase::Done);

        let summary = RunSummary {
            units_attempted: state.attempted,
            units_succeeded: state.succeeded,
            failures_recorded: state.tracker.history().len(),
            recovered: state.recovered,
            unresolved,
            records: state.records.len(),
            columns: state.schema.len(),
            elapsed: started.elapsed(),
            interrupted,
            last_checkpoint: state.last_flushed,
            final_path,
        };
        log_summary(source, &summary);

        Ok(RunOutput {
            summary,
            records: state.records,
        })
    }

    /// One bounded extra round over the oldest failures. Returns whether it was interrupted.
    async fn drain(&mut self, state: &mut RunState, unresolved: &mut Vec<WorkUnit>) -> bool {
        let source = self.fetcher.site().source_name();
        let batch = state.tracker.drain_for_retry(self.options.retry_limit);
        info!(
            source,
            retrying = batch.len(),
            not_retried = state.tracker.len(),
            "🔄 retrying failed units"
        );

        for (i, unit) in batch.iter().enumerate() {
            if i > 0 && !self.pause(self.options.retry_pause.sample()).await {
                unresolved.extend_from_slice(&batch[i..]);
                return true;
            }
            let Some(outcome) = self.fetch_or_cancel(unit).await else {
                unresolved.extend_from_slice(&batch[i..]);
                return true;
            };
            match outcome {
                FetchOutcome::Success(records) => {
                    info!(source, unit = %unit, count = records.len(), "✅ retry succeeded");
                    state.absorb(records);
                    state.succeeded += 1;
                    state.recovered += 1;
                }
                FetchOutcome::EmptySuccess => {
                    info!(source, unit = %unit, "retry found no data");
                    state.recovered += 1;
                }
                FetchOutcome::Failure(reason) => {
                    warn!(source, unit = %unit, %reason, "retry failed");
                    unresolved.push(unit.clone());
                }
            }
        }
        false
    }

    async fn fetch_or_cancel(&self, unit: &WorkUnit) -> Option<FetchOutcome> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = self.fetcher.fetch(unit) => Some(outcome),
        }
    }

    /// Sleeps unless cancelled first. Returns false on cancellation.
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    fn checkpoint(&mut self, state: &mut RunState, unit: &WorkUnit, started: Instant) {
        if state.records.is_empty() {
            return;
        }
        let marker = FlushMarker::Checkpoint(format!("temp_{}", unit.index + 1));
        match self.sink.write(&marker, &state.schema, &state.records) {
            Ok(path) => {
                state.last_flushed = Some(unit.index);
                let minutes = started.elapsed().as_secs_f64() / 60.0;
                let rate = if minutes > 0.0 {
                    state.records.len() as f64 / minutes
                } else {
                    0.0
                };
                info!(
                    path = %path.display(),
                    records = state.records.len(),
                    per_minute = format!("{:.1}", rate),
                    "💾 checkpoint"
                );
            }
            Err(e) => error!(unit = %unit, error = %e, "checkpoint failed, continuing"),
        }
    }
}

fn log_summary(source: &str, summary: &RunSummary) {
    info!(
        source,
        records = summary.records,
        columns = summary.columns,
        attempted = summary.units_attempted,
        recovered = summary.recovered,
        unresolved = summary.unresolved.len(),
        elapsed_min = format!("{:.1}", summary.elapsed.as_secs_f64() / 60.0),
        per_minute = format!("{:.1}", summary.records_per_minute()),
        success_rate = format!("{:.1}%", summary.success_rate()),
        path = %summary.final_path.display(),
        "🎉 run finished"
    );
    for unit in &summary.unresolved {
        warn!(source, unit = %unit, "unresolved failure");
    }
}
