//! Harvest coordinator - run orchestration
//!
//! This module drives one harvest run:
//! - Loading the checkpoint and progress state
//! - Paging through new parents and enriching them with permalinks
//! - Advancing the checkpoint once the parent pass has fully succeeded
//! - Fanning out reply fetches and recording progress as each parent settles
//! - Emitting the ordered streams and closing the pass

use crate::config::Config;
use crate::crawler::api::SlackApi;
use crate::crawler::parents::ParentFetcher;
use crate::crawler::permalinks::attach_permalinks;
use crate::crawler::replies::{ParentFailure, ReplyFetcher};
use crate::crawler::transport::{
    build_http_client, RateLimitedTransport, RetryPolicy, StopFlag, TransportError,
};
use crate::model::Position;
use crate::output::{open_sink, write_parent_csv, RunRecord, RunStatus, Sink};
use crate::storage::{CheckpointStore, ProgressState, ProgressTracker};
use crate::{ConfigError, HarvestError};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What one run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// New parents with replies found this run
    pub parents_fetched: usize,

    /// New parents skipped because they have no replies
    pub parents_without_replies: usize,

    pub permalinks_resolved: usize,

    /// Parents whose replies were written this run
    pub parents_completed: usize,

    pub replies_fetched: usize,

    /// Parents that failed this run and remain eligible for retry
    pub failures: Vec<ParentFailure>,

    /// Parents dropped after reaching the attempt cap
    pub abandoned: Vec<String>,

    /// Parents still awaiting replies when the run ended
    pub pending: usize,

    /// Checkpoint in effect at the end of the run
    pub checkpoint: Option<Position>,

    pub throttle_waits: u64,

    /// Throttling responses that carried no Retry-After header
    pub unmanaged_throttles: u64,
}

impl RunSummary {
    pub fn status(&self) -> RunStatus {
        if self.failures.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        }
    }
}

/// Main harvest coordinator structure
///
/// The coordinator is the only writer of the checkpoint and progress state.
pub struct Coordinator {
    config: Arc<Config>,
    api: SlackApi,
    transport: Arc<RateLimitedTransport>,
    checkpoint: CheckpointStore,
    progress: ProgressTracker,
    sink: Box<dyn Sink>,
    stop: StopFlag,
    config_hash: String,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens the sink in the output directory and builds the shared transport.
    pub fn new(config: Config, stop: StopFlag) -> Result<Self, HarvestError> {
        let token = config.slack.resolved_token().ok_or_else(|| {
            ConfigError::Validation("no API token configured".to_string())
        })?;

        let client = build_http_client(config.harvest.request_timeout())?;
        let transport = Arc::new(RateLimitedTransport::new(
            client,
            &config.slack,
            token,
            RetryPolicy::from(&config.harvest),
            stop.clone(),
        ));
        let api = SlackApi::new(
            Arc::clone(&transport),
            config.slack.channel_id.clone(),
            config.harvest.page_limit,
        );

        let sink = open_sink(&config.output)?;
        let checkpoint = CheckpointStore::new(config.output.checkpoint_path());
        let progress = ProgressTracker::new(config.output.progress_path());

        Ok(Self {
            config: Arc::new(config),
            api,
            transport,
            checkpoint,
            progress,
            sink,
            stop,
            config_hash: String::new(),
        })
    }

    /// Sets the configuration hash recorded with each run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Forgets all resume state so the next run starts from the beginning
    pub fn reset(&self) -> Result<(), HarvestError> {
        self.checkpoint.clear()?;
        self.progress.reset()?;
        tracing::info!("Cleared checkpoint and progress");
        Ok(())
    }

    /// Runs one harvest
    ///
    /// On a fatal error every completed parent has already been made durable;
    /// the error is returned after the run is recorded.
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let started_at = Utc::now();
        let mut summary = RunSummary::default();
        tracing::info!("Starting harvest of channel {}", self.config.slack.channel_id);

        let result = self.run_stages(&mut summary).await;

        let stats = self.transport.stats();
        summary.throttle_waits = stats.waits();
        summary.unmanaged_throttles = stats.unmanaged();

        let status = match &result {
            Ok(()) => summary.status(),
            Err(HarvestError::Stopped)
            | Err(HarvestError::Transport(TransportError::Stopped { .. })) => RunStatus::Stopped,
            Err(_) => RunStatus::Failed,
        };

        let record = RunRecord {
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            config_hash: self.config_hash.clone(),
            status,
            parents_fetched: summary.parents_fetched as u64,
            replies_fetched: summary.replies_fetched as u64,
            failures: summary.failures.len() as u64,
        };
        if let Err(e) = self.sink.record_run(&record) {
            tracing::warn!("Failed to record run: {}", e);
        }

        log_summary(&summary, status);
        result.map(|()| summary)
    }

    async fn run_stages(&mut self, summary: &mut RunSummary) -> Result<(), HarvestError> {
        let mut state = self.progress.load()?;
        let checkpoint = self.checkpoint.load()?;
        summary.checkpoint = checkpoint.clone();

        if !state.is_reset() {
            tracing::info!(
                "Resuming reply pass: {}/{} parents done, {} failed earlier",
                state.next_index,
                state.sequence.len(),
                state.failed.len()
            );
        }
        match &checkpoint {
            Some(position) => tracing::info!("Fetching parents newer than {}", position),
            None => tracing::info!("No checkpoint found, fetching full history"),
        }

        self.run_parent_stage(&mut state, checkpoint, summary).await?;
        self.run_reply_stage(&mut state, summary).await?;

        // Emit ordered streams before closing the pass
        let merged = self.sink.merged()?;
        if self.config.output.csv {
            write_parent_csv(&self.config.output.csv_path(), &merged.parents)?;
        }
        tracing::info!(
            "Export holds {} threads and {} replies",
            merged.parents.len(),
            merged.replies.len()
        );

        let outcome = state.finish_pass(self.config.harvest.max_parent_attempts);
        for identity in &outcome.abandoned {
            tracing::error!(parent = %identity, "Giving up on parent after repeated failures");
        }
        summary.abandoned = outcome.abandoned;
        summary.pending = state.remaining().len();
        self.progress.store(&state)?;

        if state.is_reset() {
            tracing::info!("All replies fetched, progress reset");
        }
        Ok(())
    }

    /// Fetches new parents and queues them for the reply pass
    ///
    /// Parents are written to output and queued in progress before the
    /// checkpoint moves, so a crash in between can only cause a re-fetch.
    async fn run_parent_stage(
        &mut self,
        state: &mut ProgressState,
        checkpoint: Option<Position>,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        let batch = ParentFetcher::since(self.api.clone(), checkpoint)
            .collect()
            .await?;
        summary.parents_fetched = batch.parents.len();
        summary.parents_without_replies = batch.without_replies;
        tracing::info!(
            "Found {} new threads ({} new messages without replies)",
            batch.parents.len(),
            batch.without_replies
        );

        let mut parents = batch.parents;
        summary.permalinks_resolved = attach_permalinks(
            &self.api,
            &mut parents,
            self.config.harvest.permalink_concurrency,
        )
        .await?;

        if !parents.is_empty() {
            self.sink.write_parents(&parents)?;
            state.extend(parents.iter().map(|p| p.identity.clone()));
            self.progress.store(state)?;
        }

        if let Some(high_water) = batch.high_water {
            summary.checkpoint = Some(self.checkpoint.advance(&high_water)?);
        }
        Ok(())
    }

    /// Fetches replies for every parent left in the progress sequence
    ///
    /// Completions arrive in any order; the cursor only moves over the settled
    /// prefix, and the state is stored each time it moves.
    async fn run_reply_stage(
        &mut self,
        state: &mut ProgressState,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        if state.is_drained() {
            return Ok(());
        }

        let total = state.sequence.len();
        tracing::info!("Fetching replies for {} threads", state.remaining().len());

        let fetcher = ReplyFetcher::new(self.api.clone(), self.config.harvest.reply_concurrency);
        let mut pool = fetcher.pool(state.sequence.clone(), state.next_index);
        let mut settled = BTreeMap::new();

        pool.fill(state.next_index);
        while let Some(completion) = pool.next_completion().await {
            let completion = completion?;
            let succeeded = match completion.result {
                Ok(replies) => {
                    self.sink.write_replies(&completion.identity, &replies)?;
                    summary.parents_completed += 1;
                    summary.replies_fetched += replies.len();
                    tracing::info!(
                        "[{}/{}] ts={} -> {} replies saved",
                        completion.index + 1,
                        total,
                        completion.identity,
                        replies.len()
                    );
                    true
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(parent = %completion.identity, "Reply fetch failed: {}", e);
                    summary.failures.push(ParentFailure {
                        identity: completion.identity,
                        error: e.to_string(),
                    });
                    false
                }
            };

            settled.insert(completion.index, succeeded);
            let before = state.next_index;
            while let Some(succeeded) = settled.remove(&state.next_index) {
                state.advance(succeeded);
            }
            if state.next_index != before {
                self.progress.store(state)?;
            }

            if self.stop.is_stopped() {
                return Err(HarvestError::Stopped);
            }
            pool.fill(state.next_index);
        }

        Ok(())
    }
}

fn log_summary(summary: &RunSummary, status: RunStatus) {
    tracing::info!(
        "Run {}: {} new threads, {} threads completed, {} replies, {} failed, {} pending",
        status.to_db_string(),
        summary.parents_fetched,
        summary.parents_completed,
        summary.replies_fetched,
        summary.failures.len(),
        summary.pending
    );
    for failure in &summary.failures {
        tracing::warn!(parent = %failure.identity, "Will retry next run: {}", failure.error);
    }
    if summary.unmanaged_throttles > 0 {
        tracing::warn!(
            "{} of {} throttling responses had no Retry-After header",
            summary.unmanaged_throttles,
            summary.throttle_waits
        );
    }
}
