//! Crawler module for thread history harvesting
//!
//! This module contains the core harvesting logic, including:
//! - Rate-limit aware API transport with retry logic
//! - Incremental parent paging from the checkpoint
//! - Bounded concurrent reply fetching
//! - Merging both streams into a stable order
//! - Overall run coordination

mod api;
mod coordinator;
mod merger;
mod parents;
mod permalinks;
mod replies;
mod transport;

pub use api::{Page, SlackApi};
pub use coordinator::{Coordinator, RunSummary};
pub use merger::{merge, MergedOutput};
pub use parents::{ParentBatch, ParentFetcher};
pub use permalinks::attach_permalinks;
pub use replies::{fetch_thread, Completion, ParentFailure, ReplyFetcher, ReplyPool, ReplyResults};
pub use transport::{
    build_http_client, parse_retry_after, ApiRequest, RateLimitedTransport, RetryPolicy,
    StopFlag, ThrottleStats, TransportError,
};

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete harvest operation
///
/// This is the main entry point for starting a harvest. It will:
/// 1. Open the output sink and load resume state
/// 2. Fetch parents newer than the checkpoint
/// 3. Fetch replies for every queued parent
/// 4. Emit the merged output and close the pass
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `stop` - Flag checked between requests; setting it ends the run early
///
/// # Returns
///
/// * `Ok(RunSummary)` - Run finished, possibly with per-parent failures
/// * `Err(HarvestError)` - Run halted on a fatal error
pub async fn harvest(config: Config, stop: StopFlag) -> Result<RunSummary, HarvestError> {
    let mut coordinator = Coordinator::new(config, stop)?;
    coordinator.run().await
}
