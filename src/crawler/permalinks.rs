//! Permalink enrichment for newly fetched parents

use crate::crawler::api::SlackApi;
use crate::model::Parent;
use crate::HarvestError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Resolves `permalink` for every parent with at most `concurrency` requests
/// in flight
///
/// A parent whose lookup fails keeps `permalink = None`; only fatal transport
/// errors abort the stage. Returns the number of permalinks resolved.
pub async fn attach_permalinks(
    api: &SlackApi,
    parents: &mut [Parent],
    concurrency: usize,
) -> Result<usize, HarvestError> {
    if concurrency == 0 || parents.is_empty() {
        return Ok(0);
    }

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut workers = JoinSet::new();

    for (index, parent) in parents.iter().enumerate() {
        let api = api.clone();
        let semaphore = Arc::clone(&semaphore);
        let ts = parent.identity.clone();
        workers.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, Err(HarvestError::Stopped)),
            };
            (index, api.permalink(&ts).await)
        });
    }

    let mut resolved = 0;
    while let Some(joined) = workers.join_next().await {
        let (index, result) = match joined {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Permalink worker crashed: {}", e);
                continue;
            }
        };

        match result {
            Ok(link) => {
                parents[index].permalink = Some(link);
                resolved += 1;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(parent = %parents[index].identity, "Could not retrieve permalink: {}", e);
            }
        }
    }

    tracing::info!("Resolved {}/{} permalinks", resolved, parents.len());
    Ok(resolved)
}
