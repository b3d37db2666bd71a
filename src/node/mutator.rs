//! The node mutator: applies a caller-supplied, idempotent transform
//! to one node, retrying on optimistic-concurrency conflicts.

use k8s_openapi::api::core::v1::Node;
use rand::Rng;
use std::time::Duration;

use super::store::NodeStore;
use crate::util::Error;

/// Maximum number of re-read-and-reapply attempts after an initial
/// conflict.
const MAX_RETRIES: u32 = 5;

/// Base backoff delay.
const BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Exponential backoff factor, pinned at 1, which makes the schedule
/// flat (constant 10ms between attempts, before jitter) rather than
/// growing. Kept as a named constant rather than inlined so a future
/// change to the schedule is a one-line diff.
const BACKOFF_FACTOR: f64 = 1.0;

/// +/-10% jitter around the computed delay.
const JITTER_FRACTION: f64 = 0.10;

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = BACKOFF_BASE.as_millis() as f64 * BACKOFF_FACTOR.powi(attempt as i32);
    let jitter = rand::rng().random_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let jittered_ms = (base_ms * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(jittered_ms / 1000.0)
}

/// Re-reads `name`, applies `transform` in place, and attempts to persist
/// it. On a conflict, re-reads a fresh copy and reapplies `transform`
/// (which must be idempotent with respect to re-execution) up to
/// [`MAX_RETRIES`] times with exponential backoff. Non-conflict errors are
/// returned immediately. Conflict-exhaustion surfaces the last conflict
/// error.
pub async fn update<S, F>(store: &S, name: &str, transform: F) -> Result<Node, Error>
where
    S: NodeStore + ?Sized,
    F: Fn(&mut Node),
{
    let mut attempt = 0;
    loop {
        let mut node = store.get(name).await?;
        transform(&mut node);
        match store.update(node).await {
            Ok(updated) => return Ok(updated),
            Err(e) if e.is_conflict() && attempt < MAX_RETRIES => {
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}
