//! Leader election: a single-writer guarantee across replicas, built
//! on the cluster's `Lease` lock object. Losing leadership is fatal —
//! the process exits so an external supervisor restarts it and
//! re-contests, rather than limping along as a possible second writer.

use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::node::events::{lease_reference, EventPublisher, LEADER_ELECTION_SOURCE};
use crate::util::Error;

/// How long a lease is considered valid without renewal.
const LEASE_DURATION: Duration = Duration::from_secs(90);

/// Renewal must complete within this long or it's treated as a loss.
/// `kube_leader_election`'s `LeaseLock` does not itself expose a
/// client-go-style renew deadline distinct from the lease TTL, so this is
/// enforced here by racing each renew attempt against a timeout (see
/// DESIGN.md).
const RENEW_DEADLINE: Duration = Duration::from_secs(60);

/// How often the control loop polls for (re)acquisition — one third of
/// the lease duration, as recommended by the underlying lease protocol.
const RETRY_PERIOD: Duration = Duration::from_secs(30);

/// Returns the identity this replica contests leadership under: the
/// process host name, preferring the Downward API's `POD_NAME` when
/// running in-cluster.
pub fn holder_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| gethostname::gethostname().to_string_lossy().into_owned())
}

/// What a single poll tick should do, derived from whether we were
/// already leading and whether this tick's renew succeeded. Pulled out
/// of `run` so the decision table is testable without a live lease or a
/// process that might call `std::process::exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Not leading before, not leading now: keep polling.
    StillFollowing,
    /// Not leading before, acquired just now: start the leader task.
    Acquired,
    /// Leading before, renewed again: nothing to do.
    StillLeading,
    /// Leading before, lost or failed to renew: fatal.
    Lost,
}

fn transition(was_leading: bool, acquired_this_tick: bool) -> Transition {
    match (was_leading, acquired_this_tick) {
        (false, false) => Transition::StillFollowing,
        (false, true) => Transition::Acquired,
        (true, true) => Transition::StillLeading,
        (true, false) => Transition::Lost,
    }
}

/// Blocks until leadership is first acquired (retrying every
/// [`RETRY_PERIOD`], cancellable via `shutdown`), then calls `spawn_leader`
/// once to start the reconcile loop, then holds and renews the lease.
/// Any renewal loss exits the process non-zero; a `shutdown` cancellation
/// between ticks returns normally instead.
pub async fn run(
    client: Client,
    lease_namespace: String,
    lease_name: String,
    holder_id: String,
    shutdown: CancellationToken,
    mut spawn_leader: impl FnMut() -> JoinHandle<()>,
) -> Result<(), Error> {
    let events = EventPublisher::new(client.clone(), LEADER_ELECTION_SOURCE);
    let lease_ref = lease_reference(&lease_namespace, &lease_name);
    let leadership = LeaseLock::new(
        client,
        &lease_namespace,
        LeaseLockParams {
            holder_id: holder_id.clone(),
            lease_name,
            lease_ttl: LEASE_DURATION,
        },
    );

    let mut tick = tokio::time::interval(RETRY_PERIOD);
    tick.tick().await; // consume the immediate first tick

    let mut leader_task: Option<JoinHandle<()>> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = leader_task.take() {
                    task.abort();
                }
                return Ok(());
            }
            _ = tick.tick() => {}
        }

        let renewed = tokio::time::timeout(RENEW_DEADLINE, leadership.try_acquire_or_renew()).await;
        let acquired = match renewed {
            Ok(Ok(result)) => matches!(result, LeaseLockResult::Acquired(_)),
            Ok(Err(e)) => {
                eprintln!("{}", format!("leader election renew/acquire failed: {e}").red());
                false
            }
            Err(_) => {
                eprintln!(
                    "{}",
                    "leader election renew did not complete within the renew deadline".red()
                );
                false
            }
        };

        match transition(leader_task.is_some(), acquired) {
            Transition::StillFollowing | Transition::StillLeading => {}
            Transition::Acquired => {
                println!("{}", format!("👑 '{holder_id}' acquired leadership").green());
                let _ = events
                    .publish_reference(
                        lease_ref.clone(),
                        kube::runtime::events::EventType::Normal,
                        "LeadershipAcquired",
                        format!("'{holder_id}' is now the active controller"),
                        "Acquire",
                    )
                    .await;
                leader_task = Some(spawn_leader());
            }
            Transition::Lost => {
                // We held leadership and lost it (or failed to renew it
                // in time). This is fatal: the protocol's safety depends
                // on there being a single writer, and a hung stale
                // writer is worse than a restart.
                if let Some(task) = leader_task.take() {
                    task.abort();
                }
                eprintln!("{}", "🛑 lost leadership; exiting so a peer can take over".red());
                let _ = events
                    .publish_reference(
                        lease_ref.clone(),
                        kube::runtime::events::EventType::Warning,
                        "LeadershipLost",
                        format!("'{holder_id}' lost or failed to renew its lease"),
                        "Lose",
                    )
                    .await;
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_led_and_still_not_leading_keeps_polling() {
        assert_eq!(transition(false, false), Transition::StillFollowing);
    }

    #[test]
    fn not_leading_then_acquiring_starts_the_leader_task() {
        assert_eq!(transition(false, true), Transition::Acquired);
    }

    #[test]
    fn leading_and_renewing_is_a_no_op() {
        assert_eq!(transition(true, true), Transition::StillLeading);
    }

    #[test]
    fn leading_then_failing_to_renew_is_fatal() {
        assert_eq!(transition(true, false), Transition::Lost);
    }
}
