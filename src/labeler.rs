//! Legacy Container Linux auto-labeler: an independent cooperative
//! task that stamps every node with an agent-enablement label. It
//! never touches the reboot-phase labels the reconciler owns, so it
//! can run alongside the control loop without synchronization.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::node::constants::{is_true, LABEL_AGENT_ENABLED, TRUE};
use crate::node::mutator;
use crate::node::store::NodeStore;

/// How often the labeler sweeps the node list. Independent of (and
/// deliberately slower than) the reconcile interval: this is a
/// best-effort legacy convenience, not part of the reboot protocol.
const LABEL_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs until `shutdown` is cancelled, labeling any node that doesn't
/// yet carry `agent-enabled=true`.
pub async fn run(store: Arc<dyn NodeStore>, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(LABEL_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {}
        }

        let nodes = match store.list().await {
            Ok(nodes) => nodes,
            Err(e) => {
                eprintln!("{}", format!("auto-labeler failed to list nodes: {e}").red());
                continue;
            }
        };

        for node in nodes
            .iter()
            .filter(|n| !is_true(n.metadata.labels.as_ref().and_then(|l| l.get(LABEL_AGENT_ENABLED))))
        {
            let name = match &node.metadata.name {
                Some(name) => name.clone(),
                None => continue,
            };
            let result = mutator::update(&*store, &name, |n| {
                n.metadata
                    .labels
                    .get_or_insert_with(Default::default)
                    .insert(LABEL_AGENT_ENABLED.to_string(), TRUE.to_string());
            })
            .await;
            if let Err(e) = result {
                eprintln!("{}", format!("auto-labeler failed to label '{name}': {e}").red());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::{node_with, MockNodeStore};
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn labels_nodes_missing_the_agent_enabled_label() {
        let store = Arc::new(MockNodeStore::new(vec![node_with("a", &[], &[])]));
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let run_store: Arc<dyn NodeStore> = store.clone();

        tokio::time::pause();
        let handle = tokio::spawn(run(run_store, shutdown_clone));
        tokio::time::advance(LABEL_SWEEP_INTERVAL).await;
        // Give the spawned task a chance to run its post-tick work.
        tokio::task::yield_now().await;

        shutdown.cancel();
        let _ = timeout(StdDuration::from_secs(1), handle).await;

        let after = store.snapshot("a").unwrap();
        assert!(is_true(
            after.metadata.labels.as_ref().and_then(|l| l.get(LABEL_AGENT_ENABLED))
        ));
    }
}
