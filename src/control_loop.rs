//! The control loop: a fixed-period ticker invoking one full
//! reconciler pass at a time, never overlapping with itself. Started
//! only after leadership is acquired and stopped between ticks on
//! cancellation.

use std::time::Duration;

use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::node::reconcile::Reconciler;

/// Runs reconcile passes every `interval` until `shutdown` is
/// cancelled. A pass already in flight always runs to completion or to
/// its first error; errors abort only that pass, the next tick starts
/// fresh.
pub async fn run(reconciler: Reconciler, interval: Duration, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {}
        }

        if let Err(e) = reconciler.run_pass(chrono::Utc::now()).await {
            eprintln!("{}", format!("🛑 reconcile pass failed: {e}").red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::reconcile::ReconcilerConfig;
    use crate::node::selectors::has_pre_label;
    use crate::node::test_support::{node_with, MockNodeStore};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn runs_a_pass_per_tick_and_stops_on_cancellation() {
        let store = Arc::new(MockNodeStore::new(vec![node_with(
            "a",
            &[(crate::node::constants::REBOOT_NEEDED, "true")],
            &[],
        )]));
        let reconciler = Reconciler::new(
            store.clone(),
            ReconcilerConfig::default(),
            None,
            #[cfg(feature = "metrics")]
            None,
        );
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::time::pause();
        let handle = tokio::spawn(run(reconciler, Duration::from_secs(30), shutdown_clone));
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;

        shutdown.cancel();
        timeout(StdDuration::from_secs(1), handle)
            .await
            .expect("control loop did not stop promptly after cancellation")
            .expect("control loop task panicked");

        assert!(has_pre_label(&store.snapshot("a").unwrap()));
    }
}
