//! The reconciler: one pass through five ordered phases over the full
//! node list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use owo_colors::OwoColorize;

use super::admission::{inside_window, remaining_capacity, RebootWindow};
use super::constants::*;
use super::events::EventPublisher;
use super::mutator;
use super::selectors::*;
use super::store::NodeStore;
use crate::util::colors::{FG1, FG2};
use crate::util::Error;

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub before_reboot_annotations: Vec<String>,
    pub after_reboot_annotations: Vec<String>,
    pub window: Option<RebootWindow>,
    pub max_concurrent_reboots: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            before_reboot_annotations: Vec::new(),
            after_reboot_annotations: Vec::new(),
            window: None,
            max_concurrent_reboots: super::admission::MAX_CONCURRENT_REBOOTS,
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn NodeStore>,
    config: ReconcilerConfig,
    events: Option<Arc<EventPublisher>>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<ControllerMetrics>>,
}

fn clear_annotations(node: &mut Node, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if let Some(annotations) = node.metadata.annotations.as_mut() {
        for key in keys {
            annotations.remove(key);
        }
    }
}

fn set_annotation(node: &mut Node, key: &str, value: &str) {
    node.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}

#[cfg(feature = "metrics")]
fn error_kind(e: &Error) -> &'static str {
    if e.is_conflict() {
        "conflict"
    } else if e.is_not_found() {
        "not_found"
    } else {
        "other"
    }
}

fn remove_label(node: &mut Node, key: &str) {
    if let Some(labels) = node.metadata.labels.as_mut() {
        labels.remove(key);
    }
}

fn set_label(node: &mut Node, key: &str, value: &str) {
    node.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn NodeStore>,
        config: ReconcilerConfig,
        events: Option<Arc<EventPublisher>>,
        #[cfg(feature = "metrics")] metrics: Option<Arc<ControllerMetrics>>,
    ) -> Self {
        Self {
            store,
            config,
            events,
            #[cfg(feature = "metrics")]
            metrics,
        }
    }

    async fn note(&self, node: &Node, reason: &str, note: String) {
        println!(
            "🔧 {}{}{}",
            node.name_any().color(FG2),
            " ".color(FG1),
            note.as_str().color(FG2),
        );
        if let Some(events) = &self.events {
            let _ = events
                .publish_node(node, EventType::Normal, reason, note, "Reconcile")
                .await;
        }
    }

    /// Runs one full five-phase pass. Any list or update failure aborts
    /// the pass and is returned to the caller; the next tick starts over
    /// from scratch rather than trying to resume mid-pass.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<(), Error> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();
        let result = self.run_pass_inner(now).await;
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics
                .reconcile_passes_total
                .with_label_values(&[outcome])
                .inc();
            metrics
                .pass_duration_seconds
                .with_label_values(&[outcome])
                .observe(started.elapsed().as_secs_f64());
            if let Err(e) = &result {
                metrics
                    .reconcile_errors_total
                    .with_label_values(&[error_kind(e)])
                    .inc();
            }
        }
        result
    }

    async fn run_pass_inner(&self, now: DateTime<Utc>) -> Result<(), Error> {
        let nodes = self.store.list().await?;

        self.phase_cleanup(&nodes).await?;
        self.phase_finish_post_check(&nodes).await?;
        self.phase_enter_post_check(&nodes).await?;
        self.phase_finish_pre_check(&nodes).await?;

        // Slots freed by the two phases above must be visible to this
        // cycle's admission decision, so re-list rather than reuse the
        // pre-pass snapshot.
        let fresh = self.store.list().await?;
        self.phase_enter_pre_check(&fresh, now).await?;

        Ok(())
    }

    /// Phase 1 — Cleanup: drop `before-reboot` + its pre-check annotations
    /// from any node that no longer wants to reboot (paused, or the agent
    /// cancelled).
    async fn phase_cleanup(&self, nodes: &[Node]) -> Result<(), Error> {
        for node in nodes
            .iter()
            .filter(|n| has_pre_label(n) && !wants_reboot_minus_label(n))
        {
            let name = node.name_any();
            let keys = self.config.before_reboot_annotations.clone();
            let updated = mutator::update(&*self.store, &name, move |n| {
                remove_label(n, LABEL_BEFORE_REBOOT);
                clear_annotations(n, &keys);
            })
            .await?;
            self.note(
                &updated,
                "CleanupCancelled",
                "pre-check cancelled, releasing capacity".to_string(),
            )
            .await;
        }
        Ok(())
    }

    /// Phase 2 — Finish post-check: nodes whose configured post-check
    /// annotations are all true graduate back to Idle.
    async fn phase_finish_post_check(&self, nodes: &[Node]) -> Result<(), Error> {
        for node in nodes.iter().filter(|n| {
            has_post_label(n) && has_all_annotations_true(n, &self.config.after_reboot_annotations)
        }) {
            let name = node.name_any();
            let keys = self.config.after_reboot_annotations.clone();
            let updated = mutator::update(&*self.store, &name, move |n| {
                remove_label(n, LABEL_AFTER_REBOOT);
                clear_annotations(n, &keys);
                set_annotation(n, REBOOT_OK, FALSE);
            })
            .await?;
            self.note(&updated, "PostCheckPassed", "post-check passed, node is idle".to_string())
                .await;
        }
        Ok(())
    }

    /// Phase 3 — Enter post-check: nodes that just finished rebooting get
    /// the `after-reboot` label so health gates can run.
    async fn phase_enter_post_check(&self, nodes: &[Node]) -> Result<(), Error> {
        for node in nodes.iter().filter(|n| just_rebooted(n)) {
            let name = node.name_any();
            let keys = self.config.after_reboot_annotations.clone();
            let updated = mutator::update(&*self.store, &name, move |n| {
                clear_annotations(n, &keys);
                set_label(n, LABEL_AFTER_REBOOT, TRUE);
            })
            .await?;
            self.note(
                &updated,
                "PostCheckStarted",
                "node rebooted, starting post-check".to_string(),
            )
            .await;
        }
        Ok(())
    }

    /// Phase 4 — Finish pre-check: nodes whose configured pre-check
    /// annotations are all true are admitted.
    async fn phase_finish_pre_check(&self, nodes: &[Node]) -> Result<(), Error> {
        for node in nodes.iter().filter(|n| {
            has_pre_label(n) && has_all_annotations_true(n, &self.config.before_reboot_annotations)
        }) {
            if reboot_ok(node) {
                // Shouldn't happen under the protocol. Treated as a
                // harmless no-op rather than an error.
                eprintln!(
                    "node '{}' reached finish-pre-check with reboot-ok already true; skipping",
                    node.name_any()
                );
                continue;
            }
            let name = node.name_any();
            let keys = self.config.before_reboot_annotations.clone();
            let updated = mutator::update(&*self.store, &name, move |n| {
                remove_label(n, LABEL_BEFORE_REBOOT);
                clear_annotations(n, &keys);
                set_annotation(n, REBOOT_OK, TRUE);
            })
            .await?;
            self.note(&updated, "Admitted", "pre-check passed, reboot admitted".to_string())
                .await;
        }
        Ok(())
    }

    /// Phase 5 — Enter pre-check: admits up to the remaining capacity of
    /// candidate nodes, in list order, but only inside the reboot window.
    async fn phase_enter_pre_check(&self, nodes: &[Node], now: DateTime<Utc>) -> Result<(), Error> {
        if !inside_window(self.config.window.as_ref(), now) {
            return Ok(());
        }
        let capacity = remaining_capacity(nodes, self.config.max_concurrent_reboots) as usize;
        let candidates: Vec<&Node> = nodes
            .iter()
            .filter(|n| wants_reboot(n) && !has_pre_label(n))
            .take(capacity)
            .collect();

        for node in candidates {
            let name = node.name_any();
            let keys = self.config.before_reboot_annotations.clone();
            let updated = mutator::update(&*self.store, &name, move |n| {
                clear_annotations(n, &keys);
                set_label(n, LABEL_BEFORE_REBOOT, TRUE);
            })
            .await?;
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics
                    .admissions_total
                    .with_label_values(&[&updated.name_any()])
                    .inc();
            }
            self.note(
                &updated,
                "PreCheckStarted",
                "admitted into pre-check".to_string(),
            )
            .await;
        }
        Ok(())
    }
}
