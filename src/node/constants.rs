//! Exact annotation/label key strings. These are the mailbox fields
//! shared between this controller and the per-node agent; renaming any
//! of them is a protocol break, not a refactor.

pub const ANNOTATION_PREFIX: &str = "reboot-coordinator.io";

/// Controller-exclusive: grants (`"true"`) or revokes (`"false"`) permission
/// for the agent to reboot.
pub const REBOOT_OK: &str = "reboot-coordinator.io/reboot-ok";

/// Agent-exclusive: the agent wants to reboot.
pub const REBOOT_NEEDED: &str = "reboot-coordinator.io/reboot-needed";

/// Agent-exclusive: the agent is actively rebooting.
pub const REBOOT_IN_PROGRESS: &str = "reboot-coordinator.io/reboot-in-progress";

/// Operator-exclusive hold; suppresses admission into pre-check.
pub const REBOOT_PAUSED: &str = "reboot-coordinator.io/reboot-paused";

/// Controller-owned phase marker: node is in the pre-check phase.
pub const LABEL_BEFORE_REBOOT: &str = "reboot-coordinator.io/before-reboot";

/// Controller-owned phase marker: node is in the post-check phase.
pub const LABEL_AFTER_REBOOT: &str = "reboot-coordinator.io/after-reboot";

/// Legacy auto-labeler output; disjoint from the phase markers above so the
/// labeler task never races the reconciler.
pub const LABEL_AGENT_ENABLED: &str = "reboot-coordinator.io/agent-enabled";

/// Version annotation the agent-workload ensurer stamps its managed
/// DaemonSet with.
pub const AGENT_VERSION: &str = "reboot-coordinator.io/agent-version";

pub const TRUE: &str = "true";
pub const FALSE: &str = "false";

pub fn is_true(value: Option<&String>) -> bool {
    value.map(String::as_str) == Some(TRUE)
}
