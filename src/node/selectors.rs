//! Pure, stateless predicates over a single node's annotations and
//! labels. None of these touch the object store; they only read the
//! node-in-hand.

use k8s_openapi::api::core::v1::Node;

use super::constants::*;

fn annotation<'a>(node: &'a Node, key: &str) -> Option<&'a String> {
    node.metadata.annotations.as_ref()?.get(key)
}

fn label<'a>(node: &'a Node, key: &str) -> Option<&'a String> {
    node.metadata.labels.as_ref()?.get(key)
}

pub fn reboot_ok(node: &Node) -> bool {
    is_true(annotation(node, REBOOT_OK))
}

pub fn reboot_needed(node: &Node) -> bool {
    is_true(annotation(node, REBOOT_NEEDED))
}

pub fn reboot_in_progress(node: &Node) -> bool {
    is_true(annotation(node, REBOOT_IN_PROGRESS))
}

pub fn reboot_paused(node: &Node) -> bool {
    is_true(annotation(node, REBOOT_PAUSED))
}

pub fn has_pre_label(node: &Node) -> bool {
    is_true(label(node, LABEL_BEFORE_REBOOT))
}

pub fn has_post_label(node: &Node) -> bool {
    is_true(label(node, LABEL_AFTER_REBOOT))
}

/// `WantsReboot`: the node is declaring it wants to reboot and nothing
/// has already claimed it.
pub fn wants_reboot(node: &Node) -> bool {
    reboot_needed(node)
        && !reboot_paused(node)
        && !reboot_ok(node)
        && !reboot_in_progress(node)
        && !has_pre_label(node)
}

/// `WantsReboot` minus the "no `before-reboot` label" clause — used by
/// the cleanup phase, which only ever looks at nodes that already
/// carry the label. This still requires `!reboot_in_progress`, so a
/// node sitting in pre-check on which the agent has already set
/// `reboot-in-progress=true` no longer satisfies this predicate and
/// gets swept (label removed, pre-check annotations cleared) by the
/// next cleanup pass rather than being left alone until post-check
/// picks it up. See DESIGN.md for why this literal formula is the
/// chosen reading over the alternative prose.
pub fn wants_reboot_minus_label(node: &Node) -> bool {
    reboot_needed(node) && !reboot_paused(node) && !reboot_ok(node) && !reboot_in_progress(node)
}

/// `stillRebooting`: the agent has been granted permission and is still
/// declaring it needs to reboot.
pub fn still_rebooting(node: &Node) -> bool {
    reboot_ok(node) && reboot_needed(node)
}

/// `JustRebooted`: the agent finished rebooting but post-check hasn't
/// started yet.
pub fn just_rebooted(node: &Node) -> bool {
    reboot_ok(node) && !reboot_needed(node) && !reboot_in_progress(node) && !has_post_label(node)
}

/// For every key in `keys`, `node.annotations[key] == "true"`. An empty
/// `keys` list is vacuously true.
pub fn has_all_annotations_true(node: &Node, keys: &[String]) -> bool {
    keys.iter().all(|k| is_true(annotation(node, k)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::node_with;

    #[test]
    fn wants_reboot_requires_needed_and_nothing_else_set() {
        let n = node_with("a", &[(REBOOT_NEEDED, "true")], &[]);
        assert!(wants_reboot(&n));
    }

    #[test]
    fn wants_reboot_false_when_paused() {
        let n = node_with("a", &[(REBOOT_NEEDED, "true"), (REBOOT_PAUSED, "true")], &[]);
        assert!(!wants_reboot(&n));
    }

    #[test]
    fn wants_reboot_false_when_already_admitted() {
        let n = node_with("a", &[(REBOOT_NEEDED, "true"), (REBOOT_OK, "true")], &[]);
        assert!(!wants_reboot(&n));
    }

    #[test]
    fn wants_reboot_false_when_in_progress() {
        let n = node_with(
            "a",
            &[(REBOOT_NEEDED, "true"), (REBOOT_IN_PROGRESS, "true")],
            &[],
        );
        assert!(!wants_reboot(&n));
    }

    #[test]
    fn wants_reboot_false_with_pre_label() {
        let n = node_with("a", &[(REBOOT_NEEDED, "true")], &[(LABEL_BEFORE_REBOOT, "true")]);
        assert!(!wants_reboot(&n));
    }

    #[test]
    fn wants_reboot_minus_label_is_false_once_agent_reports_in_progress() {
        // A node mid pre-check on which the agent has already flipped
        // `reboot-in-progress=true` no longer satisfies the formula, so
        // the cleanup phase treats it as no-longer-wanting-a-reboot and
        // sweeps the label rather than leaving it alone until
        // post-check releases it.
        let n = node_with(
            "a",
            &[(REBOOT_NEEDED, "true"), (REBOOT_IN_PROGRESS, "true")],
            &[(LABEL_BEFORE_REBOOT, "true")],
        );
        assert!(!wants_reboot_minus_label(&n));
    }

    #[test]
    fn still_rebooting_requires_both_ok_and_needed() {
        let n = node_with("a", &[(REBOOT_OK, "true"), (REBOOT_NEEDED, "true")], &[]);
        assert!(still_rebooting(&n));
        let n2 = node_with("a", &[(REBOOT_OK, "true")], &[]);
        assert!(!still_rebooting(&n2));
    }

    #[test]
    fn just_rebooted_requires_ok_not_needed_not_in_progress_no_post_label() {
        let n = node_with(
            "a",
            &[
                (REBOOT_OK, "true"),
                (REBOOT_NEEDED, "false"),
                (REBOOT_IN_PROGRESS, "false"),
            ],
            &[],
        );
        assert!(just_rebooted(&n));
    }

    #[test]
    fn just_rebooted_false_with_post_label() {
        let n = node_with(
            "a",
            &[(REBOOT_OK, "true"), (REBOOT_NEEDED, "false")],
            &[(LABEL_AFTER_REBOOT, "true")],
        );
        assert!(!just_rebooted(&n));
    }

    #[test]
    fn empty_annotation_list_is_vacuously_true() {
        let n = node_with("a", &[], &[]);
        assert!(has_all_annotations_true(&n, &[]));
    }

    #[test]
    fn all_annotations_true_requires_every_key() {
        let n = node_with("a", &[("check-a", "true")], &[]);
        assert!(has_all_annotations_true(
            &n,
            &["check-a".to_string()]
        ));
        assert!(!has_all_annotations_true(
            &n,
            &["check-a".to_string(), "check-b".to_string()]
        ));
    }
}
