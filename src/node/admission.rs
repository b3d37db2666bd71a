//! Admission policy: the reboot window and the global concurrency cap.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use k8s_openapi::api::core::v1::Node;

use super::selectors::{has_post_label, has_pre_label, still_rebooting};

/// The global cap on nodes in any in-flight reboot phase. Kept as a
/// named constant rather than threaded through as a runtime flag.
pub const MAX_CONCURRENT_REBOOTS: u32 = 1;

/// A recurring weekly admission window: `(start, length)`.
#[derive(Debug, Clone, Copy)]
pub struct RebootWindow {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub length: ChronoDuration,
}

/// `None` (no window configured) is always open. Otherwise: find the
/// most recent weekly occurrence whose start is `<= now`, and admit
/// iff that occurrence has not yet ended — the window is open on
/// `[start, end)`, so a just-started period counts but the instant of
/// `end` itself does not.
pub fn inside_window(window: Option<&RebootWindow>, now: DateTime<Utc>) -> bool {
    let Some(window) = window else {
        return true;
    };
    let start = most_recent_occurrence(window, now);
    let end = start + window.length;
    now < end
}

/// Walks back up to 7 days from `now` to find the latest start-of-window
/// timestamp that is `<= now`.
fn most_recent_occurrence(window: &RebootWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    for days_back in 0..7 {
        let candidate_date = now.date_naive() - ChronoDuration::days(days_back);
        if candidate_date.weekday() != window.weekday {
            continue;
        }
        let candidate = candidate_date.and_time(window.start).and_utc();
        if candidate <= now {
            return candidate;
        }
    }
    // Weekday never matches within a week only if `window.weekday` is
    // somehow invalid, which `chrono::Weekday` makes unrepresentable; this
    // is unreachable in practice.
    now - ChronoDuration::days(7)
}

/// A node counts once even if it matches more than one of the
/// in-flight predicates — this must not double-count a node that
/// happens to satisfy two of them at once.
pub fn remaining_capacity(nodes: &[Node], max_concurrent: u32) -> u32 {
    let in_flight = nodes
        .iter()
        .filter(|n| still_rebooting(n) || has_pre_label(n) || has_post_label(n))
        .count() as u32;
    max_concurrent.saturating_sub(in_flight)
}
