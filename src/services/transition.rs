//! Monitor state machine.
//!
//! Given the previous state and a fresh check outcome, compute the next
//! state, whether an observable transition happened, and what to do with the
//! monitor's outage record. Pure so the scheduler stays testable without a
//! database.

use crate::models::check::{CheckOutcome, CheckStatus};
use crate::models::monitor::{MonitorState, MonitorStatus};
use crate::models::outage::OutageAction;

/// Consecutive failures required before a monitor flips to down.
pub const FAILURE_THRESHOLD: i64 = 1;
/// Consecutive successes required before a down monitor recovers.
pub const SUCCESS_THRESHOLD: i64 = 1;

#[derive(Debug)]
pub struct Transition {
    pub next: MonitorState,
    pub changed: bool,
    pub outage_action: OutageAction,
}

pub fn evaluate(
    prev: Option<&MonitorState>,
    monitor_id: i64,
    outcome: &CheckOutcome,
    checked_at: i64,
) -> Transition {
    let prev_status = prev.map(|s| s.status);
    let mut next = prev
        .cloned()
        .unwrap_or_else(|| MonitorState::initial(monitor_id));
    next.monitor_id = monitor_id;
    next.last_checked_at = Some(checked_at);
    next.last_latency_ms = outcome.latency_ms;

    let (changed, outage_action) = match outcome.status {
        CheckStatus::Down => {
            next.consecutive_failures += 1;
            next.consecutive_successes = 0;
            next.last_error = outcome.error.clone();

            if prev_status == Some(MonitorStatus::Down) {
                (false, OutageAction::Update)
            } else if next.consecutive_failures >= FAILURE_THRESHOLD {
                next.status = MonitorStatus::Down;
                (true, OutageAction::Open)
            } else {
                (false, OutageAction::None)
            }
        }
        CheckStatus::Up => {
            next.consecutive_successes += 1;
            next.consecutive_failures = 0;
            next.last_error = None;

            if prev_status == Some(MonitorStatus::Down)
                && next.consecutive_successes >= SUCCESS_THRESHOLD
            {
                next.status = MonitorStatus::Up;
                (true, OutageAction::Close)
            } else {
                next.status = MonitorStatus::Up;
                (prev_status != Some(MonitorStatus::Up), OutageAction::None)
            }
        }
        CheckStatus::Maintenance | CheckStatus::Unknown => {
            next.status = MonitorStatus::Unknown;
            (prev_status != Some(MonitorStatus::Unknown), OutageAction::None)
        }
    };

    if changed {
        next.last_changed_at = Some(checked_at);
    }

    Transition {
        next,
        changed,
        outage_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: MonitorStatus) -> MonitorState {
        MonitorState {
            monitor_id: 1,
            status,
            last_checked_at: Some(0),
            last_changed_at: Some(0),
            last_latency_ms: Some(10),
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    #[test]
    fn test_first_check_down_opens_outage() {
        let t = evaluate(None, 1, &CheckOutcome::down("timeout"), 60);
        assert_eq!(t.next.status, MonitorStatus::Down);
        assert!(t.changed);
        assert_eq!(t.outage_action, OutageAction::Open);
        assert_eq!(t.next.consecutive_failures, 1);
        assert_eq!(t.next.last_changed_at, Some(60));
        assert_eq!(t.next.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_down_while_down_updates_outage() {
        let mut prev = state(MonitorStatus::Down);
        prev.consecutive_failures = 2;
        let t = evaluate(Some(&prev), 1, &CheckOutcome::down("refused"), 120);
        assert_eq!(t.next.status, MonitorStatus::Down);
        assert!(!t.changed);
        assert_eq!(t.outage_action, OutageAction::Update);
        assert_eq!(t.next.consecutive_failures, 3);
        // last_changed_at is carried, not advanced.
        assert_eq!(t.next.last_changed_at, Some(0));
        assert_eq!(t.next.last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_recovery_closes_outage() {
        let prev = state(MonitorStatus::Down);
        let t = evaluate(Some(&prev), 1, &CheckOutcome::up(42, Some(200)), 120);
        assert_eq!(t.next.status, MonitorStatus::Up);
        assert!(t.changed);
        assert_eq!(t.outage_action, OutageAction::Close);
        assert_eq!(t.next.consecutive_successes, 1);
        assert_eq!(t.next.consecutive_failures, 0);
        assert!(t.next.last_error.is_none());
        assert_eq!(t.next.last_changed_at, Some(120));
    }

    #[test]
    fn test_up_while_up_is_quiet() {
        let prev = state(MonitorStatus::Up);
        let t = evaluate(Some(&prev), 1, &CheckOutcome::up(15, Some(204)), 180);
        assert!(!t.changed);
        assert_eq!(t.outage_action, OutageAction::None);
        assert_eq!(t.next.last_latency_ms, Some(15));
        assert_eq!(t.next.last_changed_at, Some(0));
    }

    #[test]
    fn test_unknown_to_down_opens() {
        let prev = state(MonitorStatus::Unknown);
        let t = evaluate(Some(&prev), 1, &CheckOutcome::down("dns error"), 60);
        assert_eq!(t.next.status, MonitorStatus::Down);
        assert!(t.changed);
        assert_eq!(t.outage_action, OutageAction::Open);
    }

    #[test]
    fn test_config_error_goes_unknown_without_outage() {
        let prev = state(MonitorStatus::Up);
        let t = evaluate(Some(&prev), 1, &CheckOutcome::unknown("invalid method PATCHY"), 60);
        assert_eq!(t.next.status, MonitorStatus::Unknown);
        assert!(t.changed);
        assert_eq!(t.outage_action, OutageAction::None);

        // Unknown-to-unknown does not keep flapping the changed flag.
        let t2 = evaluate(Some(&t.next), 1, &CheckOutcome::unknown("invalid method PATCHY"), 120);
        assert!(!t2.changed);
    }
}
