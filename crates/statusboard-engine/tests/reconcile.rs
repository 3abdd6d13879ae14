//! Tick behaviour against the in-memory platform.

mod support;

use std::time::Duration;

use statusboard_engine::{Outcome, Presence, TickMode};
use statusboard_probe::ServiceStatus;
use statusboard_state::Tracker;

use support::{Harness, T0};

fn track(h: &Harness, channel: &str, minutes: u32) {
    h.platform.add_channel(channel);
    h.store().insert(channel, Tracker::new(minutes)).unwrap();
}

#[tokio::test]
async fn empty_configuration_never_probes() {
    let h = Harness::new();
    let report = h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    assert!(!report.probed);
    assert_eq!(h.prober.calls(), 0);
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn nothing_due_skips_probe() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.store().mark_updated("c1", T0).unwrap();

    let report = h.reconciler.tick_at(T0 + 60, TickMode::Scheduled).await;
    assert!(!report.probed);
    assert_eq!(h.prober.calls(), 0);
    assert_eq!(report.outcomes["c1"], Outcome::NotDue);
}

#[tokio::test]
async fn first_tick_posts_then_later_ticks_edit() {
    let h = Harness::new();
    track(&h, "c1", 5);

    let report = h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    let Outcome::Posted { message_ref, replaced } = &report.outcomes["c1"] else {
        panic!("expected a post, got {:?}", report.outcomes["c1"]);
    };
    assert!(replaced.is_none());
    let tracker = h.store().get("c1").unwrap();
    assert_eq!(tracker.message_ref.as_ref(), Some(message_ref));
    assert_eq!(tracker.last_update_time, T0);

    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    assert_eq!(
        report.outcomes["c1"],
        Outcome::Updated {
            message_ref: message_ref.clone()
        }
    );
    assert_eq!(h.platform.sends(), 1);
    assert_eq!(h.platform.edits(), 1);
    assert_eq!(h.platform.messages("c1").len(), 1);
}

#[tokio::test]
async fn interval_is_respected() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    let report = h.reconciler.tick_at(T0 + 299, TickMode::Scheduled).await;
    assert_eq!(report.outcomes["c1"], Outcome::NotDue);
    assert_eq!(h.prober.calls(), 1);

    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    assert!(report.outcomes["c1"].is_refreshed());
    assert_eq!(h.prober.calls(), 2);
}

#[tokio::test]
async fn destinations_keep_independent_cadences() {
    let h = Harness::new();
    track(&h, "fast", 1);
    track(&h, "slow", 10);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    let report = h.reconciler.tick_at(T0 + 60, TickMode::Scheduled).await;
    assert!(report.outcomes["fast"].is_refreshed());
    assert_eq!(report.outcomes["slow"], Outcome::NotDue);
}

#[tokio::test]
async fn one_probe_serves_every_due_destination() {
    let h = Harness::new();
    for c in ["a", "b", "c"] {
        track(&h, c, 5);
    }

    let report = h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    assert_eq!(report.refreshed(), 3);
    assert_eq!(h.prober.calls(), 1);
}

#[tokio::test]
async fn one_lookup_per_destination_per_tick() {
    let h = Harness::new();
    track(&h, "a", 5);
    track(&h, "b", 5);

    h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    assert_eq!(h.platform.lookups(), 2);
}

#[tokio::test]
async fn deleted_notification_is_recreated() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    let old = h.store().get("c1").unwrap().message_ref.unwrap();

    h.platform.delete_externally("c1", &old);
    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    let Outcome::Posted { message_ref, replaced } = report.outcomes["c1"].clone() else {
        panic!("expected recreation");
    };
    assert_eq!(replaced.as_deref(), Some(old.as_str()));
    assert_ne!(message_ref, old);
    assert_eq!(h.store().get("c1").unwrap().message_ref, Some(message_ref.clone()));

    // The replacement is edited from now on.
    let report = h.reconciler.tick_at(T0 + 600, TickMode::Scheduled).await;
    assert_eq!(report.outcomes["c1"], Outcome::Updated { message_ref });
    assert_eq!(h.reconciler.counters().recreations, 1);
}

#[tokio::test]
async fn unreachable_destination_is_pruned_once() {
    let h = Harness::new();
    track(&h, "alive", 5);
    h.store().insert("gone", Tracker::new(5)).unwrap();

    let report = h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    assert_eq!(report.outcomes["gone"], Outcome::Pruned);
    assert!(report.outcomes["alive"].is_refreshed());
    assert!(h.store().get("gone").is_none());

    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    assert!(!report.outcomes.contains_key("gone"));
    assert_eq!(h.reconciler.counters().pruned, 1);
}

#[tokio::test]
async fn forbidden_destination_is_pruned() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    h.platform.forbid("c1");
    let report = h.reconciler.tick_at(T0 + 60, TickMode::Scheduled).await;
    assert_eq!(report.outcomes["c1"], Outcome::Pruned);
    assert!(h.store().is_empty());
}

#[tokio::test]
async fn transient_failure_is_retried_next_tick() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    h.platform.fail_edits(true);
    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    assert!(matches!(report.outcomes["c1"], Outcome::Failed { .. }));
    assert_eq!(h.store().get("c1").unwrap().last_update_time, T0);

    h.platform.fail_edits(false);
    let report = h.reconciler.tick_at(T0 + 360, TickMode::Scheduled).await;
    assert!(matches!(report.outcomes["c1"], Outcome::Updated { .. }));
    assert_eq!(h.store().get("c1").unwrap().last_update_time, T0 + 360);
    assert_eq!(h.reconciler.counters().failures, 1);
}

#[tokio::test]
async fn one_failing_destination_does_not_block_others() {
    let h = Harness::new();
    track(&h, "a", 5);
    track(&h, "b", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    let a_msg = h.store().get("a").unwrap().message_ref.unwrap();
    h.platform.delete_externally("a", &a_msg);
    h.platform.fail_sends(true);

    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    assert!(matches!(report.outcomes["a"], Outcome::Failed { .. }));
    assert!(matches!(report.outcomes["b"], Outcome::Updated { .. }));
}

#[tokio::test]
async fn presence_is_pushed_only_on_change() {
    let h = Harness::new();
    track(&h, "c1", 1);

    let report = h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    assert!(report.presence_changed);
    assert_eq!(h.platform.presence(), vec![Presence::Healthy]);

    let report = h.reconciler.tick_at(T0 + 60, TickMode::Scheduled).await;
    assert!(!report.presence_changed);
    assert_eq!(h.platform.presence().len(), 1);

    h.prober.set("Beta", ServiceStatus::Limited);
    h.reconciler.tick_at(T0 + 120, TickMode::Scheduled).await;
    h.prober.set("Alpha", ServiceStatus::IssuesDetected);
    h.reconciler.tick_at(T0 + 180, TickMode::Scheduled).await;

    assert_eq!(
        h.platform.presence(),
        vec![Presence::Healthy, Presence::Degraded, Presence::Critical]
    );
    assert_eq!(h.reconciler.counters().presence_pushes, 3);
}

#[tokio::test]
async fn forced_tick_refreshes_everything() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    let report = h.reconciler.tick_at(T0 + 10, TickMode::Forced).await;
    assert!(matches!(report.outcomes["c1"], Outcome::Updated { .. }));
    assert_eq!(h.prober.calls(), 2);
}

#[tokio::test]
async fn interval_change_makes_destination_due() {
    let h = Harness::new();
    track(&h, "c1", 10);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    h.store().set_interval("c1", 1).unwrap();
    let report = h.reconciler.tick_at(T0 + 1, TickMode::Scheduled).await;
    assert!(report.outcomes["c1"].is_refreshed());
}

#[tokio::test]
async fn never_updated_tracker_is_due_on_any_clock() {
    let h = Harness::new();
    track(&h, "c1", 10);

    let report = h.reconciler.tick_at(1, TickMode::Scheduled).await;
    assert!(report.outcomes["c1"].is_refreshed());

    h.store().set_interval("c1", 10).unwrap();
    let report = h.reconciler.tick_at(2, TickMode::Scheduled).await;
    assert!(report.outcomes["c1"].is_refreshed());
    assert_eq!(h.store().get("c1").unwrap().last_update_time, 2);
}

#[tokio::test]
async fn lost_permission_defers_without_pruning() {
    let h = Harness::new();
    track(&h, "c1", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    h.platform.deny_edits(true);
    let report = h.reconciler.tick_at(T0 + 300, TickMode::Scheduled).await;
    assert!(matches!(report.outcomes["c1"], Outcome::Deferred { .. }));
    assert_eq!(report.pruned(), 0);

    let tracker = h.store().get("c1").unwrap();
    assert_eq!(tracker.last_update_time, T0);
    assert_eq!(h.reconciler.counters().failures, 1);
}

#[tokio::test]
async fn stuck_call_times_out_without_blocking_others() {
    let h = Harness::with_call_timeout(Duration::from_millis(50));
    track(&h, "a", 5);
    track(&h, "b", 5);
    h.reconciler.tick_at(T0, TickMode::Scheduled).await;

    h.platform.hang_edits("a");
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        h.reconciler.tick_at(T0 + 300, TickMode::Scheduled),
    )
    .await
    .expect("tick waited on a stuck call");

    let Outcome::Failed { reason } = &report.outcomes["a"] else {
        panic!("expected a failure, got {:?}", report.outcomes["a"]);
    };
    assert!(reason.contains("50ms"), "{reason}");
    assert!(matches!(report.outcomes["b"], Outcome::Updated { .. }));
    assert_eq!(h.store().get("a").unwrap().last_update_time, T0);
}

#[tokio::test]
async fn tracker_removed_mid_tick_leaves_no_orphan() {
    let h = Harness::new();
    track(&h, "c1", 5);
    let store = h.store().clone();
    h.platform.on_send(move || {
        store.remove("c1").unwrap();
    });

    let report = h.reconciler.tick_at(T0, TickMode::Scheduled).await;
    assert!(matches!(report.outcomes["c1"], Outcome::Skipped { .. }));
    assert_eq!(h.platform.sends(), 1);
    assert!(h.platform.messages("c1").is_empty());
    assert!(h.store().is_empty());
    assert_eq!(h.reconciler.counters().updates, 0);
}

#[tokio::test]
async fn run_loop_ticks_until_shutdown() {
    let h = Harness::new();
    let (tx, rx) = tokio::sync::watch::channel(false);

    let reconciler = h.reconciler.clone();
    let handle = tokio::spawn(async move { reconciler.run(Duration::from_millis(5), rx).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("run loop did not stop")
        .unwrap();

    assert!(h.reconciler.counters().ticks >= 1);
    assert!(h.reconciler.last_tick_at() > 0);
}
