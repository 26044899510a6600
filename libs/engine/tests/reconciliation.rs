//! Integration tests for the reconciliation pass.


use chrono::Duration;
use harness::{running_machine, Harness};
use skypool_alerts::topics;
use skypool_engine::{PoolError, VictimSelectionPolicy};

#[tokio::test]
async fn grows_an_empty_pool_to_the_desired_size() {
    let h = Harness::empty();
    h.configure(Some(3), VictimSelectionPolicy::Oldest, 0).await;

    let summary = h.manager.resize().await.unwrap();

    assert_eq!(summary.requested, 3);
    assert_eq!(summary.scheduled, 0);
    assert_eq!(h.driver.machines().len(), 3);
    assert_eq!(h.dispatcher.count_topic(topics::RESIZE_STARTED), 1);
    assert_eq!(h.dispatcher.count_topic(topics::RESIZE_PLANNED), 1);
}

#[tokio::test]
async fn shrinks_by_terminating_the_oldest_machines() {
    let h = Harness::with_machines(vec![
        running_machine("i-1", "2024-03-01T07:00:00Z"),
        running_machine("i-2", "2024-03-01T08:00:00Z"),
        running_machine("i-3", "2024-03-01T09:00:00Z"),
        running_machine("i-4", "2024-03-01T10:00:00Z"),
        running_machine("i-5", "2024-03-01T11:00:00Z"),
    ]);
    h.configure(Some(3), VictimSelectionPolicy::Oldest, 0).await;

    let summary = h.manager.resize().await.unwrap();

    // Immediate termination times: scheduled and executed in one pass.
    assert_eq!(summary.scheduled, 2);
    assert_eq!(summary.terminated, 2);
    assert_eq!(summary.requested, 0);
    assert_eq!(h.driver.machine_ids(), vec!["i-3", "i-4", "i-5"]);
}

#[tokio::test]
async fn billing_aware_shrink_defers_until_the_prepaid_hour_is_used() {
    // 10 minutes into its billing hour: 50 minutes prepaid, margin 5.
    let h = Harness::with_machines(vec![running_machine("i-1", "2024-03-01T11:50:00Z")]);
    h.configure(
        Some(0),
        VictimSelectionPolicy::ClosestToNextBillingHour,
        300,
    )
    .await;

    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.scheduled, 1);
    assert_eq!(summary.terminated, 0);
    assert_eq!(h.driver.machines().len(), 1);
    assert_eq!(h.manager.status().await.queued_terminations, 1);

    // Not due yet: a pass halfway through changes nothing.
    h.clock.advance(Duration::seconds(1000));
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.terminated, 0);
    assert_eq!(h.driver.machines().len(), 1);

    // Past the termination time the queued entry executes.
    h.clock.advance(Duration::seconds(1700 + 1));
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.terminated, 1);
    assert!(h.driver.machines().is_empty());
}

#[tokio::test]
async fn margin_larger_than_time_left_terminates_immediately() {
    // 5 seconds from the billing boundary with a 30 second margin.
    let h = Harness::with_machines(vec![running_machine("i-1", "2024-03-01T10:00:05Z")]);
    h.configure(
        Some(0),
        VictimSelectionPolicy::ClosestToNextBillingHour,
        30,
    )
    .await;

    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.terminated, 1);
    assert!(h.driver.machines().is_empty());
}

#[tokio::test]
async fn queue_entries_for_vanished_machines_are_dropped() {
    let h = Harness::with_machines(vec![
        running_machine("i-1", "2024-03-01T08:00:00Z"),
        running_machine("i-2", "2024-03-01T09:00:00Z"),
    ]);
    h.configure(
        Some(1),
        VictimSelectionPolicy::ClosestToNextBillingHour,
        300,
    )
    .await;

    // First pass queues one victim for a future termination.
    h.manager.resize().await.unwrap();
    assert_eq!(h.manager.status().await.queued_terminations, 1);

    // The queued machine disappears behind the engine's back (spot
    // reclaim, third-party terminate). Its entry must not survive.
    h.driver.remove_machine("i-1");
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.terminated, 0);
    assert_eq!(h.manager.status().await.queued_terminations, 0);
    // i-2 remains untouched: pool is at the desired size of 1.
    assert_eq!(h.driver.machine_ids(), vec!["i-2"]);
}

#[tokio::test]
async fn fetch_failure_aborts_the_pass_and_the_next_one_recovers() {
    let h = Harness::empty();
    h.configure(Some(2), VictimSelectionPolicy::Oldest, 0).await;

    h.driver.fail_next_list();
    let err = h.manager.resize().await.unwrap_err();
    assert!(matches!(err, PoolError::Driver(_)));
    assert_eq!(h.dispatcher.count_topic(topics::POOL_FETCH_FAILED), 1);
    // Aborted pass made no state changes and started nothing.
    assert!(h.driver.machines().is_empty());

    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.requested, 2);
    assert_eq!(h.driver.machines().len(), 2);
}

#[tokio::test]
async fn one_failed_termination_does_not_block_the_rest() {
    let h = Harness::with_machines(vec![
        running_machine("i-1", "2024-03-01T07:00:00Z"),
        running_machine("i-2", "2024-03-01T08:00:00Z"),
        running_machine("i-3", "2024-03-01T09:00:00Z"),
    ]);
    h.configure(Some(1), VictimSelectionPolicy::Oldest, 0).await;
    h.driver.fail_termination_of("i-1");

    let summary = h.manager.resize().await.unwrap();

    assert_eq!(summary.terminated, 1);
    assert_eq!(summary.failed_terminations, 1);
    assert_eq!(
        h.dispatcher.count_topic(topics::MACHINE_TERMINATION_FAILED),
        1
    );
    // i-2 went; i-1 survived its failed call and stays in the pool.
    assert_eq!(h.driver.machine_ids(), vec!["i-1", "i-3"]);
}

#[tokio::test]
async fn failed_terminations_are_not_requeued_but_retried_via_later_snapshots() {
    let h = Harness::with_machines(vec![
        running_machine("i-1", "2024-03-01T07:00:00Z"),
        running_machine("i-2", "2024-03-01T08:00:00Z"),
    ]);
    h.configure(Some(1), VictimSelectionPolicy::Oldest, 0).await;
    h.driver.fail_termination_of("i-1");

    h.manager.resize().await.unwrap();
    // Not re-queued after the failure.
    assert_eq!(h.manager.status().await.queued_terminations, 0);

    // Next pass sees i-1 still present and selects it again.
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.failed_terminations, 1);

    // Once the backend recovers, the machine finally goes.
    h.driver.clear_termination_failures();
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.terminated, 1);
    assert_eq!(h.driver.machine_ids(), vec!["i-2"]);
}

#[tokio::test]
async fn partial_start_accepts_the_machines_that_did_come_up() {
    let h = Harness::empty();
    h.configure(Some(5), VictimSelectionPolicy::Oldest, 0).await;
    h.driver.limit_start_capacity(2);

    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.requested, 2);
    assert_eq!(summary.start_shortfall, 3);
    assert_eq!(h.driver.machines().len(), 2);
    assert_eq!(h.dispatcher.count_topic(topics::MACHINE_START_FAILED), 1);

    // The next pass requests only the remaining shortfall.
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.requested, 3);
    assert_eq!(h.driver.machines().len(), 5);
}

#[tokio::test]
async fn scale_up_spares_queued_machines_before_requesting_new_ones() {
    let h = Harness::with_machines(vec![
        running_machine("i-1", "2024-03-01T11:10:00Z"),
        running_machine("i-2", "2024-03-01T11:20:00Z"),
        running_machine("i-3", "2024-03-01T11:30:00Z"),
    ]);
    h.configure(
        Some(3),
        VictimSelectionPolicy::ClosestToNextBillingHour,
        300,
    )
    .await;

    // Scale in to 1: two machines queued with future termination times.
    h.manager.set_desired_size(1).await.unwrap();
    h.manager.resize().await.unwrap();
    assert_eq!(h.manager.status().await.queued_terminations, 2);

    // Scale back to 3 before they become due: both are spared, nothing
    // new is requested.
    h.manager.set_desired_size(3).await.unwrap();
    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.spared, 2);
    assert_eq!(summary.requested, 0);
    assert_eq!(h.manager.status().await.queued_terminations, 0);
    assert_eq!(h.driver.machines().len(), 3);
}

#[tokio::test]
async fn adopts_the_observed_size_when_no_target_was_ever_set() {
    let h = Harness::with_machines(vec![
        running_machine("i-1", "2024-03-01T08:00:00Z"),
        running_machine("i-2", "2024-03-01T09:00:00Z"),
    ]);
    h.configure(None, VictimSelectionPolicy::Oldest, 0).await;

    assert_eq!(h.manager.desired_size().await.unwrap(), None);
    let summary = h.manager.resize().await.unwrap();
    assert!(summary.is_quiet());
    assert_eq!(h.manager.desired_size().await.unwrap(), Some(2));
    assert_eq!(h.driver.machines().len(), 2);
}

#[tokio::test]
async fn quiet_passes_publish_no_summary_alert() {
    let h = Harness::with_machines(vec![running_machine("i-1", "2024-03-01T08:00:00Z")]);
    h.configure(Some(1), VictimSelectionPolicy::Oldest, 0).await;

    let summary = h.manager.resize().await.unwrap();
    assert!(summary.is_quiet());
    assert_eq!(h.dispatcher.count_topic(topics::RESIZE_PLANNED), 0);
}

#[tokio::test]
async fn background_worker_reconciles_on_its_own() {
    let h = Harness::empty();
    h.manager
        .configure(skypool_engine::PoolConfig {
            desired_capacity: Some(1),
            scale_out: serde_json::Value::Null,
            scale_in: Default::default(),
            pool_update_period_secs: 1,
        })
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert_eq!(h.driver.machines().len(), 1);

    h.manager.close().await;
}

#[tokio::test]
async fn protected_machines_survive_a_scale_in() {
    let mut protected = running_machine("i-1", "2024-03-01T07:00:00Z");
    protected.membership = skypool_model::MembershipStatus::protected();
    let h = Harness::with_machines(vec![
        protected,
        running_machine("i-2", "2024-03-01T08:00:00Z"),
        running_machine("i-3", "2024-03-01T09:00:00Z"),
    ]);
    h.configure(Some(1), VictimSelectionPolicy::Oldest, 0).await;

    let summary = h.manager.resize().await.unwrap();
    assert_eq!(summary.terminated, 2);
    // The oldest machine is protected; the next two oldest went.
    assert_eq!(h.driver.machine_ids(), vec!["i-1"]);
}
