//! Flush conservation, rollback and teardown behaviour against a fake store.

use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

use crate::accounting::{AccountingConfig, AccountingHandle, ActivityAccounting, FlushOutcome};
use crate::tests::fakes::{ManualEnvironment, MemoryStore};

const SUBJECT: &str = "investor-7";

fn start(
    config: AccountingConfig,
    store: &Arc<MemoryStore>,
    env: &Arc<ManualEnvironment>,
) -> AccountingHandle<MemoryStore> {
    ActivityAccounting::start(config, Arc::clone(store), Arc::clone(env)).unwrap()
}

async fn advance_ms(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_flush_adds_whole_seconds_and_keeps_fraction() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 10));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT).with_multiplier(0.5), &store, &env);

    advance_ms(3_500).await;
    assert_eq!(handle.pending_seconds(), 1.5);

    assert_eq!(
        handle.flush_now().await,
        FlushOutcome::Synced { added: 1, remote_total: 11 }
    );
    assert_eq!(store.total(SUBJECT), Some(11));
    assert_eq!(handle.pending_seconds(), 0.5);

    // Half a second is not enough for another flush
    assert_eq!(handle.flush_now().await, FlushOutcome::Skipped);
    assert_eq!(store.write_count(), 1);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_rolls_back_exactly() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 50));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT).with_multiplier(1.5), &store, &env);

    advance_ms(5_500).await;
    assert_eq!(handle.pending_seconds(), 7.5);

    store.fail_writes(true);
    assert_eq!(handle.flush_now().await, FlushOutcome::Failed);
    assert_eq!(handle.pending_seconds(), 7.5);
    assert_eq!(store.total(SUBJECT), Some(50));

    store.fail_writes(false);
    assert_eq!(
        handle.flush_now().await,
        FlushOutcome::Synced { added: 7, remote_total: 57 }
    );
    assert_eq!(handle.pending_seconds(), 0.5);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_read_rolls_back_without_writing() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 50));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(4_500).await;
    store.fail_reads(true);
    assert_eq!(handle.flush_now().await, FlushOutcome::Failed);
    assert_eq!(handle.pending_seconds(), 4.0);
    assert_eq!(store.write_count(), 0);

    store.fail_reads(false);
    handle.shutdown().await;
    assert_eq!(store.total(SUBJECT), Some(54));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sync_retries_after_failure() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    store.fail_writes(true);
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(30_500).await;
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.total(SUBJECT), Some(100));
    assert_eq!(handle.pending_seconds(), 30.0);

    store.fail_writes(false);
    env.emit_activity();
    advance_ms(30_000).await;
    assert_eq!(store.total(SUBJECT), Some(160));
    assert_eq!(handle.pending_seconds(), 0.0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_once_and_stops_everything() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);
    assert_eq!(env.listener_count(), 1);

    advance_ms(10_500).await;
    assert_eq!(store.write_count(), 0);

    assert_eq!(
        handle.shutdown().await,
        FlushOutcome::Synced { added: 10, remote_total: 110 }
    );
    assert_eq!(store.write_count(), 1);
    assert_eq!(env.listener_count(), 0);

    let reads = store.read_count();
    advance_ms(120_000).await;
    env.emit_activity();
    assert_eq!(store.read_count(), reads);
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.total(SUBJECT), Some(110));
}

#[tokio::test(start_paused = true)]
async fn test_failed_shutdown_flush_is_reported_not_raised() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(3_500).await;
    store.fail_writes(true);
    assert_eq!(handle.shutdown().await, FlushOutcome::Failed);
    assert_eq!(store.total(SUBJECT), Some(100));
    assert_eq!(env.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_runs_final_flush() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(10_500).await;
    drop(handle);

    advance_ms(10).await;
    assert_eq!(store.total(SUBJECT), Some(110));
    assert_eq!(store.write_count(), 1);
    assert_eq!(env.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_flushes_do_not_double_count() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 0));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(10_500).await;
    let (first, second) = tokio::join!(handle.flush_now(), handle.flush_now());

    let synced: Vec<FlushOutcome> = [first, second]
        .into_iter()
        .filter(|outcome| matches!(outcome, FlushOutcome::Synced { .. }))
        .collect();
    assert_eq!(synced, vec![FlushOutcome::Synced { added: 10, remote_total: 10 }]);
    assert_eq!(store.total(SUBJECT), Some(10));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_remote_record_counts_from_zero() {
    let store = Arc::new(MemoryStore::default());
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(2_500).await;
    assert_eq!(handle.snapshot().total_seconds, 2);
    assert_eq!(
        handle.shutdown().await,
        FlushOutcome::Synced { added: 2, remote_total: 2 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_flush_keeps_pending_seconds() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(10_500).await;
    assert_eq!(handle.pending_seconds(), 10.0);

    // The read outlives the caller's deadline, so the flush future is dropped mid-call
    store.delay_next_read(Duration::from_secs(5));
    assert!(timeout(Duration::from_secs(1), handle.flush_now()).await.is_err());

    // Tick 11 landed while the read was in flight
    assert_eq!(handle.pending_seconds(), 11.0);
    assert_eq!(store.write_count(), 0);

    assert_eq!(
        handle.shutdown().await,
        FlushOutcome::Synced { added: 11, remote_total: 111 }
    );
    assert_eq!(store.total(SUBJECT), Some(111));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_during_flush_belong_to_next_window() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    advance_ms(10_500).await;
    store.delay_next_read(Duration::from_secs(3));

    // Ticks 11..=13 land while the read is in flight
    assert_eq!(
        handle.flush_now().await,
        FlushOutcome::Synced { added: 10, remote_total: 110 }
    );
    assert_eq!(handle.pending_seconds(), 3.0);
    assert_eq!(handle.snapshot().total_seconds, 113);

    assert_eq!(
        handle.shutdown().await,
        FlushOutcome::Synced { added: 3, remote_total: 113 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_periodic_flush() {
    let store = Arc::new(MemoryStore::with_total(SUBJECT, 100));
    let env = Arc::new(ManualEnvironment::new());
    let handle = start(AccountingConfig::for_subject(SUBJECT), &store, &env);

    // The periodic flush at t = 30s takes its delta, then reads until t = 35s
    advance_ms(10_500).await;
    store.delay_next_read(Duration::from_secs(5));
    advance_ms(22_000).await;
    assert_eq!(store.write_count(), 0);
    assert_eq!(handle.pending_seconds(), 2.0);

    // Shut down at t = 32.5s, in the middle of that read
    assert_eq!(
        handle.shutdown().await,
        FlushOutcome::Synced { added: 2, remote_total: 132 }
    );
    assert_eq!(store.write_count(), 2);
    assert_eq!(store.total(SUBJECT), Some(132));
}
