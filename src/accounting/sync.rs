use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::time::Instant;

use crate::accounting::clock::SessionClock;
use crate::accounting::store::ProfileStore;
use crate::models::snapshot::ClockSnapshot;

/// Result of one flush attempt. Failures are already logged and rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Less than one whole second was pending.
    Skipped,
    Synced { added: u64, remote_total: i64 },
    Failed,
}

/// State shared between the tick, sync and activity processes of one subject.
pub(crate) struct Shared<S> {
    pub(crate) subject_id: String,
    pub(crate) store: Arc<S>,
    clock: Mutex<SessionClock>,
    flush_gate: Arc<tokio::sync::Mutex<()>>,
    snapshot_tx: watch::Sender<ClockSnapshot>,
}

impl<S: ProfileStore> Shared<S> {
    pub(crate) fn new(
        subject_id: String,
        store: Arc<S>,
        clock: SessionClock,
        snapshot_tx: watch::Sender<ClockSnapshot>,
    ) -> Self {
        Self {
            subject_id,
            store,
            clock: Mutex::new(clock),
            flush_gate: Arc::new(tokio::sync::Mutex::new(())),
            snapshot_tx,
        }
    }

    fn lock_clock(&self) -> MutexGuard<'_, SessionClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks every flush until the returned guard is dropped.
    pub(crate) fn hold_flushes(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.flush_gate).try_lock_owned().ok()
    }

    fn publish(&self, snapshot: ClockSnapshot) {
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    pub(crate) fn seed(&self, remote_total: i64) {
        let snapshot = {
            let mut clock = self.lock_clock();
            clock.seed(remote_total);
            clock.snapshot()
        };
        self.publish(snapshot);
    }

    pub(crate) fn tick(&self, now: Instant, foreground: bool) -> bool {
        let (credited, snapshot) = {
            let mut clock = self.lock_clock();
            let credited = clock.tick(now, foreground);
            (credited, clock.snapshot())
        };
        self.publish(snapshot);
        credited
    }

    pub(crate) fn record_activity(&self, now: Instant) {
        let (was_idle, snapshot) = {
            let mut clock = self.lock_clock();
            let was_idle = clock.is_idle();
            clock.record_activity(now);
            (was_idle, clock.snapshot())
        };
        if was_idle {
            log::debug!("Activity resumed for subject {}", self.subject_id);
        }
        self.publish(snapshot);
    }

    pub(crate) fn pending_seconds(&self) -> f64 {
        self.lock_clock().accumulated_unsynced()
    }

    /// One read-modify-write cycle against the store.
    ///
    /// The whole-second delta leaves the local counter before the network
    /// calls, so ticks landing meanwhile belong to the next flush. On failure
    /// the delta is put back for the next attempt, and the same happens when
    /// the flush future is dropped before the write completes.
    pub(crate) async fn flush(&self) -> FlushOutcome {
        let _gate = self.flush_gate.lock().await;

        let pending = self.lock_clock().take_pending();
        let Some(to_add) = pending else {
            return FlushOutcome::Skipped;
        };
        let taken = TakenDelta {
            shared: self,
            seconds: to_add,
            committed: false,
        };

        match self.push_delta(to_add).await {
            Ok(remote_total) => {
                taken.commit();
                log::info!(
                    "Synced {}s of active time for subject {} (remote total {}s)",
                    to_add, self.subject_id, remote_total
                );
                FlushOutcome::Synced { added: to_add, remote_total }
            }
            Err(e) => {
                drop(taken);
                log::warn!(
                    "Failed to sync {}s for subject {}, will retry: {:#}",
                    to_add, self.subject_id, e
                );
                FlushOutcome::Failed
            }
        }
    }

    async fn push_delta(&self, to_add: u64) -> Result<i64> {
        let remote_total = self
            .store
            .fetch_total(&self.subject_id)
            .await
            .context("reading remote total")?
            .unwrap_or(0)
            .max(0);
        let delta = i64::try_from(to_add).context("pending delta out of range")?;
        let new_total = remote_total.saturating_add(delta);
        self.store
            .write_total(&self.subject_id, new_total)
            .await
            .context("writing remote total")?;
        Ok(new_total)
    }
}

/// Seconds taken out of the clock for one flush, put back on drop unless committed.
struct TakenDelta<'a, S: ProfileStore> {
    shared: &'a Shared<S>,
    seconds: u64,
    committed: bool,
}

impl<S: ProfileStore> TakenDelta<'_, S> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl<S: ProfileStore> Drop for TakenDelta<'_, S> {
    fn drop(&mut self) {
        if !self.committed {
            self.shared.lock_clock().restore_pending(self.seconds);
            log::debug!(
                "Restored {}s pending for subject {}",
                self.seconds, self.shared.subject_id
            );
        }
    }
}
