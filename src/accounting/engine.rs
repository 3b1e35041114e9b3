use anyhow::{Result, bail};
use std::sync::{Arc, Weak};
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::accounting::clock::SessionClock;
use crate::accounting::environment::{ActivityEnvironment, Subscription};
use crate::accounting::store::ProfileStore;
use crate::accounting::sync::{FlushOutcome, Shared};
use crate::models::snapshot::ClockSnapshot;

pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(60);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AccountingConfig {
    /// Profile whose time is accounted. `None` disables accounting.
    pub subject_id: Option<String>,
    /// Eligibility gate, e.g. "profile is approved".
    pub enabled: bool,
    /// Seconds credited per active tick.
    pub rate_multiplier: f64,
    pub idle_threshold: Duration,
    pub tick_interval: Duration,
    pub sync_interval: Duration,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            subject_id: None,
            enabled: false,
            rate_multiplier: 1.0,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            tick_interval: DEFAULT_TICK_INTERVAL,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl AccountingConfig {
    pub fn for_subject(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: Some(subject_id.into()),
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, rate_multiplier: f64) -> Self {
        self.rate_multiplier = rate_multiplier;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rate_multiplier.is_finite() || self.rate_multiplier <= 0.0 {
            bail!("rate multiplier must be a positive number, got {}", self.rate_multiplier);
        }
        if self.tick_interval.is_zero() || self.sync_interval.is_zero() {
            bail!("tick and sync intervals must be non-zero");
        }
        Ok(())
    }

    /// Subject id when accounting should actually run.
    fn active_subject(&self) -> Option<&str> {
        match &self.subject_id {
            Some(id) if self.enabled && !id.trim().is_empty() => Some(id.as_str()),
            _ => None,
        }
    }
}

pub struct ActivityAccounting;

impl ActivityAccounting {
    /// Starts accounting for the configured subject on the current tokio runtime.
    ///
    /// A missing subject or `enabled = false` yields an inert handle: no tasks,
    /// no listeners, and a zero idle snapshot. Errors only on invalid config.
    pub fn start<S, E>(config: AccountingConfig, store: Arc<S>, env: Arc<E>) -> Result<AccountingHandle<S>>
    where
        S: ProfileStore,
        E: ActivityEnvironment,
    {
        config.validate()?;

        let Some(subject_id) = config.active_subject() else {
            log::info!("Activity accounting disabled (no eligible subject)");
            let (_tx, snapshot_rx) = watch::channel(ClockSnapshot::inert());
            return Ok(AccountingHandle {
                active: None,
                snapshot_rx,
            });
        };

        let now = Instant::now();
        let clock = SessionClock::new(config.rate_multiplier, config.idle_threshold, now);
        let (snapshot_tx, snapshot_rx) = watch::channel(clock.snapshot());
        let shared = Arc::new(Shared::new(subject_id.to_string(), store, clock, snapshot_tx));
        let (stop_tx, stop_rx) = watch::channel(false);

        let weak: Weak<Shared<S>> = Arc::downgrade(&shared);
        let subscription = env.on_activity_signal(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.record_activity(Instant::now());
            }
        }));

        // Flushes wait for the seed, so its read never already holds this session's writes
        let seed_gate = shared.hold_flushes();
        let tasks = vec![
            tokio::spawn(seed_total(Arc::clone(&shared), seed_gate, stop_rx.clone())),
            tokio::spawn(run_ticks(
                Arc::clone(&shared),
                env,
                config.tick_interval,
                stop_rx.clone(),
            )),
            tokio::spawn(run_sync(Arc::clone(&shared), config.sync_interval, stop_rx)),
        ];

        log::info!(
            "Activity accounting started for subject {} (x{} multiplier)",
            subject_id, config.rate_multiplier
        );

        Ok(AccountingHandle {
            active: Some(ActiveSession {
                shared,
                stop_tx,
                tasks,
                subscription,
            }),
            snapshot_rx,
        })
    }
}

struct ActiveSession<S> {
    shared: Arc<Shared<S>>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    subscription: Subscription,
}

/// Owner of a running accounting instance.
///
/// Call [`shutdown`](Self::shutdown) to stop it and await the final flush.
/// Dropping the handle schedules the same teardown on the current runtime
/// without waiting for it.
pub struct AccountingHandle<S: ProfileStore> {
    active: Option<ActiveSession<S>>,
    snapshot_rx: watch::Receiver<ClockSnapshot>,
}

impl<S: ProfileStore> AccountingHandle<S> {
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.active.as_ref().map(|session| session.shared.subject_id.as_str())
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        *self.snapshot_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Seconds accrued locally and not yet written to the store.
    pub fn pending_seconds(&self) -> f64 {
        self.active
            .as_ref()
            .map(|session| session.shared.pending_seconds())
            .unwrap_or(0.0)
    }

    /// Flushes now through the same serialized path as the sync process.
    pub async fn flush_now(&self) -> FlushOutcome {
        match &self.active {
            Some(session) => session.shared.flush().await,
            None => FlushOutcome::Skipped,
        }
    }

    pub async fn shutdown(mut self) -> FlushOutcome {
        match self.active.take() {
            Some(session) => teardown(session).await,
            None => FlushOutcome::Skipped,
        }
    }
}

impl<S: ProfileStore> Drop for AccountingHandle<S> {
    fn drop(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    teardown(session).await;
                });
            }
            Err(_) => {
                let _ = session.stop_tx.send(true);
                log::warn!(
                    "No runtime available, skipping final flush for subject {}",
                    session.shared.subject_id
                );
            }
        }
    }
}

async fn teardown<S: ProfileStore>(session: ActiveSession<S>) -> FlushOutcome {
    let ActiveSession {
        shared,
        stop_tx,
        tasks,
        subscription,
    } = session;

    let _ = stop_tx.send(true);
    subscription.unsubscribe();

    // The sync task may be mid-flush; let it finish so its rollback still lands.
    for task in tasks {
        if let Err(e) = task.await {
            log::warn!("Accounting task for subject {} ended abnormally: {}", shared.subject_id, e);
        }
    }

    let outcome = shared.flush().await;
    log::info!("Activity accounting stopped for subject {} ({:?})", shared.subject_id, outcome);
    outcome
}

async fn seed_total<S: ProfileStore>(
    shared: Arc<Shared<S>>,
    _flush_gate: Option<OwnedMutexGuard<()>>,
    mut stop: watch::Receiver<bool>,
) {
    tokio::select! {
        result = shared.store.fetch_total(&shared.subject_id) => match result {
            Ok(total) => {
                let total = total.unwrap_or(0);
                log::info!("Loaded {}s of active time for subject {}", total, shared.subject_id);
                shared.seed(total);
            }
            Err(e) => {
                log::warn!("Failed to load active time for subject {}: {:#}", shared.subject_id, e);
            }
        },
        _ = stop.changed() => {}
    }
}

async fn run_ticks<S, E>(
    shared: Arc<Shared<S>>,
    env: Arc<E>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) where
    S: ProfileStore,
    E: ActivityEnvironment,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        let foreground = env.is_foreground();
        if !shared.tick(Instant::now(), foreground) {
            log::debug!("Idle tick for subject {} (foreground={})", shared.subject_id, foreground);
        }
    }
}

async fn run_sync<S: ProfileStore>(shared: Arc<Shared<S>>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        // Let a tick due at the same instant land before the delta is taken.
        tokio::task::yield_now().await;
        shared.flush().await;
    }
}
