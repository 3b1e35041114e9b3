use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{self, Duration, Instant};

use crate::accounting::{AccountingHandle, ProfileStore};
use crate::ui::render::format_hms;

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runs accounting without a terminal until SIGINT/SIGTERM.
pub struct Daemon<'a, S: ProfileStore> {
    handle: &'a AccountingHandle<S>,
}

impl<'a, S: ProfileStore> Daemon<'a, S> {
    pub fn new(handle: &'a AccountingHandle<S>) -> Self {
        Self { handle }
    }

    pub async fn run(&mut self, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
        log::info!("Starting headless activity accounting...");

        let mut snapshots = self.handle.subscribe();
        let mut last_idle = snapshots.borrow().idle;
        let mut last_status = Instant::now();

        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                log::info!("Received shutdown signal, flushing and exiting...");
                return Ok(());
            }

            // Wake on snapshot changes, but re-check the shutdown flag regularly
            if let Ok(Err(_)) = time::timeout(POLL_INTERVAL, snapshots.changed()).await {
                // Inert handles have no sender
                time::sleep(POLL_INTERVAL).await;
            }

            let snapshot = *snapshots.borrow_and_update();
            if snapshot.idle != last_idle {
                log::info!(
                    "{} at {}",
                    if snapshot.idle { "Idle" } else { "Active" },
                    format_hms(snapshot.total_seconds)
                );
                last_idle = snapshot.idle;
            }

            if last_status.elapsed() >= STATUS_LOG_INTERVAL {
                log::info!(
                    "Active time {} ({:.0}s pending sync)",
                    format_hms(snapshot.total_seconds),
                    self.handle.pending_seconds().floor()
                );
                last_status = Instant::now();
            }
        }
    }
}
