use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::accounting::{ActivityCallback, ActivityEnvironment, Subscription};
use crate::tracker::foreground::ForegroundFilter;
use crate::tracker::hub::SignalHub;
use crate::tracker::{input, wayland};

const FOREGROUND_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub fn uses_wayland() -> bool {
    std::env::var("XDG_SESSION_TYPE").map(|t| t == "wayland").unwrap_or(false)
        || std::env::var_os("WAYLAND_DISPLAY").is_some()
}

/// Activity environment backed by the real desktop session.
pub struct DesktopEnvironment {
    hub: SignalHub,
    foreground: Arc<AtomicBool>,
    pollers: Vec<JoinHandle<()>>,
}

impl DesktopEnvironment {
    /// Must be called inside a tokio runtime.
    pub fn new(tracked_apps: &[String]) -> Self {
        let hub = SignalHub::new();
        let mut pollers = Vec::new();

        if uses_wayland() {
            log::info!("Wayland detected - using D-Bus idle monitoring");
            pollers.push(wayland::spawn_idle_poller(hub.clone()));
        } else {
            log::info!("Using rdev input monitoring");
            input::start_input_hook(hub.clone());
        }

        let foreground = Arc::new(AtomicBool::new(true));
        let filter = ForegroundFilter::new(tracked_apps);
        if !filter.is_unrestricted() {
            pollers.push(spawn_foreground_poller(filter, Arc::clone(&foreground)));
        }

        Self {
            hub,
            foreground,
            pollers,
        }
    }
}

impl ActivityEnvironment for DesktopEnvironment {
    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Relaxed)
    }

    fn on_activity_signal(&self, callback: ActivityCallback) -> Subscription {
        self.hub.subscribe(callback)
    }
}

impl Drop for DesktopEnvironment {
    fn drop(&mut self) {
        for poller in &self.pollers {
            poller.abort();
        }
    }
}

fn spawn_foreground_poller(filter: ForegroundFilter, foreground: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(FOREGROUND_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let probe = filter.clone();
            match tokio::task::spawn_blocking(move || probe.probe()).await {
                Ok(visible) => {
                    if foreground.swap(visible, Ordering::Relaxed) != visible {
                        log::debug!("Tracked app foreground: {}", visible);
                    }
                }
                Err(e) => log::warn!("Foreground probe panicked: {}", e),
            }
        }
    })
}
