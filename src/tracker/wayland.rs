use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use zbus::Connection;

use crate::tracker::hub::SignalHub;

/// Idle times below this are treated as fresh input.
const ACTIVE_IDLE_SECS: u64 = 3;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// (destination, path, interface, method); each answers with idle milliseconds.
const IDLE_SOURCES: [(&str, &str, &str, &str); 3] = [
    (
        "org.gnome.Mutter.IdleMonitor",
        "/org/gnome/Mutter/IdleMonitor/Core",
        "org.gnome.Mutter.IdleMonitor",
        "GetIdletime",
    ),
    (
        "org.gnome.SessionManager",
        "/org/gnome/SessionManager/Presence",
        "org.gnome.SessionManager.Presence",
        "GetIdleTime",
    ),
    (
        "org.freedesktop.ScreenSaver",
        "/org/freedesktop/ScreenSaver",
        "org.freedesktop.ScreenSaver",
        "GetSessionIdleTime",
    ),
];

/// Asks the compositor how long the seat has been idle, in seconds.
pub async fn check_wayland_idle_time(connection: &Connection) -> Result<u64> {
    for (destination, path, interface, method) in IDLE_SOURCES {
        match connection
            .call_method(Some(destination), path, Some(interface), method, &())
            .await
        {
            Ok(response) => {
                let idle_ms: u64 = response.body().deserialize()?;
                return Ok(idle_ms / 1000);
            }
            Err(e) => log::debug!("{}.{} failed: {}", interface, method, e),
        }
    }

    // logind only exposes a boolean hint
    let response = connection
        .call_method(
            Some("org.freedesktop.login1"),
            "/org/freedesktop/login1/session/auto",
            Some("org.freedesktop.login1.Session"),
            "GetIdleHint",
            &(),
        )
        .await
        .map_err(|e| anyhow::anyhow!("All idle detection methods failed: {}", e))?;
    let idle_hint: bool = response.body().deserialize()?;
    Ok(if idle_hint { u64::MAX } else { 0 })
}

/// Polls the D-Bus idle time and emits an activity signal whenever it is
/// fresh. Used where rdev cannot see input (Wayland sessions).
pub fn spawn_idle_poller(hub: SignalHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        let connection = match Connection::session().await {
            Ok(connection) => connection,
            Err(e) => {
                log::warn!("No D-Bus session bus, Wayland activity detection disabled: {}", e);
                return;
            }
        };

        let mut ticker = time::interval(POLL_INTERVAL);
        let mut failing = false;
        loop {
            ticker.tick().await;
            match check_wayland_idle_time(&connection).await {
                Ok(idle_secs) => {
                    failing = false;
                    log::debug!("Wayland idle time: {} seconds", idle_secs);
                    if idle_secs < ACTIVE_IDLE_SECS {
                        hub.emit();
                    }
                }
                Err(e) => {
                    if !failing {
                        log::warn!("Failed to check Wayland idle time: {}", e);
                        failing = true;
                    }
                }
            }
        }
    })
}
