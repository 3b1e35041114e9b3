mod accounting;
mod config;
mod daemon;
mod database;
mod models;
mod tracker;
mod ui;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

use crate::accounting::{ActivityAccounting, FlushOutcome};
use crate::config::settings::{Settings, debug_logs_enabled};
use crate::daemon::headless::Daemon;
use crate::database::connection::Database;
use crate::tracker::desktop::DesktopEnvironment;
use crate::ui::app::TimerApp;

const LOG_FILE: &str = "accounting.log";

/// A writer that flushes after every write to ensure logs appear immediately
struct FlushingWriter {
    inner: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let result = file.write(buf);
        file.flush()?;
        result
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        file.flush()
    }
}

fn cli() -> Command {
    Command::new("Activity Accounting")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Account a profile's active time and sync it to the marketplace database")
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("ID")
                .help("Profile id to account (overrides SUBJECT_ID)"),
        )
        .arg(
            Arg::new("multiplier")
                .long("multiplier")
                .value_name("M")
                .value_parser(clap::value_parser!(f64))
                .help("Seconds credited per active second (overrides RATE_MULTIPLIER)"),
        )
        .arg(
            Arg::new("headless")
                .long("headless")
                .help("Run without the terminal UI until SIGINT/SIGTERM")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .help("Print the subject's stored active time as JSON and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("init-db")
                .long("init-db")
                .help("Create or migrate the profiles table and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-idle")
                .long("test-idle")
                .help("Test D-Bus idle detection and exit")
                .action(ArgAction::SetTrue),
        )
}

fn init_logging(debug_enabled: bool, headless: bool) -> Result<()> {
    if debug_enabled {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(LOG_FILE)
            .with_context(|| format!("Failed to open {}", LOG_FILE))?;

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("activity_accounting=debug"))
            .target(env_logger::Target::Pipe(Box::new(FlushingWriter::new(log_file))))
            .init();

        log::info!("=== DEBUG LOGGING ENABLED ===");
        log::info!("Writing logs to {}", LOG_FILE);
    } else if headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("activity_accounting=info")).init();
    } else {
        // Anything on stderr would corrupt the TUI
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    Settings::load_env_file()?;

    let debug_enabled = debug_logs_enabled(|key| env::var(key).ok())?;
    let headless = matches.get_flag("headless");
    init_logging(debug_enabled, headless)?;

    if matches.get_flag("test-idle") {
        return test_idle_detection().await;
    }

    log::info!("Starting Activity Accounting");
    let mut settings = Settings::new()?;
    if let Some(subject) = matches.get_one::<String>("subject") {
        settings.subject_id = Some(subject.clone()).filter(|s| !s.trim().is_empty());
    }
    if let Some(multiplier) = matches.get_one::<f64>("multiplier") {
        settings.rate_multiplier = *multiplier;
    }

    log::info!("Connecting to database...");
    let database = match Database::new(&settings.database_url).await {
        Ok(db) => {
            log::info!("Database connection successful");
            db
        }
        Err(e) => {
            log::error!("Database connection failed: {:?}", e);
            eprintln!("❌ Failed to connect to database. Please check:");
            eprintln!("  - .env file has correct DATABASE_URL");
            eprintln!("  - The database accepts connections from this machine");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if matches.get_flag("init-db") {
        database.create_table().await?;
        println!("✅ profiles table is ready");
        return Ok(());
    }

    if matches.get_flag("status") {
        let subject_id = settings
            .subject_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--status needs a subject (SUBJECT_ID or --subject)"))?;
        let summary = database.get_profile_summary(subject_id).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let enabled = subject_enabled(&database, &settings).await;
    let config = settings.accounting_config(enabled);
    let environment = Arc::new(DesktopEnvironment::new(&settings.tracked_apps));
    let handle = ActivityAccounting::start(config, Arc::new(database), environment)?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown_flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown_flag))?;

    let result = if headless {
        Daemon::new(&handle).run(shutdown_flag).await
    } else {
        TimerApp::new(&handle, settings.rate_multiplier).run(shutdown_flag).await
    };

    // Final flush runs even when the front-end failed
    match handle.shutdown().await {
        FlushOutcome::Failed => eprintln!("⚠ Final sync failed; unsynced seconds were not saved"),
        FlushOutcome::Synced { added, remote_total } => {
            log::info!("Final sync added {}s (remote total {}s)", added, remote_total)
        }
        FlushOutcome::Skipped => {}
    }

    result
}

/// Whether the configured subject may accrue time. Store errors disable accounting.
async fn subject_enabled(database: &Database, settings: &Settings) -> bool {
    let Some(subject_id) = settings.subject_id.as_deref() else {
        log::info!("No SUBJECT_ID configured");
        return false;
    };
    if !settings.require_approval {
        return true;
    }
    match database.is_subject_approved(subject_id).await {
        Ok(true) => true,
        Ok(false) => {
            log::info!("Subject {} is not approved, accounting disabled", subject_id);
            false
        }
        Err(e) => {
            log::warn!("Failed to read approval for subject {}: {:#}", subject_id, e);
            false
        }
    }
}

async fn test_idle_detection() -> Result<()> {
    println!("Testing Wayland D-Bus idle detection...");

    let connection = zbus::Connection::session().await?;
    match tracker::wayland::check_wayland_idle_time(&connection).await {
        Ok(idle_time) => {
            println!("✅ Success! Idle time: {} seconds", idle_time);
        }
        Err(e) => {
            println!("❌ Failed: {}", e);
        }
    }

    Ok(())
}
