use anyhow::Result;
use chrono::Local;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::{Frame, Terminal};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::accounting::{AccountingHandle, FlushOutcome, ProfileStore};
use crate::models::snapshot::ClockSnapshot;

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Timer,
    ViewingLogs,
}

/// Terminal view of the running active-time clock.
pub struct TimerApp<'a, S: ProfileStore> {
    pub state: AppState,
    handle: &'a AccountingHandle<S>,
    pub rate_multiplier: f64,
    pub snapshot: ClockSnapshot,
    pub pending_seconds: f64,
    pub last_sync: Option<String>,
    pub logs: Vec<String>,
}

impl<'a, S: ProfileStore> TimerApp<'a, S> {
    pub fn new(handle: &'a AccountingHandle<S>, rate_multiplier: f64) -> Self {
        Self {
            state: AppState::Timer,
            handle,
            rate_multiplier,
            snapshot: handle.snapshot(),
            pending_seconds: handle.pending_seconds(),
            last_sync: None,
            logs: vec![],
        }
    }

    pub fn subject_label(&self) -> &str {
        self.handle.subject_id().unwrap_or("no eligible subject")
    }

    fn push_log(&mut self, message: String) {
        self.logs.push(format!("[{}] {}", Local::now().format("%H:%M:%S"), message));
        if self.logs.len() > MAX_LOGS {
            self.logs.remove(0);
        }
    }

    fn refresh(&mut self) {
        let snapshot = self.handle.snapshot();
        if snapshot.idle != self.snapshot.idle {
            let message = if snapshot.idle { "Idle - timer paused" } else { "Active - timer running" };
            self.push_log(message.to_string());
        }
        self.snapshot = snapshot;
        self.pending_seconds = self.handle.pending_seconds();
    }

    pub fn record_flush(&mut self, outcome: FlushOutcome) {
        let message = match outcome {
            FlushOutcome::Skipped => "Nothing to sync yet".to_string(),
            FlushOutcome::Synced { added, remote_total } => {
                self.last_sync = Some(Local::now().format("%H:%M:%S").to_string());
                format!("Synced {}s (remote total {}s)", added, remote_total)
            }
            FlushOutcome::Failed => "Sync failed - will retry".to_string(),
        };
        self.push_log(message);
    }

    pub async fn run(&mut self, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
        log::info!("Starting UI...");

        if let Err(e) = enable_raw_mode() {
            eprintln!("Failed to enable raw mode: {}. Use --headless when no terminal is attached.", e);
            return Err(anyhow::anyhow!("Terminal raw mode not supported: {}", e));
        }
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(anyhow::anyhow!("Failed to setup terminal: {}", e));
        }
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal, &shutdown_flag).await;

        // Clean up terminal state
        if let Err(e) = disable_raw_mode() {
            log::warn!("Failed to disable raw mode: {}", e);
        }
        if let Err(e) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
            log::warn!("Failed to leave alternate screen: {}", e);
        }
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        shutdown_flag: &AtomicBool,
    ) -> Result<()> {
        loop {
            self.refresh();
            terminal.draw(|f| self.draw(f))?;

            if shutdown_flag.load(Ordering::Relaxed) {
                log::info!("Received shutdown signal, exiting UI...");
                return Ok(());
            }

            // Keep the tokio worker free while waiting for keys
            let key = tokio::task::spawn_blocking(|| -> io::Result<Option<Event>> {
                if event::poll(Duration::from_millis(200))? {
                    Ok(Some(event::read()?))
                } else {
                    Ok(None)
                }
            })
            .await??;

            let Some(Event::Key(key)) = key else {
                continue;
            };
            log::debug!("Key pressed: {:?} in state: {:?}", key.code, self.state);

            match (self.state.clone(), key.code) {
                (AppState::Timer, KeyCode::Char('q')) | (AppState::Timer, KeyCode::Esc) => return Ok(()),
                (AppState::Timer, KeyCode::Char('s')) => {
                    let outcome = self.handle.flush_now().await;
                    self.record_flush(outcome);
                }
                (AppState::Timer, KeyCode::Char('l')) => self.state = AppState::ViewingLogs,
                (AppState::ViewingLogs, _) => self.state = AppState::Timer,
                _ => {}
            }
        }
    }

    fn draw(&self, f: &mut Frame) {
        crate::ui::render::draw(self, f);
    }
}
