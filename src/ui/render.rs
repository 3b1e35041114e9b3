use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::Frame;

use crate::accounting::ProfileStore;
use crate::ui::app::{AppState, TimerApp};

/// `HH:MM:SS`, with hours growing past two digits as needed.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Timer colour: dimmed while idle.
pub fn timer_style(idle: bool) -> Style {
    if idle {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    }
}

pub fn draw<S: ProfileStore>(app: &TimerApp<'_, S>, f: &mut Frame) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)].as_ref())
        .split(size);

    let status = match &app.state {
        AppState::Timer => format!(
            "Subject: {} | x{} | [s] Sync now | [l] Logs | [q] Quit",
            app.subject_label(),
            app.rate_multiplier
        ),
        AppState::ViewingLogs => "Viewing Logs - Press any key to return".to_string(),
    };
    let status_widget = Paragraph::new(status).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status_widget, chunks[0]);

    match &app.state {
        AppState::Timer => draw_timer(app, f, chunks[1]),
        AppState::ViewingLogs => {
            let log_items: Vec<ListItem> = app
                .logs
                .iter()
                .rev()
                .take(20)
                .map(|log| ListItem::new(Line::from(log.clone())))
                .collect();
            let log_list = List::new(log_items).block(Block::default().borders(Borders::ALL).title("Logs"));
            f.render_widget(log_list, chunks[1]);
        }
    }
}

fn draw_timer<S: ProfileStore>(app: &TimerApp<'_, S>, f: &mut Frame, area: Rect) {
    let snapshot = app.snapshot;
    let (status, color) = if snapshot.idle { ("Idle", Color::DarkGray) } else { ("Active", Color::Green) };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(format_hms(snapshot.total_seconds), timer_style(snapshot.idle))),
        Line::from(""),
        Line::from(vec![
            Span::styled("Status: ", Style::default()),
            Span::styled(status, Style::default().fg(color)),
        ]),
        Line::from(format!("Pending sync: {:.0}s", app.pending_seconds.floor())),
        Line::from(format!(
            "Last sync: {}",
            app.last_sync.as_deref().unwrap_or("not yet")
        )),
    ];

    let timer = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("⏱ Active Time"));
    f.render_widget(timer, centered_rect(60, 60, area));
}

pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
