use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::{Duration, Instant},
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use proctor_environment::WatcherHandle;
use proctor_types::{
    environment::{HostEvent, KeyStroke},
    events::{EventPayload, SystemEvent},
    violation::{Severity, Violation},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Event(SystemEvent),
}

struct LiveAlert {
    violation: Violation,
    expires_at: Instant,
}

pub fn run(receiver: Receiver<UiMessage>, host: WatcherHandle, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &host, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    host: &WatcherHandle,
    summary: &str,
) -> Result<()> {
    let mut logs: VecDeque<String> = VecDeque::with_capacity(MAX_LOG_ENTRIES);
    let mut alerts: Vec<LiveAlert> = Vec::new();
    let mut last_status = String::from("idle");
    let mut tab_hidden = false;

    loop {
        let mut receiver_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => {
                    if let Some(status) = summarize_status(&event) {
                        last_status = status;
                    }
                    if let EventPayload::Violation(violation) = &event.payload {
                        alerts.push(LiveAlert {
                            violation: violation.clone(),
                            expires_at: Instant::now() + violation.severity.alert_ttl(),
                        });
                    }
                    if matches!(event.payload, EventPayload::Presence(_)) {
                        continue;
                    }
                    if logs.len() == MAX_LOG_ENTRIES {
                        logs.pop_front();
                    }
                    logs.push_back(format_event(&event));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    receiver_closed = true;
                    break;
                }
            }
        }
        let now = Instant::now();
        alerts.retain(|alert| alert.expires_at > now);

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Length(7),
                        Constraint::Min(0),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Proctor",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(last_status.clone()),
                Span::raw("  "),
                Span::styled("config:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("t b f F k", Style::default().fg(Color::Yellow)),
                Span::raw(" host events, "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" to end"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Session"));
            f.render_widget(header, chunks[0]);

            let live: Vec<ListItem> = alerts
                .iter()
                .rev()
                .map(|alert| {
                    ListItem::new(alert.violation.description.clone())
                        .style(Style::default().fg(severity_color(alert.violation.severity)))
                })
                .collect();
            f.render_widget(
                List::new(live).block(Block::default().borders(Borders::ALL).title("Alerts")),
                chunks[1],
            );

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("Recent events"));
            f.render_widget(list, chunks[2]);
        })?;

        if receiver_closed {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                let host_event = match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('t') => {
                        tab_hidden = !tab_hidden;
                        Some(HostEvent::VisibilityChanged { hidden: tab_hidden })
                    }
                    KeyCode::Char('b') => Some(HostEvent::WindowBlur),
                    KeyCode::Char('f') => Some(HostEvent::FullscreenChanged { active: false }),
                    KeyCode::Char('F') => Some(HostEvent::FullscreenChanged { active: true }),
                    KeyCode::Char('k') => Some(HostEvent::KeyDown(KeyStroke::new("c").ctrl())),
                    _ => None,
                };
                if let Some(host_event) = host_event {
                    host.dispatch(host_event);
                }
            }
        }
    }

    Ok(())
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Low => Color::Gray,
        Severity::Medium => Color::Yellow,
        Severity::High => Color::LightRed,
        Severity::Critical => Color::Red,
    }
}

fn summarize_status(event: &SystemEvent) -> Option<String> {
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => Some(format!("state: {:?}", lifecycle.state)),
        EventPayload::Presence(reading) => Some(format!(
            "face {} / people {} / {}",
            if reading.face_detected { "yes" } else { "no" },
            reading.person_count,
            if reading.looking_at_screen {
                "on screen"
            } else {
                "looking away"
            }
        )),
        EventPayload::Violation(_) | EventPayload::Alert(_) => None,
    }
}

fn format_event(event: &SystemEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] Lifecycle::{:?} {}",
            timestamp,
            lifecycle.state,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Violation(violation) => format!(
            "[{}] {:?} {:?}: {}",
            timestamp, violation.severity, violation.kind, violation.description
        ),
        EventPayload::Presence(reading) => format!(
            "[{}] Presence confidence={:.2}",
            timestamp, reading.confidence
        ),
        EventPayload::Alert(alert) => format!(
            "[{}] Alert {} {}",
            timestamp,
            alert.message,
            alert.remediation.clone().unwrap_or_default()
        ),
    }
}
