//! Terminal UI
//!
//! Header, device/remote/now-playing panels, status bar, and overlays.
//! Everything here only reads [`App`].

pub mod devices;
pub mod layout;
pub mod now_playing;
pub mod pairing;
pub mod remote;
pub mod theme;

pub use theme::Theme;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::time::Instant;

use crate::app::{App, AppState, InputMode};
use crate::ui_state::Notice;

/// Draw the whole screen
pub fn draw(frame: &mut Frame, app: &App, now: Instant) {
    let area = frame.area();
    frame.render_widget(Clear, area);
    frame.render_widget(Block::default().style(Theme::text()), area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(1),    // Panels
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header(frame, chunks[0], app);

    let panels = layout::split(chunks[1]);
    devices::render(frame, panels.devices, app);
    remote::render(frame, panels.remote, app, now);
    now_playing::render(frame, panels.now_playing, app);

    render_status_bar(frame, chunks[2], app);

    if let Some(prompt) = &app.pairing {
        pairing::render(frame, area, prompt);
    }
    if let Some(notice) = &app.ui.notice {
        render_notice(frame, area, notice);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            " ATV",
            Style::default()
                .fg(Theme::PRIMARY)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("TUI ", Style::default().fg(Theme::TEXT)),
    ];
    if let Some(msg) = app.ui.discovery.message() {
        spans.push(Span::styled(format!(" {} ", msg), Theme::loading()));
    }
    if let Some(msg) = app.ui.pairing.message() {
        spans.push(Span::styled(format!(" {} ", msg), Theme::loading()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let help = match (app.input_mode.clone(), app.state) {
        (InputMode::Pin, _) => " 0-9:PIN  ↵:submit  TAB:skip  ESC:cancel ",
        (InputMode::Normal, AppState::Devices) => {
            " r:scan  ↵:connect  p:pair  d:forget  TAB:remote  q:quit "
        }
        (InputMode::Normal, AppState::Remote) => {
            " ←↑↓→:move  ↵:select  m:menu  h:home  SPACE:play/pause  +/-:volume  TAB:devices "
        }
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", app.ui.connection.label()),
            if app.ui.controls_enabled() {
                Theme::success()
            } else {
                Theme::dimmed()
            },
        ),
        Span::raw("│"),
        Span::styled(help, Theme::dimmed()),
    ]);
    frame.render_widget(Paragraph::new(line).style(Theme::status_bar()), area);
}

fn render_notice(frame: &mut Frame, area: Rect, notice: &Notice) {
    let popup = layout::centered(area, 60, 7);
    frame.render_widget(Clear, popup);

    let (style, title) = match notice.kind {
        Some(kind) => (Theme::error(), format!(" ✗ {} · {} ", notice.title, kind)),
        None => (Theme::title(), format!(" {} ", notice.title)),
    };

    let widget = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(notice.message.clone(), Theme::text())),
        Line::from(""),
        Line::from(Span::styled("press any key", Theme::dimmed())),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Double)
            .border_style(style)
            .title(Span::styled(title, style))
            .style(Theme::text()),
    );
    frame.render_widget(widget, popup);
}
