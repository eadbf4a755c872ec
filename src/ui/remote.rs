//! Remote control pad
//!
//! ```text
//!        [ ▲ ]
//!  [ ◀ ] [ OK ] [ ▶ ]
//!        [ ▼ ]
//!  [MENU] [HOME] [⏯]
//!  [ ⏮ ] [ ⏹ ] [ ⏭ ]
//!     [VOL -] [VOL +]
//! ```
//!
//! A pressed button stays highlighted for the configured duration. Without
//! a session every button is drawn disabled.

use ratatui::{
    layout::{Alignment, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use std::time::Instant;

use crate::app::{App, AppState};
use crate::ui::Theme;
use crate::ui_state::{Button, UiState};

/// Label drawn for a button
pub fn label(button: Button) -> &'static str {
    match button {
        Button::Up => " ▲ ",
        Button::Down => " ▼ ",
        Button::Left => " ◀ ",
        Button::Right => " ▶ ",
        Button::Select => " OK ",
        Button::Menu => "MENU",
        Button::Home => "HOME",
        Button::PlayPause => " ⏯ ",
        Button::Stop => " ⏹ ",
        Button::Next => " ⏭ ",
        Button::Previous => " ⏮ ",
        Button::VolumeUp => "VOL +",
        Button::VolumeDown => "VOL -",
    }
}

/// Style for a button in the current state
pub fn button_style(ui: &UiState, button: Button, now: Instant) -> Style {
    if !ui.controls_enabled() {
        Theme::button_disabled()
    } else if ui.is_highlighted(button, now) {
        Theme::button_pressed()
    } else {
        Theme::button()
    }
}

fn row(ui: &UiState, buttons: &[Button], now: Instant) -> Line<'static> {
    let mut spans = Vec::with_capacity(buttons.len() * 2);
    for (i, button) in buttons.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            format!("[{}]", label(*button)),
            button_style(ui, *button, now),
        ));
    }
    Line::from(spans)
}

pub fn render(frame: &mut Frame, area: Rect, app: &App, now: Instant) {
    let focused = app.state == AppState::Remote;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if focused {
            Theme::border_focused()
        } else {
            Theme::border()
        })
        .title(Span::styled(" REMOTE ", Theme::title()));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let ui = &app.ui;
    let status_style = if ui.controls_enabled() {
        Theme::success()
    } else {
        Theme::dimmed()
    };

    let lines = vec![
        Line::from(Span::styled(ui.connection.label(), status_style)),
        Line::from(""),
        row(ui, &[Button::Up], now),
        row(ui, &[Button::Left, Button::Select, Button::Right], now),
        row(ui, &[Button::Down], now),
        Line::from(""),
        row(ui, &[Button::Menu, Button::Home, Button::PlayPause], now),
        row(ui, &[Button::Previous, Button::Stop, Button::Next], now),
        row(ui, &[Button::VolumeDown, Button::VolumeUp], now),
    ];

    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
}
