//! Pairing overlay: progress, PIN entry, device-side PINs and failed-step choices

use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::PairingPrompt;
use crate::ui::layout::centered;
use crate::ui::Theme;

/// PIN as typed so far, padded with placeholders
pub fn pin_boxes(input: &str, length: usize) -> String {
    (0..length)
        .map(|i| input.chars().nth(i).unwrap_or('_'))
        .map(|c| format!("[{}]", c))
        .collect::<Vec<_>>()
        .join(" ")
}

fn hint(key: &'static str, desc: &'static str) -> Vec<Span<'static>> {
    vec![
        Span::styled(format!(" {} ", key), Theme::keybind()),
        Span::styled(format!("{}  ", desc), Theme::dimmed()),
    ]
}

pub fn render(frame: &mut Frame, area: Rect, prompt: &PairingPrompt) {
    let (title, lines) = match prompt {
        PairingPrompt::Working { device, service } => (
            format!(" PAIRING {} ", device),
            vec![
                Line::from(""),
                Line::from(Span::styled(format!("Pairing {}...", service), Theme::loading())),
                Line::from(""),
                Line::from(hint("ESC", "cancel")),
            ],
        ),
        PairingPrompt::Pin {
            device,
            service,
            length,
            input,
        } => (
            format!(" PAIRING {} ", device),
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    format!("Enter the {}-digit PIN shown for {}", length, service),
                    Theme::text(),
                )),
                Line::from(""),
                Line::from(Span::styled(pin_boxes(input, *length), Theme::title())),
                Line::from(""),
                Line::from(
                    [hint("↵", "submit"), hint("TAB", "skip"), hint("ESC", "cancel")].concat(),
                ),
            ],
        ),
        PairingPrompt::DevicePin {
            device,
            service,
            pin,
        } => (
            format!(" PAIRING {} ", device),
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    format!("Type this PIN on {} for {}", device, service),
                    Theme::text(),
                )),
                Line::from(""),
                Line::from(Span::styled(pin_boxes(pin, pin.len()), Theme::title())),
                Line::from(""),
                Line::from(
                    [hint("↵", "done"), hint("TAB", "skip"), hint("ESC", "cancel")].concat(),
                ),
            ],
        ),
        PairingPrompt::Failed {
            device,
            service,
            error,
        } => (
            format!(" PAIRING {} ", device),
            vec![
                Line::from(""),
                Line::from(Span::styled(format!("{} failed", service), Theme::error())),
                Line::from(Span::styled(error.to_string(), Theme::text())),
                Line::from(""),
                Line::from(
                    [
                        hint("r", "retry"),
                        hint("s", "skip"),
                        hint("x", "stop"),
                        hint("ESC", "cancel"),
                    ]
                    .concat(),
                ),
            ],
        ),
    };

    let popup = centered(area, 64, 9);
    frame.render_widget(Clear, popup);
    let widget = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Double)
            .border_style(Theme::border_focused())
            .title(Span::styled(title, Theme::title()))
            .style(Theme::text()),
    );
    frame.render_widget(widget, popup);
}
