//! Device list panel

use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, AppState};
use crate::ui::Theme;
use crate::ui_state::ConnectionState;

pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let focused = app.state == AppState::Devices;
    let title = if app.ui.discovery.is_loading() {
        " DEVICES ⟳ ".to_string()
    } else {
        format!(" DEVICES ({}) ", app.devices.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if focused {
            Theme::border_focused()
        } else {
            Theme::border()
        })
        .title(Span::styled(title, Theme::title()));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.devices.is_empty() {
        let text = if app.ui.discovery.is_loading() {
            Paragraph::new("Scanning the network...").style(Theme::loading())
        } else {
            Paragraph::new(vec![
                Line::from("No devices"),
                Line::from(""),
                Line::from(vec![
                    Span::styled(" r ", Theme::keybind()),
                    Span::styled("scan", Theme::dimmed()),
                ]),
            ])
            .style(Theme::dimmed())
        };
        frame.render_widget(text.alignment(Alignment::Center), inner);
        return;
    }

    let connected_id = match &app.ui.connection {
        ConnectionState::Connected { identifier, .. } => Some(identifier.as_str()),
        _ => None,
    };

    // Keep the selected row visible
    let visible = inner.height as usize;
    let mut list = app.list.clone();
    list.scroll_into_view(visible);

    let items: Vec<ListItem> = app
        .devices
        .iter()
        .enumerate()
        .skip(list.offset)
        .take(visible)
        .map(|(i, device)| {
            let selected = i == app.list.selected;
            let marker = if connected_id == Some(device.identifier.as_str()) {
                "● "
            } else {
                "  "
            };
            let status = device.pairing_status();
            let line = Line::from(vec![
                Span::styled(marker, Theme::success()),
                Span::styled(
                    device.name.clone(),
                    if selected { Theme::selected() } else { Theme::text() },
                ),
                Span::raw(" "),
                Span::styled(device.address.to_string(), Theme::dimmed()),
                Span::raw(" "),
                Span::styled(format!("[{}]", status), Theme::pairing_status(status)),
            ]);
            ListItem::new(line)
        })
        .collect();

    frame.render_widget(List::new(items), inner);
}
