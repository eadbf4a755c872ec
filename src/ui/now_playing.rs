//! Now playing panel
//!
//! Shows what the connected device reports: state, title, artist and a
//! progress gauge when the position is known.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, Paragraph},
    Frame,
};

use crate::app::App;
use crate::models::NowPlaying;
use crate::ui::Theme;

/// Text lines for the panel
pub fn describe(playing: &NowPlaying) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        playing.state.to_string(),
        Theme::success(),
    ))];
    let title = playing.title.clone().unwrap_or_else(|| "Nothing playing".to_string());
    lines.push(Line::from(Span::styled(
        title,
        Theme::title().add_modifier(Modifier::BOLD),
    )));
    if let Some(artist) = &playing.artist {
        let mut text = artist.clone();
        if let Some(album) = &playing.album {
            text.push_str(" · ");
            text.push_str(album);
        }
        lines.push(Line::from(Span::styled(text, Theme::text())));
    }
    if let Some(app) = &playing.app {
        lines.push(Line::from(Span::styled(format!("in {}", app), Theme::dimmed())));
    }
    lines
}

pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Theme::border())
        .title(Span::styled(" NOW PLAYING ", Theme::title()));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(playing) = &app.ui.now_playing else {
        let text = if app.ui.controls_enabled() {
            "Waiting for device..."
        } else {
            "Not connected"
        };
        frame.render_widget(Paragraph::new(text).style(Theme::dimmed()), inner);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    frame.render_widget(Paragraph::new(describe(playing)), chunks[0]);

    if playing.total_time.is_some() {
        let gauge = Gauge::default()
            .gauge_style(Theme::progress_bar())
            .ratio(playing.progress().clamp(0.0, 1.0))
            .label(format!(
                "{} / {}",
                playing.format_position(),
                playing.format_total()
            ));
        frame.render_widget(gauge, chunks[1]);
    }
}
