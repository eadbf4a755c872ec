//! Responsive panel layout
//!
//! Wide terminals show devices, remote pad and now playing side by side.
//! Narrow ones stack now playing under the remote pad.

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Minimum width for the three-column layout
pub const WIDE_MIN_WIDTH: u16 = 110;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelLayout {
    TwoColumn,
    ThreeColumn,
}

impl PanelLayout {
    pub fn for_width(width: u16) -> Self {
        if width >= WIDE_MIN_WIDTH {
            PanelLayout::ThreeColumn
        } else {
            PanelLayout::TwoColumn
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panels {
    pub layout: PanelLayout,
    pub devices: Rect,
    pub remote: Rect,
    pub now_playing: Rect,
}

/// Split the content area into panels
pub fn split(area: Rect) -> Panels {
    let layout = PanelLayout::for_width(area.width);
    match layout {
        PanelLayout::ThreeColumn => {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(35),
                    Constraint::Percentage(30),
                    Constraint::Percentage(35),
                ])
                .split(area);
            Panels {
                layout,
                devices: cols[0],
                remote: cols[1],
                now_playing: cols[2],
            }
        }
        PanelLayout::TwoColumn => {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
                .split(area);
            let right = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(11), Constraint::Length(7)])
                .split(cols[1]);
            Panels {
                layout,
                devices: cols[0],
                remote: right[0],
                now_playing: right[1],
            }
        }
    }
}

/// Rect of `width` x `height` centered in `area`, clipped to it
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
