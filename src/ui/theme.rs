//! Color theme for atvtui
//!
//! Dark palette with a single accent so the remote pad highlight stands out.

use ratatui::style::{Color, Modifier, Style};

use crate::models::PairingStatus;

pub struct Theme;

impl Theme {
    // ═══════════════════════════════════════════════════════════════════════
    // PALETTE
    // ═══════════════════════════════════════════════════════════════════════

    /// #101418
    pub const BACKGROUND: Color = Color::Rgb(0x10, 0x14, 0x18);
    /// #1b2128, panels and pad buttons
    pub const SURFACE: Color = Color::Rgb(0x1b, 0x21, 0x28);
    /// #4fb3ff
    pub const PRIMARY: Color = Color::Rgb(0x4f, 0xb3, 0xff);
    /// #f5a623, the button flash
    pub const ACCENT: Color = Color::Rgb(0xf5, 0xa6, 0x23);
    /// #e6e9ec
    pub const TEXT: Color = Color::Rgb(0xe6, 0xe9, 0xec);
    /// #6b7580
    pub const DIM: Color = Color::Rgb(0x6b, 0x75, 0x80);
    /// #3ddc84
    pub const SUCCESS: Color = Color::Rgb(0x3d, 0xdc, 0x84);
    /// #ffcc33
    pub const WARNING: Color = Color::Rgb(0xff, 0xcc, 0x33);
    /// #ff5a5f
    pub const ERROR: Color = Color::Rgb(0xff, 0x5a, 0x5f);

    pub const BORDER: Color = Color::Rgb(0x33, 0x3d, 0x47);
    pub const BORDER_FOCUSED: Color = Self::PRIMARY;

    // ═══════════════════════════════════════════════════════════════════════
    // STYLE HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn text() -> Style {
        Style::default().fg(Self::TEXT).bg(Self::BACKGROUND)
    }

    pub fn dimmed() -> Style {
        Style::default().fg(Self::DIM)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error() -> Style {
        Style::default().fg(Self::ERROR).add_modifier(Modifier::BOLD)
    }

    pub fn success() -> Style {
        Style::default().fg(Self::SUCCESS)
    }

    pub fn warning() -> Style {
        Style::default().fg(Self::WARNING)
    }

    pub fn border() -> Style {
        Style::default().fg(Self::BORDER)
    }

    pub fn border_focused() -> Style {
        Style::default()
            .fg(Self::BORDER_FOCUSED)
            .add_modifier(Modifier::BOLD)
    }

    /// Selected list row
    pub fn selected() -> Style {
        Style::default()
            .fg(Self::BACKGROUND)
            .bg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn keybind() -> Style {
        Style::default().fg(Self::ACCENT)
    }

    pub fn status_bar() -> Style {
        Style::default().fg(Self::TEXT).bg(Self::SURFACE)
    }

    pub fn loading() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn progress_bar() -> Style {
        Style::default().fg(Self::PRIMARY).bg(Self::SURFACE)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REMOTE PAD
    // ═══════════════════════════════════════════════════════════════════════

    pub fn button() -> Style {
        Style::default().fg(Self::TEXT).bg(Self::SURFACE)
    }

    /// Flash shown right after a press
    pub fn button_pressed() -> Style {
        Style::default()
            .fg(Self::BACKGROUND)
            .bg(Self::ACCENT)
            .add_modifier(Modifier::BOLD)
    }

    /// No session, buttons do nothing
    pub fn button_disabled() -> Style {
        Style::default().fg(Self::DIM).bg(Self::BACKGROUND)
    }

    /// Badge color for a device's pairing status
    pub fn pairing_status(status: PairingStatus) -> Style {
        match status {
            PairingStatus::Paired | PairingStatus::NotRequired => Self::success(),
            PairingStatus::PartiallyPaired => Self::warning(),
            PairingStatus::Unpaired => Self::dimmed(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COLOR UTILITIES
// ═══════════════════════════════════════════════════════════════════════════

/// Relative luminance per https://www.w3.org/TR/WCAG20/#relativeluminancedef
pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    fn channel(c: u8) -> f64 {
        let c = c as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    0.2126 * channel(r) + 0.7152 * channel(g) + 0.0722 * channel(b)
}

/// Contrast ratio between 1 (same color) and 21 (black on white)
pub fn contrast_ratio(fg: (u8, u8, u8), bg: (u8, u8, u8)) -> f64 {
    let l1 = relative_luminance(fg.0, fg.1, fg.2);
    let l2 = relative_luminance(bg.0, bg.1, bg.2);
    let (lighter, darker) = if l1 > l2 { (l1, l2) } else { (l2, l1) };
    (lighter + 0.05) / (darker + 0.05)
}

/// WCAG AA for normal text
pub fn meets_wcag_aa(fg: (u8, u8, u8), bg: (u8, u8, u8)) -> bool {
    contrast_ratio(fg, bg) >= 4.5
}

pub fn color_to_rgb(color: Color) -> Option<(u8, u8, u8)> {
    match color {
        Color::Rgb(r, g, b) => Some((r, g, b)),
        _ => None,
    }
}
