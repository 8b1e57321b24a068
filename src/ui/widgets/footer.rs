// src/ui/widgets/footer.rs

use crate::app::{App, AppState, ExportStatus};
use ratatui::{
    prelude::*,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::new().bold().fg(Color::Yellow))
}

/// Renders the footer widget, which displays available actions.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = match app.state {
        AppState::Idle => vec![
            Span::raw("Press "),
            key("Enter"),
            Span::raw(" to scan, "),
            key("Esc"),
            Span::raw(" to quit."),
        ],
        AppState::Scanning => vec![
            Span::raw("Scanning... "),
            key("[S]"),
            Span::raw("top, "),
            key("[L]"),
            Span::raw("ogs, "),
            key("[Q]"),
            Span::raw("uit"),
        ],
        AppState::Finished | AppState::Halted(_) => vec![
            key("[N]"),
            Span::raw("ew Scan, "),
            key("[E]"),
            Span::raw("xport, "),
            key("[L]"),
            Span::raw("ogs, "),
            key("[Q]"),
            Span::raw("uit"),
        ],
    };

    match &app.export_status {
        ExportStatus::Idle => {}
        ExportStatus::Success(path) => spans.push(Span::styled(format!("  Saved to {path}"), Style::new().fg(Color::Green))),
        ExportStatus::Error(e) => spans.push(Span::styled(format!("  Export failed: {e}"), Style::new().fg(Color::Red))),
    }
    if let Some(message) = &app.status_message {
        spans.push(Span::styled(format!("  {message}"), Style::new().fg(Color::Red)));
    }

    let footer = Paragraph::new(Line::from(spans)).alignment(Alignment::Center);
    frame.render_widget(footer, area);
}
