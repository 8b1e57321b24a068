// src/ui/widgets/summary.rs

use super::severity_color;
use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph},
};
use vanguard_recon::core::models::Severity;

/// Renders the scan summary: scan identity, then the issue count per severity
/// once findings are available.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Summary");
    frame.render_widget(summary_container, area);

    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(4), // Scan identity
            Constraint::Length(1),
            Constraint::Length(7), // Counts
            Constraint::Min(0),    // Chart
        ])
        .split(area);

    let Some(scan_id) = &app.scan_id else { return };
    let state = match app.state {
        AppState::Halted(status) => status.to_string(),
        AppState::Finished => "FINISHED".to_string(),
        AppState::Scanning => "SCANNING".to_string(),
        AppState::Idle => "-".to_string(),
    };
    let identity = Text::from(vec![
        Line::from(vec![Span::raw("Scan: "), Span::styled(scan_id.clone(), Style::default().fg(Color::Cyan))]),
        Line::from(format!("Status: {state}")),
        Line::from(format!("Assets: {}", app.assets.len())),
    ]);
    frame.render_widget(Paragraph::new(identity), summary_chunks[0]);

    let Some(report) = &app.report else { return };
    let summary = &report.summary;
    let rows = [
        (Severity::Critical, summary.nb_critical),
        (Severity::High, summary.nb_high),
        (Severity::Medium, summary.nb_medium),
        (Severity::Low, summary.nb_low),
        (Severity::Info, summary.nb_info),
    ];

    let mut lines = vec![Line::from(format!("ISSUES FOUND: {}", summary.nb_issues).bold())];
    for (severity, count) in rows {
        lines.push(Line::from(vec![
            Span::raw(format!("{:<10}", severity.to_string())),
            Span::styled(count.to_string(), Style::default().fg(severity_color(severity))),
        ]));
    }
    frame.render_widget(Paragraph::new(lines), summary_chunks[2]);

    let bars: Vec<Bar> = rows
        .iter()
        .map(|(severity, count)| {
            Bar::default()
                .value(*count as u64)
                .label(Line::from(severity.to_string()))
                .style(Style::default().fg(severity_color(*severity)))
        })
        .collect();
    let chart = BarChart::default().data(BarGroup::default().bars(&bars)).bar_width(4).bar_gap(1);
    frame.render_widget(chart, summary_chunks[3]);
}
