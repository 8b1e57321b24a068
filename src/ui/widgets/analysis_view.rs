// src/ui/widgets/analysis_view.rs

use super::severity_color;
use crate::app::{App, AppState, SPINNER_CHARS};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use vanguard_recon::core::models::Issue;

pub fn render_analysis_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default().borders(Borders::ALL).title("Findings (Navigate with ↑ ↓)");

    let content = match app.state {
        AppState::Finished => None,
        AppState::Idle => Some(Paragraph::new("Findings will appear here...").alignment(Alignment::Center)),
        AppState::Scanning => {
            let spinner_char = SPINNER_CHARS[app.spinner_frame];
            let scan_id = app.scan_id.as_deref().unwrap_or("-");
            Some(
                Paragraph::new(Line::from(vec![
                    Span::styled(format!("{spinner_char} "), Style::default().fg(Color::Cyan)),
                    Span::raw(format!("Scan {scan_id} running... Please wait.")),
                ]))
                .alignment(Alignment::Center),
            )
        }
        AppState::Halted(status) => Some(
            Paragraph::new(format!("Scan ended with status {status}. Press N for a new scan."))
                .alignment(Alignment::Center),
        ),
    };
    if let Some(content) = content {
        frame.render_widget(content.block(main_block), area);
        return;
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Min(0)])
        .split(inner_area);

    let items: Vec<ListItem> = app
        .issues()
        .iter()
        .map(|issue| {
            let color = severity_color(issue.severity);
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{:<8}] ", issue.severity.to_string().to_uppercase()), Style::default().fg(color)),
                Span::styled(format!("{} ", issue.target.addr.join(", ")), Style::default().fg(Color::DarkGray)),
                Span::raw(issue.title.clone()),
            ]))
        })
        .collect();

    let findings_list = List::new(items)
        .block(Block::default())
        .highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(findings_list, chunks[0], &mut app.issue_list_state);

    let detail_block = Block::default().borders(Borders::TOP).title("Details");
    match app.selected_issue() {
        Some(issue) => {
            let p = Paragraph::new(issue_details(issue)).wrap(Wrap { trim: false }).block(detail_block);
            frame.render_widget(p, chunks[1]);
        }
        None => {
            let p = Paragraph::new(Text::from(vec![
                Line::from(""),
                Line::from("No issues were produced by this scan.".bold()),
            ]))
            .alignment(Alignment::Center)
            .block(detail_block);
            frame.render_widget(p, chunks[1]);
        }
    }
}

fn issue_details(issue: &Issue) -> Text<'static> {
    let mut lines = vec![
        Line::from(vec![
            Span::styled(format!("#{} ", issue.issue_id), Style::default().fg(Color::DarkGray)),
            Span::styled(issue.kind.clone(), Style::default().fg(severity_color(issue.severity)).bold()),
            Span::raw(format!("  confidence: {}", issue.confidence)),
        ]),
        Line::from(format!("Tags: {}", issue.metadata.tags.join(", "))),
        Line::from(""),
        Line::from("DESCRIPTION:".yellow().bold()),
    ];
    lines.extend(issue.description.lines().map(|l| Line::from(l.to_string())));
    lines.push(Line::from(""));
    lines.push(Line::from("SOLUTION:".yellow().bold()));
    lines.push(Line::from(issue.solution.clone()));
    Text::from(lines)
}
