// src/ui/widgets/mod.rs

pub mod analysis_view; // Issue list and detail pane.
pub mod disclaimer_popup;
pub mod footer; // Key hints for the current state.
pub mod input; // Asset input line.
pub mod log_view;
pub mod summary; // Severity counts of the materialized findings.

use ratatui::style::Color;
use vanguard_recon::core::models::Severity;

pub fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Magenta,
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Cyan,
        Severity::Info => Color::Gray,
    }
}
