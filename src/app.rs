// src/app.rs

use std::collections::HashSet;
use std::path::PathBuf;

use ratatui::widgets::{ListState, ScrollbarState};
use vanguard_recon::config::EngineConfig;
use vanguard_recon::core::models::{Asset, AssetKind, FindingsReport, Issue, ScanStatus};
use vanguard_recon::core::options::OptionFlags;

pub const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const LOG_TAIL_LINES: usize = 200;

pub enum ExportStatus {
    Idle,
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Scanning,
    Finished,
    /// The scan ended without findings to show (stopped or errored).
    Halted(ScanStatus),
}

pub struct App {
    pub should_quit: bool,
    pub show_disclaimer: bool,
    pub state: AppState,
    pub input: String,
    pub scan_id: Option<String>,
    scan_counter: u32,
    pub assets: Vec<Asset>,
    pub report: Option<FindingsReport>,
    pub issue_list_state: ListState,
    pub spinner_frame: usize,
    pub status_message: Option<String>,
    pub export_status: ExportStatus,
    pub show_logs: bool,
    pub log_file: Option<PathBuf>,
    pub log_content: Vec<String>,
    pub log_horizontal_scroll: usize,
    pub log_horizontal_scroll_state: ScrollbarState,
}

impl App {
    pub fn new(log_file: Option<PathBuf>) -> Self {
        Self {
            should_quit: false,
            show_disclaimer: true,
            state: AppState::Idle,
            input: String::new(),
            scan_id: None,
            scan_counter: 0,
            assets: Vec::new(),
            report: None,
            issue_list_state: ListState::default(),
            spinner_frame: 0,
            status_message: None,
            export_status: ExportStatus::Idle,
            show_logs: false,
            log_file,
            log_content: Vec::new(),
            log_horizontal_scroll: 0,
            log_horizontal_scroll_state: ScrollbarState::default(),
        }
    }

    /// Allocates the id of the next scan.
    pub fn next_scan_id(&mut self) -> String {
        self.scan_counter += 1;
        let id = format!("{}-{}", std::process::id(), self.scan_counter);
        self.scan_id = Some(id.clone());
        id
    }

    pub fn issues(&self) -> &[Issue] {
        self.report.as_ref().map(|r| r.issues.as_slice()).unwrap_or_default()
    }

    pub fn selected_issue(&self) -> Option<&Issue> {
        self.issue_list_state.selected().and_then(|i| self.issues().get(i))
    }

    pub fn set_report(&mut self, report: FindingsReport) {
        let empty = report.issues.is_empty();
        self.report = Some(report);
        self.issue_list_state.select(if empty { None } else { Some(0) });
        self.state = AppState::Finished;
    }

    pub fn select_previous(&mut self) {
        if self.issues().is_empty() {
            return;
        }
        let i = self.issue_list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.issue_list_state.select(Some(i));
    }

    pub fn select_next(&mut self) {
        let len = self.issues().len();
        if len == 0 {
            return;
        }
        let i = self.issue_list_state.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.issue_list_state.select(Some(i));
    }

    pub fn scroll_logs_left(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_sub(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn scroll_logs_right(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_add(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn on_tick(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        if self.show_logs && self.spinner_frame == 0 {
            self.refresh_logs();
        }
    }

    pub fn toggle_logs(&mut self) {
        self.show_logs = !self.show_logs;
        if self.show_logs {
            self.refresh_logs();
        }
    }

    fn refresh_logs(&mut self) {
        let Some(path) = &self.log_file else { return };
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(LOG_TAIL_LINES);
            self.log_content = lines[start..].iter().map(|l| l.to_string()).collect();
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn reset(&mut self) {
        self.state = AppState::Idle;
        self.input = String::new();
        self.scan_id = None;
        self.assets = Vec::new();
        self.report = None;
        self.issue_list_state = ListState::default();
        self.status_message = None;
        self.export_status = ExportStatus::Idle;
    }
}

/// Splits the input line into assets. URLs are reduced to their host.
pub fn parse_assets(input: &str) -> Vec<Asset> {
    let mut seen = HashSet::new();
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|raw| !raw.is_empty())
        .map(Asset::infer)
        .map(|asset| match asset.datatype {
            AssetKind::Url => url::Url::parse(&asset.value)
                .ok()
                .and_then(|u| u.host_str().map(Asset::infer))
                .unwrap_or(asset),
            _ => asset,
        })
        .filter(|asset| seen.insert(asset.value.clone()))
        .collect()
}

/// The checks run from the interactive shell. Reverse WHOIS needs an API
/// token, so it is only enabled when one is configured.
pub fn interactive_flags(config: &EngineConfig) -> OptionFlags {
    OptionFlags {
        do_dns_resolve: true,
        do_subdomains_resolve: true,
        do_reverse_dns: true,
        do_whois: true,
        do_advanced_whois: true,
        do_reverse_whois: !config.whoisfreaks_api_tokens.is_empty(),
        do_subdomain_enum: true,
        do_subdomain_bruteforce: true,
        do_seg_check: true,
        do_spf_check: true,
        do_dkim_check: true,
        do_dmarc_check: true,
        do_dnstwist_subdomain_search: true,
        do_cdn_check: true,
        do_waf_check: true,
        do_cloud_check: true,
        do_saas_check: true,
        dnstwist_check_mx: true,
        max_timeout: Some(120),
        ..OptionFlags::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_split_and_typed() {
        let assets = parse_assets("example.com, 192.0.2.1  https://www.example.org/login acme");
        let kinds: Vec<(&str, AssetKind)> = assets.iter().map(|a| (a.value.as_str(), a.datatype)).collect();
        assert_eq!(
            kinds,
            vec![
                ("example.com", AssetKind::Domain),
                ("192.0.2.1", AssetKind::Ip),
                ("www.example.org", AssetKind::Fqdn),
                ("acme", AssetKind::Keyword),
            ]
        );
    }

    #[test]
    fn repeated_assets_are_kept_once_in_input_order() {
        let assets = parse_assets("b.com a.com b.com https://a.com/x");
        let values: Vec<&str> = assets.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(values, vec!["b.com", "a.com"]);
    }

    #[test]
    fn reverse_whois_needs_a_token() {
        let mut config = EngineConfig::default();
        assert!(!interactive_flags(&config).do_reverse_whois);
        config.whoisfreaks_api_tokens.push("token".into());
        assert!(interactive_flags(&config).do_reverse_whois);
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut app = App::new(None);
        app.select_next();
        assert_eq!(app.issue_list_state.selected(), None);
        app.set_report(FindingsReport {
            scan_id: "1".into(),
            summary: Default::default(),
            issues: Vec::new(),
        });
        assert_eq!(app.state, AppState::Finished);
        assert_eq!(app.selected_issue(), None);
        assert_eq!(app.next_scan_id(), format!("{}-1", std::process::id()));
    }
}
