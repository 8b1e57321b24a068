// src/main.rs

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{error, info, warn};

use vanguard_recon::config::EngineConfig;
use vanguard_recon::core::models::ScanStatus;
use vanguard_recon::logging::{get_data_dir, initialize_logging};
use vanguard_recon::{Engine, ScanRequest};

mod app;
mod ui;

use app::{App, AppState, ExportStatus};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let log_file = initialize_logging()?;
    let config = EngineConfig::load()?;
    let engine = Engine::standard(config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting");

    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut app = App::new(Some(log_file));
    let outcome = run(&mut terminal, &mut app, &engine).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;

    engine.stop_all().await;
    engine.shutdown();
    outcome
}

async fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App, engine: &Engine) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            handle_events(app, engine).await?;
        }
        app.on_tick();
        poll_scan(app, engine);
    }
    Ok(())
}

/// Advances the UI once the running scan leaves SCANNING.
fn poll_scan(app: &mut App, engine: &Engine) {
    if app.state != AppState::Scanning {
        return;
    }
    let Some(scan_id) = app.scan_id.clone() else { return };
    match engine.status(&scan_id) {
        Ok(ScanStatus::Finished) => match engine.get_findings(&scan_id) {
            Ok(report) => app.set_report(report),
            Err(e) => {
                error!(%scan_id, error = %e, "failed to materialize findings");
                app.status_message = Some(e.to_string());
                app.state = AppState::Halted(ScanStatus::Error);
            }
        },
        Ok(ScanStatus::Started) => {
            // Nothing was scheduled: no enabled check accepts these assets.
            app.status_message = Some("no check applies to these assets".to_string());
            app.state = AppState::Halted(ScanStatus::Started);
        }
        Ok(status @ (ScanStatus::Stopped | ScanStatus::Error)) => app.state = AppState::Halted(status),
        Ok(ScanStatus::Scanning) => {}
        Err(e) => {
            app.status_message = Some(e.to_string());
            app.state = AppState::Halted(ScanStatus::Error);
        }
    }
}

async fn handle_events(app: &mut App, engine: &Engine) -> Result<()> {
    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            if app.show_disclaimer {
                if key.code == KeyCode::Enter {
                    app.show_disclaimer = false;
                }
                return Ok(());
            }
            match app.state {
                AppState::Idle => handle_idle_input(app, engine, key.code),
                AppState::Scanning => handle_scanning_input(app, engine, key.code).await,
                AppState::Finished | AppState::Halted(_) => handle_finished_input(app, engine, key.code).await,
            }
        }
    }
    Ok(())
}

fn handle_idle_input(app: &mut App, engine: &Engine, key_code: KeyCode) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => {
            let assets = app::parse_assets(&app.input);
            if assets.is_empty() {
                return;
            }
            let request = ScanRequest {
                scan_id: app.next_scan_id(),
                assets: assets.clone(),
                options: app::interactive_flags(engine.config()),
                root_scan_id: None,
                position: None,
            };
            match engine.start(request) {
                Ok(ack) => {
                    info!(scan_id = %ack.scan_id, scheduled = ack.scheduled, "scan launched from shell");
                    app.assets = assets;
                    app.status_message = None;
                    app.state = AppState::Scanning;
                }
                Err(e) => app.status_message = Some(e.to_string()),
            }
        }
        _ => {}
    }
}

async fn handle_scanning_input(app: &mut App, engine: &Engine, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('l') => app.toggle_logs(),
        KeyCode::Char('s') => {
            if let Some(scan_id) = app.scan_id.clone() {
                match engine.stop(&scan_id).await {
                    Ok(status) => app.state = AppState::Halted(status),
                    Err(e) => app.status_message = Some(e.to_string()),
                }
            }
        }
        _ => {}
    }
}

async fn handle_finished_input(app: &mut App, engine: &Engine, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('l') => app.toggle_logs(),
        KeyCode::Char('n') => {
            if let Some(scan_id) = &app.scan_id {
                if let Err(e) = engine.clean(scan_id) {
                    warn!(%scan_id, error = %e, "could not clean finished scan");
                }
            }
            app.reset();
        }
        KeyCode::Char('e') => {
            let Some(scan_id) = app.scan_id.clone() else { return };
            let dir = engine.config().results_dir.clone().unwrap_or_else(|| get_data_dir().join("reports"));
            app.export_status = match engine.write_report(&scan_id, &dir).await {
                Ok(path) => ExportStatus::Success(path.display().to_string()),
                Err(e) => ExportStatus::Error(e.to_string()),
            };
        }
        KeyCode::Up => app.select_previous(),
        KeyCode::Down => app.select_next(),
        KeyCode::Left => app.scroll_logs_left(),
        KeyCode::Right => app.scroll_logs_right(),
        _ => {}
    }
}
