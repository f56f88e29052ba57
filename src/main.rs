use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::{Duration, Instant};

mod app;
mod client;
mod commands;
mod config;
mod contacts;
mod error;
mod formatting;
mod merge;
mod models;
mod notice;
mod pager;
mod poller;
mod retry;
mod scroll;
mod session;
mod sync;
mod thread;
mod utils;
mod widgets;

#[cfg(test)]
mod testing;

use app::App;

#[tokio::main]
async fn main() -> Result<()> {
    let log_file = utils::default_log_path();
    utils::init_logging(&log_file).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    crate::info_log!("=== Botpress Dashboard Starting ===");

    // Load config before entering TUI mode so errors reach the terminal
    let mut app = App::new().await?;
    app.start().await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Stop the pollers even if the loop failed
    app.logout();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = &res {
        crate::error_log!("run_app: {}", e);
    }
    crate::info_log!("=== Botpress Dashboard Stopped ===");
    res
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    let tick = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        if app.should_quit {
            break;
        }

        // Only redraw when something changed
        if app.needs_redraw {
            terminal.draw(|f| app.draw(f))?;
            app.needs_redraw = false;
        }

        // Apply poller results and expire notices
        if last_tick.elapsed() >= tick {
            app.process_updates().await;
            last_tick = Instant::now();
        }

        let poll_timeout = tick
            .saturating_sub(last_tick.elapsed())
            .max(Duration::from_millis(16));

        if !event::poll(poll_timeout)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                app.needs_redraw = true;
                match key.code {
                    // Ctrl+Q: Quit
                    KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.logout();
                    }
                    // Ctrl+R: Reload the open conversation
                    KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.reload().await;
                    }
                    // Ctrl+O: Load older messages
                    KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.load_older().await;
                    }
                    KeyCode::Esc => app.dismiss_notice(),
                    KeyCode::Tab => app.handle_tab(),
                    KeyCode::Up => app.handle_up(),
                    KeyCode::Down => app.handle_down(),
                    KeyCode::Left => {
                        if !app.focus_on_list {
                            app.handle_input_left();
                        }
                    }
                    KeyCode::Right => {
                        if !app.focus_on_list {
                            app.handle_input_right();
                        }
                    }
                    KeyCode::PageUp => app.handle_page_up(),
                    KeyCode::PageDown => app.handle_page_down(),
                    KeyCode::Enter => app.handle_enter().await?,
                    // Character input (only when not on the list)
                    KeyCode::Char(c) => {
                        if !app.focus_on_list {
                            app.handle_char(c);
                        }
                    }
                    KeyCode::Backspace => {
                        if !app.focus_on_list {
                            app.handle_backspace();
                        }
                    }
                    _ => {}
                }
            }
            Event::Resize(_, _) => {
                app.needs_redraw = true;
            }
            _ => {}
        }
    }

    Ok(())
}
