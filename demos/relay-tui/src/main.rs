//! Three shell panes wired through the relay.
//!
//! Run with: cargo run -p relay-tui
//!
//! Type `@2 ls` at the start of a line to run `ls` in Pane 2, or `@all make`
//! to run it everywhere else. Programs can relay too, by printing such a
//! line. Tab moves focus, Ctrl+Q quits. Logs go to the `pane-relay`
//! directory under the local data dir; set `RUST_LOG` to change the level.

mod keys;
mod view;

use std::{
    fs::OpenOptions,
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use pane_relay_core::{DispatchLog, DisplayMsg, RelayConfig, SessionId, WorkspaceDirectory};
use pane_relay_dispatch::AutoConfirm;
use pane_relay_pty::PtyService;
use pane_relay_session::RelayManager;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Size},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::view::PaneView;

const PANE_COUNT: u16 = 3;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_path = init_tracing()?;
    let config = RelayConfig::load_or_default();
    tracing::info!(log = %log_path.display(), "Starting relay-tui");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(&mut terminal, config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        tracing::error!("relay-tui failed: {e:#}");
    }
    result
}

/// Log to a file; the terminal belongs to the panes.
fn init_tracing() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pane-relay");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("relay-tui.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    Ok(path)
}

async fn run_app(terminal: &mut Tui, config: RelayConfig) -> anyhow::Result<()> {
    let footer_height = u16::try_from(config.recent_log_display)
        .unwrap_or(u16::MAX)
        .saturating_add(3);

    let directory = Arc::new(WorkspaceDirectory::new());
    let workspace = directory.create_workspace("Workspace 1");
    let pty = PtyService::new();
    let manager = Arc::new(RelayManager::in_memory(
        Arc::new(pty.clone()),
        directory.clone(),
        Arc::new(AutoConfirm),
        config,
    ));

    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let (cols, rows) = pane_size(terminal.size()?, footer_height);
    let (display_tx, mut display_rx) = mpsc::unbounded_channel::<(SessionId, DisplayMsg)>();

    let mut panes = Vec::new();
    for n in 1..=PANE_COUNT {
        let (id, mut output) = pty.create_session(home.clone(), cols, rows).await?;
        let title = format!("Pane {n}");
        directory.add_pane(workspace, id, title.clone())?;
        let display = manager.attach_pane(id).await;

        let mut updates = display.subscribe();
        let tx = display_tx.clone();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(msg) => {
                        if tx.send((id, msg)).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(pane = %id, skipped, "Display lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let relay = Arc::clone(&manager);
        let host = pty.clone();
        tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                if let Err(e) = relay.handle_output(id, &chunk).await {
                    tracing::warn!(pane = %id, "Output dropped: {e}");
                    break;
                }
            }
            relay.detach_pane(id).await;
            // Usually already reaped when the shell exited by itself.
            if let Err(e) = host.close_session(id).await {
                tracing::debug!(pane = %id, "Close after exit: {e}");
            }
        });

        panes.push(PaneView::new(id, title));
    }

    let mut focus = 0;
    loop {
        while let Ok((id, msg)) = display_rx.try_recv() {
            if let Some(pane) = panes.iter_mut().find(|p| p.id == id) {
                pane.apply(msg);
            }
        }

        let focused = panes[focus].id;
        let compose = manager.compose_preview(focused).await;
        let logs: Vec<String> = manager
            .recent_logs(focused)
            .await
            .map(|logs| logs.iter().map(DispatchLog::summary).collect())
            .unwrap_or_default();

        terminal.draw(|f| ui(f, &panes, focus, compose.as_deref(), &logs, footer_height))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if is_quit(&key) {
                    break;
                }
                if key.code == KeyCode::Tab {
                    focus = (focus + 1) % panes.len();
                    continue;
                }
                if let Some(input) = keys::key_to_input(&key) {
                    send_input(&manager, focused, &input).await;
                }
            }
            Event::Paste(text) => send_input(&manager, focused, &text).await,
            Event::Resize(width, height) => {
                let (cols, rows) = pane_size(Size { width, height }, footer_height);
                for pane in &panes {
                    if let Err(e) = pty.resize(pane.id, cols, rows) {
                        tracing::debug!(pane = %pane.id, "Resize skipped: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    for pane in &panes {
        let _ = pty.close_session(pane.id).await;
    }
    Ok(())
}

async fn send_input(manager: &RelayManager, pane: SessionId, input: &str) {
    // Dispatches report back through the pane display; handles not needed.
    if let Err(e) = manager.handle_input(pane, input).await {
        tracing::warn!(%pane, "Input dropped: {e}");
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('q')
}

/// Inner size of one pane for a terminal of `size`.
fn pane_size(size: Size, footer_height: u16) -> (u16, u16) {
    let cols = (size.width / PANE_COUNT).saturating_sub(2).max(1);
    let rows = size
        .height
        .saturating_sub(footer_height.saturating_add(1))
        .saturating_sub(2)
        .max(1);
    (cols, rows)
}

fn ui(
    f: &mut Frame,
    panes: &[PaneView],
    focus: usize,
    compose: Option<&str>,
    logs: &[String],
    footer_height: u16,
) {
    let [body, footer, status] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(footer_height),
        Constraint::Length(1),
    ])
    .areas(f.area());

    let columns = Layout::horizontal(vec![
        Constraint::Ratio(1, u32::from(PANE_COUNT));
        panes.len()
    ])
    .split(body);

    for (i, (pane, area)) in panes.iter().zip(columns.iter()).enumerate() {
        let border = if i == focus {
            Style::default().fg(Color::Yellow)
        } else if pane.exited {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        let lines: Vec<Line> = pane
            .tail(usize::from(area.height.saturating_sub(2)))
            .into_iter()
            .map(Line::from)
            .collect();
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(pane.title.as_str());
        f.render_widget(Paragraph::new(lines).block(block), *area);
    }

    let hint = Style::default().fg(Color::DarkGray);
    let mut relay_lines = vec![match compose {
        Some(text) => Line::from(vec![
            Span::styled("compose ", Style::default().fg(Color::Yellow)),
            Span::raw(text),
        ]),
        None => Line::from(Span::styled("@<pane> <command> relays a command", hint)),
    }];
    relay_lines.extend(logs.iter().map(|entry| Line::from(entry.as_str())));
    let relay = Paragraph::new(relay_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Relay - {}", panes[focus].title)),
    );
    f.render_widget(relay, footer);

    let keys = Style::default().fg(Color::Yellow);
    let bar = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled("Tab", keys),
        Span::raw(" focus | "),
        Span::styled("Ctrl+Q", keys),
        Span::raw(" quit "),
    ]));
    f.render_widget(bar, status);
}
