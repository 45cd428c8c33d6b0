mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use tui_app::{
    bar, format_delta_abs, format_delta_pct, format_epc, truncate, AppState, ConnectionStatus,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(35))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut movers_state = TableState::default();
    movers_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &client, &mut movers_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    movers_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(30);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, movers_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                if app.editing_search {
                    match key.code {
                        KeyCode::Enter => {
                            app.editing_search = false;
                            movers_state.select(None);
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Esc => app.editing_search = false,
                        KeyCode::Backspace => {
                            app.search.pop();
                        }
                        KeyCode::Char(c) => app.search.push(c),
                        _ => {}
                    }
                    continue;
                }

                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        app.refresh(client).await;
                        last_tick = std::time::Instant::now();
                    }
                    KeyCode::Char('/') => app.editing_search = true,
                    KeyCode::Char('w') => {
                        app.cycle_window();
                        app.refresh(client).await;
                        last_tick = std::time::Instant::now();
                    }
                    KeyCode::Char('s') => {
                        app.cycle_sort();
                        app.refresh(client).await;
                        last_tick = std::time::Instant::now();
                    }
                    KeyCode::Char('i') => {
                        app.trigger_ingest(client).await;
                        app.refresh(client).await;
                        last_tick = std::time::Instant::now();
                    }
                    KeyCode::Char('h') => {
                        app.cycle_history_window();
                        if let Some(id) = app.history.as_ref().map(|h| h.offer_id.clone()) {
                            app.fetch_history(client, &id).await;
                        }
                    }
                    KeyCode::Enter => {
                        let selected = movers_state
                            .selected()
                            .and_then(|i| app.movers.get(i))
                            .map(|m| m.offer_id.clone());
                        if let Some(id) = selected {
                            app.fetch_history(client, &id).await;
                        }
                    }
                    KeyCode::Esc => app.clear_history(),
                    KeyCode::Down | KeyCode::Char('j') => {
                        let max = app.movers.len().saturating_sub(1);
                        let next = movers_state.selected().map_or(0, |i| (i + 1).min(max));
                        movers_state.select(Some(next));
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        let prev = movers_state
                            .selected()
                            .map_or(0, |i| i.saturating_sub(1));
                        movers_state.select(Some(prev));
                    }
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, movers_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, movers_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let search = if app.editing_search {
        format!("search: {}▏", app.search)
    } else if app.search.trim().is_empty() {
        "search: —".to_string()
    } else {
        format!("search: {}", truncate(app.search.trim(), 20))
    };

    let title_spans = vec![
        Span::styled(
            " EPC Monitor  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(format!("{}d window", app.window()), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(app.sort_mode().1, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(
            search,
            Style::default().fg(if app.editing_search { Color::Yellow } else { Color::White }),
        ),
        Span::raw("  │  "),
        Span::styled(format!("{} offers", app.movers.len()), Style::default().fg(Color::White)),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans))
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, movers_state: &mut TableState, area: Rect) {
    if app.history.is_none() {
        render_movers_table(f, app, movers_state, area);
        return;
    }

    // Horizontal split: movers (60%) | history (40%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_movers_table(f, app, movers_state, halves[0]);
    render_history(f, app, halves[1]);
}

fn render_movers_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["#", "Offer", "GEO", "Payout", "Start", "End", "Δ $", "Δ %"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .movers
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let delta_color = if m.delta_abs > 0.0 {
                Color::Green
            } else if m.delta_abs < 0.0 {
                Color::Red
            } else {
                Color::DarkGray
            };

            Row::new(vec![
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&m.offer_name, 28)),
                Cell::from(m.geo.clone().unwrap_or_else(|| "—".to_string())),
                Cell::from(truncate(m.payout_value.as_deref().unwrap_or("—"), 8)),
                Cell::from(format_epc(m.epc_start)),
                Cell::from(format_epc(m.epc_end)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_delta_abs(m.delta_abs)).style(Style::default().fg(delta_color)),
                Cell::from(format_delta_pct(m.delta_pct)).style(Style::default().fg(delta_color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(4),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " TOP MOVERS ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_history(f: &mut Frame, app: &AppState, area: Rect) {
    let Some(history) = &app.history else { return };

    let max_epc = history
        .history
        .iter()
        .map(|p| p.epc)
        .fold(0.0_f64, f64::max);

    let header = Row::new(["Date", "EPC", ""].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }));

    let rows: Vec<Row> = history
        .history
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(p.date.clone()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format_epc(p.epc)),
                Cell::from(bar(p.epc, max_epc, 20)).style(Style::default().fg(Color::Cyan)),
            ])
        })
        .collect();

    let title = format!(
        " {} · {} · {}d ",
        truncate(&history.offer_name, 24),
        history.geo.as_deref().unwrap_or("—"),
        app.history_window()
    );

    let table = Table::new(
        rows,
        [Constraint::Length(10), Constraint::Length(8), Constraint::Min(4)],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let mut spans = vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[w] ", Style::default().fg(Color::Yellow)),
        Span::raw("window  "),
        Span::styled("[s] ", Style::default().fg(Color::Yellow)),
        Span::raw("sort  "),
        Span::styled("[/] ", Style::default().fg(Color::Yellow)),
        Span::raw("search  "),
        Span::styled("[⏎] ", Style::default().fg(Color::Yellow)),
        Span::raw("history  "),
        Span::styled("[h] ", Style::default().fg(Color::Yellow)),
        Span::raw("history window  "),
        Span::styled("[i] ", Style::default().fg(Color::Yellow)),
        Span::raw("snapshot now  "),
    ];
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(truncate(notice, 60), Style::default().fg(Color::DarkGray)));
    }
    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
