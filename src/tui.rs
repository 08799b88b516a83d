//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on
//! exit, and drawing the tunnel list and the edit form using `ratatui`.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table};
use ratatui::Terminal;

use crate::app::{App, Form, InputMode};
use crate::supervisor::{ConnectionState, EntrySnapshot};

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, SetTitle("burrow"))?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the tunnel list, help footer, and (when open) the edit form.
pub fn draw(
    app: &App,
    snapshot: &[EntrySnapshot],
    terminal: &mut TuiTerminal,
) -> io::Result<()> {
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(2)])
            .split(area);

        draw_tunnel_table(app, snapshot, frame, vertical[0]);
        draw_footer(app, frame, vertical[1]);

        if let InputMode::Form(form) = &app.input_mode {
            draw_form(form, frame, area);
        }
    })?;
    Ok(())
}

fn draw_tunnel_table(
    app: &App,
    snapshot: &[EntrySnapshot],
    frame: &mut ratatui::Frame,
    area: Rect,
) {
    let header = Row::new(["", "Name", "Forward", "Server", "URL"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = snapshot
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let selected = index == app.selected;
            let base = if selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            Row::new(vec![
                Cell::from(Span::styled(state_symbol(entry.state), state_style(entry.state))),
                Cell::from(Span::styled(entry.record.name.clone(), base)),
                Cell::from(Span::styled(entry.record.forward_spec(), base)),
                Cell::from(Span::styled(entry.record.server.clone(), base)),
                Cell::from(Span::styled(entry.record.display_url(), base)),
            ])
            .style(if selected {
                Style::default().bg(Color::Rgb(40, 40, 48))
            } else {
                Style::default()
            })
        })
        .collect();

    let widths = [
        Constraint::Length(3),
        Constraint::Percentage(20),
        Constraint::Percentage(25),
        Constraint::Percentage(25),
        Constraint::Percentage(30),
    ];
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(" tunnels ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(table, area);

    if snapshot.is_empty() {
        let hint = Paragraph::new("no tunnels yet; press 'a' to add one")
            .style(Style::default().fg(Color::DarkGray));
        let inner = Rect {
            x: area.x + 2,
            y: area.y + 2,
            width: area.width.saturating_sub(4),
            height: 1,
        };
        frame.render_widget(hint, inner);
    }
}

fn draw_footer(app: &App, frame: &mut ratatui::Frame, area: Rect) {
    let keys = match app.input_mode {
        InputMode::List => {
            "space toggle · a add · e edit · c clone · d delete · C connect all · D disconnect all · q quit"
        }
        InputMode::Form(_) => "tab next field · enter save · esc cancel",
    };
    let mut lines = vec![Line::from(Span::styled(
        keys,
        Style::default().fg(Color::DarkGray),
    ))];
    if let Some(status) = app.status_line() {
        lines.insert(
            0,
            Line::from(Span::styled(status, Style::default().fg(Color::Yellow))),
        );
    }
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_form(form: &Form, frame: &mut ratatui::Frame, area: Rect) {
    let labels = form.labels();
    let height = labels.len() as u16 + 2;
    let width = area.width.min(60).max(30);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height: height.min(area.height),
    };

    let lines: Vec<Line> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let focused = index == form.focus;
            let marker = if focused { "▶ " } else { "  " };
            let value_style = if focused {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Cyan)),
                Span::styled(format!("{label:<15}"), Style::default().fg(Color::Gray)),
                Span::styled(form.values[index].clone(), value_style),
                Span::styled(if focused { "▏" } else { "" }, value_style),
            ])
        })
        .collect();

    let block = Block::default()
        .title(format!(" {} ", form.title()))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}

fn state_symbol(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disabled => " ○ ",
        ConnectionState::Starting => " ◌ ",
        ConnectionState::Connected => " ● ",
        ConnectionState::Stopping => " ◌ ",
        ConnectionState::Failed => " ✗ ",
    }
}

fn state_style(state: ConnectionState) -> Style {
    match state {
        ConnectionState::Disabled => Style::default().fg(Color::DarkGray),
        ConnectionState::Starting | ConnectionState::Stopping => {
            Style::default().fg(Color::Yellow)
        }
        ConnectionState::Connected => Style::default().fg(Color::Green),
        ConnectionState::Failed => Style::default().fg(Color::Red),
    }
}
