use anyhow::Result;
use chrono::{Local, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use freight_rotation::{
    export, format_money, local_now, parse_value, project, week_cell, Action, DriverId,
    DriverRow, EntryId, EntryKind, FreightEntry, KeyValueStore, Outcome, Session,
    WeekBreakdown,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::collections::HashSet;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Queue,
    Share,
    Rules,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Queue => Page::Share,
            Page::Share => Page::Rules,
            Page::Rules => Page::Queue,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Queue => Page::Rules,
            Page::Share => Page::Queue,
            Page::Rules => Page::Share,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Queue => "Queue",
            Page::Share => "Share",
            Page::Rules => "Rules",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Drivers,
    History,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputPurpose {
    AddDriver,
    Freight(DriverId),
    EditEntry(DriverId, EntryId),
    Search,
}

impl InputPurpose {
    fn label(&self) -> &str {
        match self {
            InputPurpose::AddDriver => "New driver name",
            InputPurpose::Freight(_) => "Freight value",
            InputPurpose::EditEntry(_, _) => "New value",
            InputPurpose::Search => "Search",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Normal,
    Input { purpose: InputPurpose, buffer: String },
    Confirm { action: Action, prompt: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

pub struct App<S: KeyValueStore> {
    pub session: Session<S>,
    pub rows: Vec<DriverRow>,
    pub state: TableState,
    pub history_state: TableState,
    pub focus: Focus,
    pub current_page: Page,
    pub show_detail: bool,
    pub search: String,
    pub mode: Mode,
    pub status: Option<StatusMessage>,
    pub share_title: String,
}

impl<S: KeyValueStore> App<S> {
    pub fn new(session: Session<S>, share_title: String) -> Self {
        let mut app = Self {
            session,
            rows: Vec::new(),
            state: TableState::default(),
            history_state: TableState::default(),
            focus: Focus::Drivers,
            current_page: Page::Queue,
            show_detail: true,
            search: String::new(),
            mode: Mode::Normal,
            status: None,
            share_title,
        };
        app.refresh();
        app
    }

    /// Rebuild rows from the engine, keeping the selected driver when it is still listed
    pub fn refresh(&mut self) {
        let selected_id = self.selected_row().map(|r| r.id);

        let visible: HashSet<DriverId> = self
            .session
            .engine()
            .search(&self.search)
            .into_iter()
            .map(|d| d.id)
            .collect();
        self.rows = project(self.session.engine(), local_now())
            .into_iter()
            .filter(|r| visible.contains(&r.id))
            .collect();

        let index = selected_id
            .and_then(|id| self.rows.iter().position(|r| r.id == id))
            .or(if self.rows.is_empty() { None } else { Some(0) })
            .map(|i| i.min(self.rows.len().saturating_sub(1)));
        self.state.select(index);
        self.clamp_history();
    }

    fn clamp_history(&mut self) {
        let len = self.selected_row().map_or(0, |r| r.history.len());
        let i = match self.history_state.selected() {
            _ if len == 0 => None,
            Some(i) => Some(i.min(len - 1)),
            None => Some(0),
        };
        self.history_state.select(i);
        if len == 0 && self.focus == Focus::History {
            self.focus = Focus::Drivers;
        }
    }

    pub fn selected_row(&self) -> Option<&DriverRow> {
        self.state.selected().and_then(|i| self.rows.get(i))
    }

    pub fn selected_entry(&self) -> Option<&FreightEntry> {
        let row = self.selected_row()?;
        self.history_state.selected().and_then(|i| row.history.get(i))
    }

    fn set_status(&mut self, text: impl Into<String>, is_error: bool) {
        self.status = Some(StatusMessage {
            text: text.into(),
            is_error,
        });
    }

    /// Hand an action to the session and react to the outcome
    pub fn dispatch(&mut self, action: Action) {
        match self.session.apply(action.clone(), Utc::now()) {
            Ok(Outcome::RequiresConfirmation { prompt }) => {
                self.mode = Mode::Confirm { action, prompt };
            }
            Ok(Outcome::Applied(notification)) => {
                if notification.persisted {
                    self.set_status(notification.message, false);
                } else {
                    self.set_status(format!("{} (not saved, see log)", notification.message), true);
                }
                self.refresh();
            }
            Err(err) => self.set_status(err.to_string(), true),
        }
    }

    // ========================================================================
    // KEYS
    // ========================================================================

    /// Returns true when the app should quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode.clone() {
            Mode::Normal => return self.handle_normal_key(key),
            Mode::Input { purpose, buffer } => self.handle_input_key(key, purpose, buffer),
            Mode::Confirm { action, .. } => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.mode = Mode::Normal;
                    self.dispatch(action.confirm());
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.mode = Mode::Normal;
                    self.set_status("Cancelled", false);
                }
                _ => {}
            },
        }
        false
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Tab => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.current_page = self.current_page.previous();
                } else {
                    self.current_page = self.current_page.next();
                }
            }
            KeyCode::BackTab => self.current_page = self.current_page.previous(),
            KeyCode::Enter => self.show_detail = !self.show_detail,
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Right | KeyCode::Char('l') if self.show_detail => {
                if self.selected_row().map_or(false, |r| !r.history.is_empty()) {
                    self.focus = Focus::History;
                }
            }
            KeyCode::Left | KeyCode::Char('h') => self.focus = Focus::Drivers,
            KeyCode::Char('a') => self.start_input(InputPurpose::AddDriver),
            KeyCode::Char('/') => {
                self.mode = Mode::Input {
                    purpose: InputPurpose::Search,
                    buffer: self.search.clone(),
                };
            }
            KeyCode::Char('c') => {
                self.search.clear();
                self.refresh();
            }
            KeyCode::Char('R') => self.dispatch(Action::ResetPeriod { confirmed: false }),
            _ => self.handle_driver_key(key.code),
        }
        false
    }

    /// Keys acting on the selected driver or entry
    fn handle_driver_key(&mut self, code: KeyCode) {
        let Some(driver) = self.selected_row().map(|r| r.id) else {
            return;
        };

        match code {
            KeyCode::Char('f') => self.start_input(InputPurpose::Freight(driver)),
            KeyCode::Char('r') => self.dispatch(Action::RefuseJob { driver, confirmed: false }),
            KeyCode::Char('p') => self.dispatch(Action::TogglePause { driver }),
            KeyCode::Char('x') => self.dispatch(Action::RemoveDriver { driver, confirmed: false }),
            KeyCode::Char('e') => match self.selected_entry().map(|e| (e.id, e.kind)) {
                Some((_, kind)) if kind.is_disciplinary() => {
                    self.set_status("Refusals cannot be edited, only deleted", true);
                }
                Some((entry, _)) => self.start_input(InputPurpose::EditEntry(driver, entry)),
                None => self.set_status("No entry selected", true),
            },
            KeyCode::Char('d') => match self.selected_entry().map(|e| e.id) {
                Some(entry) => self.dispatch(Action::RemoveEntry {
                    driver,
                    entry,
                    confirmed: false,
                }),
                None => self.set_status("No entry selected", true),
            },
            _ => {}
        }
    }

    fn start_input(&mut self, purpose: InputPurpose) {
        self.mode = Mode::Input {
            purpose,
            buffer: String::new(),
        };
    }

    fn handle_input_key(&mut self, key: KeyEvent, purpose: InputPurpose, mut buffer: String) {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                if purpose == InputPurpose::Search {
                    self.search.clear();
                    self.refresh();
                }
                return;
            }
            KeyCode::Enter => {
                self.mode = Mode::Normal;
                self.submit_input(purpose, buffer);
                return;
            }
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) => buffer.push(c),
            _ => {}
        }

        if purpose == InputPurpose::Search {
            self.search = buffer.clone();
            self.refresh();
        }
        self.mode = Mode::Input { purpose, buffer };
    }

    fn submit_input(&mut self, purpose: InputPurpose, buffer: String) {
        match purpose {
            InputPurpose::AddDriver => self.dispatch(Action::AddDriver { name: buffer }),
            InputPurpose::Freight(driver) => match parse_value(&buffer) {
                Ok(value) => self.dispatch(Action::RegisterFreight { driver, value }),
                Err(err) => self.set_status(err.to_string(), true),
            },
            InputPurpose::EditEntry(driver, entry) => match parse_value(&buffer) {
                Ok(value) => self.dispatch(Action::EditEntry { driver, entry, value }),
                Err(err) => self.set_status(err.to_string(), true),
            },
            InputPurpose::Search => {
                self.search = buffer;
                self.refresh();
            }
        }
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    pub fn next(&mut self) {
        let (state, len) = self.focused_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.select_focused(i);
    }

    pub fn previous(&mut self) {
        let (state, len) = self.focused_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.select_focused(i);
    }

    fn focused_list(&self) -> (&TableState, usize) {
        match self.focus {
            Focus::Drivers => (&self.state, self.rows.len()),
            Focus::History => (
                &self.history_state,
                self.selected_row().map_or(0, |r| r.history.len()),
            ),
        }
    }

    fn select_focused(&mut self, i: usize) {
        match self.focus {
            Focus::Drivers => {
                self.state.select(Some(i));
                self.history_state.select(Some(0));
                self.clamp_history();
            }
            Focus::History => self.history_state.select(Some(i)),
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        let drivers = self.session.engine().drivers();
        let paused = drivers.iter().filter(|d| d.paused).count();
        (drivers.len() - paused, paused)
    }
}

// ============================================================================
// TERMINAL LOOP
// ============================================================================

pub fn run_ui<S: KeyValueStore>(app: &mut App<S>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend, S: KeyValueStore>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui<S: KeyValueStore>(f: &mut Frame, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Queue if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(65), // Queue
                    Constraint::Percentage(35), // Detail panel
                ])
                .split(chunks[1]);

            render_queue(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Queue => render_queue(f, chunks[1], app),
        Page::Share => {
            let text = export::share_text(
                app.session.engine(),
                &app.share_title,
                Local::now().date_naive(),
            );
            render_text_page(f, chunks[1], " Share Text ", text);
        }
        Page::Rules => {
            let text = export::rules_text(app.session.engine().strategy());
            render_text_page(f, chunks[1], " Rules Announcement ", text);
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header<S: KeyValueStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let (active, paused) = app.counts();

    let mut tab_spans = vec![Span::styled(
        "🚚 Freight Rotation  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    for (i, page) in [Page::Queue, Page::Share, Page::Rules].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Active: {}", active),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Paused: {}", paused),
        Style::default().fg(Color::DarkGray),
    ));
    if let Some(next) = app.session.engine().next_up() {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            format!("Next up: {}", next.name),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_queue<S: KeyValueStore>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let mut titles = vec!["#", "Driver", "Real", "Rotation"];
    titles.extend(WeekBreakdown::LABELS);

    let header_cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.rows.iter().map(|row| {
        let mut name = vec![Span::raw(truncate(&row.name, 22))];
        if row.refused_last {
            name.push(Span::styled(" REFUSED", Style::default().fg(Color::Red)));
        }
        if row.paused {
            name.push(Span::styled(" PAUSED", Style::default().fg(Color::DarkGray)));
        }

        let base = if row.paused {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        let mut cells = vec![
            Cell::from(row.rank_label()),
            Cell::from(Line::from(name)),
            Cell::from(format_money(row.real_earnings)).style(Style::default().fg(Color::Green)),
            Cell::from(format_money(row.total_earnings)),
        ];
        cells.extend(row.week.iter().map(|v| Cell::from(week_cell(*v))));

        Row::new(cells).style(base).height(1)
    });

    let mut widths = vec![
        Constraint::Length(4),
        Constraint::Length(32),
        Constraint::Length(14),
        Constraint::Length(14),
    ];
    widths.extend([Constraint::Length(12); 7]);

    let title = if app.search.is_empty() {
        " Queue ".to_string()
    } else {
        format!(" Queue (search: {}) ", app.search)
    };
    let border = if app.focus == Focus::Drivers { Color::White } else { Color::DarkGray };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel<S: KeyValueStore>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let border = if app.focus == Focus::History { Color::Yellow } else { Color::White };

    let Some(row) = app.selected_row().cloned() else {
        let no_selection = Paragraph::new("No driver selected").block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(" Driver Details "),
        );
        f.render_widget(no_selection, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(area);

    let label = |s: &'static str| {
        Span::styled(s, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };
    let status = match (row.paused, row.refused_last) {
        (true, _) => Span::styled("Paused", Style::default().fg(Color::DarkGray)),
        (false, true) => Span::styled("Refused last load", Style::default().fg(Color::Red)),
        (false, false) => Span::styled("Active", Style::default().fg(Color::Green)),
    };

    let summary = vec![
        Line::from(vec![label("  Position: "), Span::raw(row.rank_label())]),
        Line::from(vec![label("  Status: "), status]),
        Line::from(vec![
            label("  Real earnings: "),
            Span::styled(format_money(row.real_earnings), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![label("  Rotation total: "), Span::raw(format_money(row.total_earnings))]),
        Line::from(vec![label("  Entries: "), Span::raw(row.history.len().to_string())]),
    ];

    let summary_block = Paragraph::new(summary).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" {} ", row.name)),
    );
    f.render_widget(summary_block, chunks[0]);

    let history = row.history.iter().map(|entry| {
        let color = match entry.kind {
            EntryKind::Freight => Color::Green,
            EntryKind::Penalty | EntryKind::Refusal => Color::Red,
        };
        let when = entry.timestamp.with_timezone(&Local);
        Row::new(vec![
            Cell::from(when.format("%d/%m %H:%M").to_string()),
            Cell::from(entry.kind.as_str()).style(Style::default().fg(color)),
            Cell::from(format_money(entry.value)),
        ])
    });

    let table = Table::new(
        history,
        [
            Constraint::Length(12),
            Constraint::Length(9),
            Constraint::Length(14),
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" History (newest first) "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.history_state);
}

fn render_text_page(f: &mut Frame, area: Rect, title: &str, text: String) {
    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title.to_string()),
        );
    f.render_widget(paragraph, area);
}

fn render_status_bar<S: KeyValueStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let key = |s: &'static str| Span::styled(s, Style::default().fg(Color::Yellow));

    let spans = match &app.mode {
        Mode::Input { purpose, buffer } => vec![
            Span::styled(format!(" {}: ", purpose.label()), Style::default().fg(Color::Cyan)),
            Span::raw(format!("{}_", buffer)),
            Span::raw("  | "),
            key("Enter"),
            Span::raw(" OK | "),
            key("Esc"),
            Span::raw(" Cancel"),
        ],
        Mode::Confirm { prompt, .. } => vec![
            Span::styled(format!(" {} ", prompt), Style::default().fg(Color::Red)),
            key("y"),
            Span::raw("/"),
            key("n"),
        ],
        Mode::Normal => {
            let mut spans = Vec::new();
            if let Some(status) = &app.status {
                let color = if status.is_error { Color::Red } else { Color::Green };
                spans.push(Span::styled(format!(" {} ", status.text), Style::default().fg(color)));
                spans.push(Span::raw("| "));
            }
            for (k, what) in [
                ("a", " Add "),
                ("f", " Freight "),
                ("r", " Refuse "),
                ("p", " Pause "),
                ("x", " Remove "),
                ("→/e/d", " Entry "),
                ("R", " Reset "),
                ("/", " Search "),
                ("Tab", " Page "),
            ] {
                spans.push(key(k));
                spans.push(Span::raw(what));
            }
            spans.push(Span::styled("q", Style::default().fg(Color::Red)));
            spans.push(Span::raw(" Quit"));
            spans
        }
    };

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 3).collect();
        format!("{}...", cut)
    }
}
