use anyhow::Result;
use chrono::Local;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};
use serde_json::Value;
use std::io::stdout;
use std::time::{Duration, Instant};

use crate::api::{ApiError, Backend};
use crate::controller::{LoadState, ResourceList};
use crate::dashboard::{self, Urgency};
use crate::models::{Point, Stats};
use crate::notify::{Notification, Notifier, Severity, message_from_value};
use crate::resources::{Resource, job_status_label};
use crate::text::{format_date_display, strip_html, truncate};

type Term = Terminal<CrosstermBackend<std::io::Stdout>>;

const TICK: Duration = Duration::from_millis(250);

fn with_terminal(run: impl FnOnce(&mut Term) -> Result<()>) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run(&mut terminal);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    result
}

/// Key presses only; `None` when the tick elapsed without input.
fn next_key() -> Result<Option<KeyCode>> {
    if !event::poll(TICK)? {
        return Ok(None);
    }
    match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key.code)),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Delete,
    Approve,
    Reject,
}

impl Action {
    fn verb(&self) -> &'static str {
        match self {
            Action::Delete => "Delete",
            Action::Approve => "Approve",
            Action::Reject => "Reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Normal,
    Search,
    Confirm(Action, i64),
}

struct AppState<'a, R: Resource> {
    list: ResourceList<'a, R>,
    selected: usize,
    scroll_offset: u16,
    mode: InputMode,
}

impl<'a, R: Resource> AppState<'a, R> {
    fn new(list: ResourceList<'a, R>) -> Self {
        Self {
            list,
            selected: 0,
            scroll_offset: 0,
            mode: InputMode::Normal,
        }
    }

    fn current(&self) -> Option<&R> {
        self.list.view().get(self.selected).copied()
    }

    fn clamp(&mut self) {
        let len = self.list.view().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn next(&mut self) {
        if self.selected + 1 < self.list.view().len() {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn moderated() -> bool {
        R::endpoints().approve.is_some()
    }

    fn ask(&mut self, action: Action) {
        let allowed = match action {
            Action::Delete => R::endpoints().delete.is_some(),
            Action::Approve | Action::Reject => Self::moderated(),
        };
        if !allowed {
            return;
        }
        if let Some(id) = self.current().map(|r| r.id()) {
            self.mode = InputMode::Confirm(action, id);
        }
    }

    /// Runs a confirmed action. The popup already asked, so the controller's
    /// own confirmation always passes.
    fn run(&mut self, action: Action, id: i64) {
        let mut confirmed = |_: &str| true;
        let result = match action {
            Action::Delete => self.list.delete(id, &mut confirmed),
            Action::Approve => self.list.approve(id, &mut confirmed),
            Action::Reject => self.list.reject(id, &mut confirmed),
        };
        if let Err(e) = result {
            self.list.notifier().error(e.to_string());
        }
        self.clamp();
    }

    fn answer(&mut self, action: Action, id: i64, key: KeyCode) {
        self.mode = InputMode::Normal;
        if matches!(key, KeyCode::Char('y') | KeyCode::Char('Y')) {
            self.run(action, id);
        } else {
            self.list.notifier().info(format!("{} cancelled", action.verb()));
        }
    }

    fn dismiss_toast(&mut self) {
        let notifier = self.list.notifier();
        if let Some(id) = notifier.last().map(|n| n.id) {
            notifier.dismiss(id);
        }
    }

    fn reload(&mut self) {
        if let Err(e) = self.list.load() {
            self.list.notifier().error(e.user_message("Reload failed"));
        }
        self.clamp();
    }

    fn cycle_status(&mut self) {
        let next = match self.list.status() {
            None => Some(0),
            Some(0) => Some(1),
            Some(1) => Some(2),
            _ => None,
        };
        if let Err(e) = self.list.set_status(next) {
            self.list.notifier().error(e.user_message("Reload failed"));
        }
        self.selected = 0;
    }

    fn edit_search(&mut self, key: KeyCode) {
        let mut term = self.list.search().to_string();
        match key {
            KeyCode::Char(c) => term.push(c),
            KeyCode::Backspace => {
                term.pop();
            }
            KeyCode::Esc => {
                term.clear();
                self.mode = InputMode::Normal;
            }
            KeyCode::Enter => self.mode = InputMode::Normal,
            _ => return,
        }
        self.list.set_search(&term);
        self.selected = 0;
    }
}

pub fn run_browse<R: Resource>(backend: &dyn Backend, search: Option<&str>) -> Result<()> {
    let mut list = ResourceList::<R>::new(backend);
    if let Some(term) = search {
        list.set_search(term);
    }
    // A failed first load is shown in the title bar.
    let _ = list.load();

    let mut state = AppState::new(list);
    with_terminal(|terminal| run_loop(terminal, &mut state))
}

fn run_loop<R: Resource>(terminal: &mut Term, state: &mut AppState<'_, R>) -> Result<()> {
    let mut table_state = TableState::default();

    loop {
        let toasts = state.list.notifier().active(Instant::now()).to_vec();
        table_state.select(Some(state.selected));
        terminal.draw(|frame| draw(frame, state, &toasts, &mut table_state))?;

        let Some(code) = next_key()? else { continue };
        match state.mode {
            InputMode::Search => state.edit_search(code),
            InputMode::Confirm(action, id) => state.answer(action, id, code),
            InputMode::Normal => match code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('/') => state.mode = InputMode::Search,
                KeyCode::Char('s') => {
                    let sort = state.list.sort().next();
                    state.list.set_sort(sort);
                }
                KeyCode::Char('r') => state.reload(),
                KeyCode::Char('d') => state.ask(Action::Delete),
                KeyCode::Char('a') => state.ask(Action::Approve),
                KeyCode::Char('x') => state.ask(Action::Reject),
                KeyCode::Char('f') if AppState::<R>::moderated() => state.cycle_status(),
                KeyCode::Char('c') => state.dismiss_toast(),
                _ => {}
            },
        }
    }
    Ok(())
}

fn status_bar<R: Resource>(state: &AppState<'_, R>) -> Line<'static> {
    let view_len = state.list.view().len();
    let mut spans = vec![Span::styled(
        format!(" {} ", R::NAME),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::raw(format!("{}/{} ", view_len, state.list.items().len())));
    if AppState::<R>::moderated() {
        let status = match state.list.status() {
            None => "all".to_string(),
            Some(s) => job_status_label(Some(s)).to_lowercase(),
        };
        spans.push(Span::raw(format!("| status: {} ", status)));
    }
    spans.push(Span::raw(format!("| sort: {} ", state.list.sort().as_str())));
    if !state.list.search().is_empty() || state.mode == InputMode::Search {
        spans.push(Span::styled(
            format!("| search: {}", state.list.search()),
            Style::default().fg(Color::Yellow),
        ));
        if state.mode == InputMode::Search {
            spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        }
    }
    match state.list.state() {
        LoadState::Loading => spans.push(Span::raw(" | loading...")),
        LoadState::Failed(message) => spans.push(Span::styled(
            format!(" | {}", message),
            Style::default().fg(Color::Red),
        )),
        LoadState::Ready => {}
    }
    Line::from(spans)
}

fn draw<R: Resource>(
    frame: &mut Frame,
    state: &AppState<'_, R>,
    toasts: &[Notification],
    table_state: &mut TableState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    frame.render_widget(Paragraph::new(status_bar(state)), rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[1]);

    let view = state.list.view();
    let header = Row::new(R::headers().iter().map(|h| Cell::from(*h)))
        .style(Style::default().add_modifier(Modifier::BOLD));
    let body: Vec<Row> = view.iter().map(|record| Row::new(record.row())).collect();
    let widths: Vec<Constraint> = R::headers()
        .iter()
        .enumerate()
        .map(|(i, _)| if i == 0 { Constraint::Length(6) } else { Constraint::Fill(1) })
        .collect();
    let table = Table::new(body, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", R::TITLE)))
        .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(table, chunks[0], table_state);

    let detail = match state.current() {
        Some(record) => build_detail(record),
        None => Text::raw("Nothing selected"),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail_widget, chunks[1]);

    let mut help = String::from(" j/k:navigate  J/K:scroll  /:search  s:sort  r:reload  d:delete");
    if AppState::<R>::moderated() {
        help.push_str("  a:approve  x:reject  f:status");
    }
    help.push_str("  c:dismiss  q:quit");
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );

    if let InputMode::Confirm(action, id) = state.mode {
        let area = centered(frame.area(), 44, 5);
        frame.render_widget(Clear, area);
        let prompt = Paragraph::new(format!(
            "{} {} #{}?\n\n(y) yes   (n) no",
            action.verb(),
            R::TITLE.to_lowercase(),
            id
        ))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(" Confirm "));
        frame.render_widget(prompt, area);
    }

    draw_toasts(frame, toasts);
}

fn build_detail<R: Resource>(record: &R) -> Text<'static> {
    let key_style = Style::default().fg(Color::Cyan);
    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            format!("{} #{}", R::TITLE, record.id()),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    let Ok(Value::Object(fields)) = serde_json::to_value(record) else {
        return Text::from(lines);
    };
    for (key, value) in fields {
        let text = match &value {
            Value::Null => continue,
            Value::String(s) if s.trim().is_empty() => continue,
            Value::String(s) => strip_html(s),
            Value::Array(items) if items.is_empty() => continue,
            Value::Array(items) => items
                .iter()
                .map(message_from_value)
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        };
        if text.chars().count() > 48 || text.contains('\n') {
            lines.push(Line::from(Span::styled(key, key_style)));
            for line in textwrap::fill(&text, 60).lines() {
                lines.push(Line::from(format!("  {}", line)));
            }
        } else {
            lines.push(Line::from(vec![
                Span::styled(format!("{:<18}", key), key_style),
                Span::raw(text),
            ]));
        }
    }
    Text::from(lines)
}

fn draw_toasts(frame: &mut Frame, toasts: &[Notification]) {
    let area = frame.area();
    for (i, toast) in toasts.iter().rev().take(4).enumerate() {
        let width = (toast.message.chars().count() as u16 + 4)
            .max(20)
            .min(area.width.saturating_sub(2));
        let y = area.height.saturating_sub(4 + 3 * i as u16);
        let rect = Rect::new(area.width.saturating_sub(width + 1), y, width, 3).intersection(area);
        let color = match toast.severity {
            Severity::Success => Color::Green,
            Severity::Error => Color::Red,
            Severity::Info => Color::Blue,
        };
        frame.render_widget(Clear, rect);
        frame.render_widget(
            Paragraph::new(truncate(&toast.message, width.saturating_sub(2) as usize))
                .style(Style::default().fg(color))
                .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color))),
            rect,
        );
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

// --- Dashboard ---

struct DashboardState {
    stats: Result<Stats, ApiError>,
    notifier: Notifier,
}

impl DashboardState {
    fn load(backend: &dyn Backend) -> Self {
        Self {
            stats: dashboard::fetch_stats(backend),
            notifier: Notifier::new(),
        }
    }

    /// A failed refresh keeps the last good statistics on screen.
    fn refresh(&mut self, backend: &dyn Backend) {
        match dashboard::fetch_stats(backend) {
            Ok(stats) => {
                self.stats = Ok(stats);
                self.notifier.info("Statistics refreshed");
            }
            Err(e) => {
                self.notifier.error(e.user_message("Failed to load statistics"));
                if self.stats.is_err() {
                    self.stats = Err(e);
                }
            }
        }
    }
}

pub fn run_dashboard(backend: &dyn Backend) -> Result<()> {
    let mut state = DashboardState::load(backend);
    with_terminal(|terminal| {
        loop {
            let toasts = state.notifier.active(Instant::now()).to_vec();
            terminal.draw(|frame| {
                draw_dashboard(frame, &state.stats);
                draw_toasts(frame, &toasts);
            })?;
            match next_key()? {
                Some(KeyCode::Char('q')) | Some(KeyCode::Esc) => break,
                Some(KeyCode::Char('r')) => state.refresh(backend),
                _ => {}
            }
        }
        Ok(())
    })
}

fn titled(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", title))
}

fn signed(n: i64) -> String {
    if n > 0 { format!("+{}", n) } else { n.to_string() }
}

fn share_rows(points: &[Point]) -> Vec<Row<'static>> {
    dashboard::top_n(points, 7)
        .into_iter()
        .map(|s| Row::new(vec![truncate(&s.label, 20), s.value.to_string(), format!("{:.0}%", s.share)]))
        .collect()
}

fn draw_dashboard(frame: &mut Frame, stats: &Result<Stats, ApiError>) {
    let stats = match stats {
        Ok(stats) => stats,
        Err(e) => {
            let message = format!(
                "Failed to load statistics: {}\n\nr:retry  q:quit",
                e.user_message("request failed")
            );
            frame.render_widget(
                Paragraph::new(message)
                    .style(Style::default().fg(Color::Red))
                    .block(titled("Dashboard")),
                frame.area(),
            );
            return;
        }
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(12),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // Summary cards, then job health.
    let mut cards = dashboard::summary(stats);
    cards.extend(dashboard::job_health(stats).into_iter().skip(1));
    let card_areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, cards.len() as u32); cards.len()])
        .split(rows[0]);
    for (card, area) in cards.iter().zip(card_areas.iter()) {
        let percent = if card.percent != 0.0 {
            Span::styled(
                format!(" {:+.1}%", card.percent),
                Style::default().fg(if card.percent > 0.0 { Color::Green } else { Color::Red }),
            )
        } else {
            Span::raw("")
        };
        let text = Line::from(vec![
            Span::styled(format!("{}", card.value), Style::default().add_modifier(Modifier::BOLD)),
            percent,
        ]);
        frame.render_widget(Paragraph::new(text).block(titled(card.title)), *area);
    }

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[1]);

    let monthly = dashboard::monthly_comparison(stats, 4);
    let month_rows: Vec<Row> = monthly
        .months
        .iter()
        .enumerate()
        .map(|(i, month)| {
            Row::new(vec![
                month.clone(),
                monthly.users[i].to_string(),
                monthly.companies[i].to_string(),
                monthly.jobs[i].to_string(),
                monthly.applies[i].to_string(),
            ])
        })
        .collect();
    frame.render_widget(
        Table::new(month_rows, [Constraint::Fill(1); 5])
            .header(Row::new(["Month", "Users", "Companies", "Jobs", "Applies"]).style(Style::default().add_modifier(Modifier::BOLD)))
            .block(titled("Last 4 months")),
        middle[0],
    );

    let daily = dashboard::daily_window(stats, Local::now().date_naive(), 7);
    let mut day_rows: Vec<Row> = daily
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let mut cells = vec![label.clone()];
            for series in daily.series() {
                cells.push(format!("{} ({})", series.values[i], signed(series.delta(i))));
            }
            Row::new(cells)
        })
        .collect();
    let mut totals = vec!["Total".to_string()];
    totals.extend(daily.series().iter().map(|s| s.total().to_string()));
    day_rows.push(Row::new(totals).style(Style::default().add_modifier(Modifier::BOLD)));
    let mut peaks = vec!["Peak".to_string()];
    peaks.extend(daily.series().iter().map(|s| match s.peak() {
        Some(day) => daily.labels[day].clone(),
        None => "-".to_string(),
    }));
    day_rows.push(Row::new(peaks).style(Style::default().fg(Color::Yellow)));
    frame.render_widget(
        Table::new(day_rows, [Constraint::Length(7), Constraint::Fill(1), Constraint::Fill(1), Constraint::Fill(1)])
            .header(Row::new(["Day", "Jobs", "Users", "Companies"]).style(Style::default().add_modifier(Modifier::BOLD)))
            .block(titled(&format!("Last 7 days ({} new)", daily.grand_total()))),
        middle[1],
    );

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(28), Constraint::Percentage(28), Constraint::Percentage(44)])
        .split(rows[2]);

    let share_widths = [Constraint::Fill(1), Constraint::Length(5), Constraint::Length(5)];
    frame.render_widget(
        Table::new(share_rows(&stats.jobs_by_field), share_widths).block(titled("Jobs by field")),
        bottom[0],
    );
    frame.render_widget(
        Table::new(share_rows(&stats.jobs_by_province), share_widths).block(titled("Jobs by province")),
        bottom[1],
    );

    let expiring: Vec<Row> = stats
        .expiring_jobs_list
        .iter()
        .map(|job| {
            let urgency = dashboard::urgency(job.days_left);
            let color = match urgency {
                Urgency::Urgent => Color::Red,
                Urgency::Warning => Color::Yellow,
                Urgency::Normal => Color::Green,
            };
            Row::new(vec![
                Cell::from(truncate(job.name_job.as_deref().unwrap_or(""), 24)),
                Cell::from(truncate(job.name_company.as_deref().unwrap_or(""), 18)),
                Cell::from(format_date_display(job.deadline.as_deref().unwrap_or(""))),
                Cell::from(format!("{}d", job.days_left)),
                Cell::from(urgency.label()).style(Style::default().fg(color)),
            ])
        })
        .collect();
    frame.render_widget(
        Table::new(
            expiring,
            [
                Constraint::Fill(2),
                Constraint::Fill(1),
                Constraint::Length(10),
                Constraint::Length(4),
                Constraint::Length(8),
            ],
        )
        .block(titled("Expiring soon")),
        bottom[2],
    );

    frame.render_widget(
        Paragraph::new(" r:refresh  q:quit").style(Style::default().fg(Color::DarkGray)),
        rows[3],
    );
}
