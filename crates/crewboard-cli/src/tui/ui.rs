//! Rendering. Pure functions from app state to widgets; no state changes.

use crate::tui::app::{column_index, App, FormField, Overlay};
use crewboard_core::{AgentStatus, EnrichmentStatus, Task, TaskStatus, COLUMN_ORDER};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    render_status_bar(frame, app, layout[0]);
    render_board(frame, app, layout[1]);
    render_key_bar(frame, app, layout[2]);

    match app.overlay {
        Overlay::Form => render_form(frame, app, area),
        Overlay::Detail => render_detail(frame, app, area),
        Overlay::Help => render_help(frame, app, area),
        Overlay::ConfirmDelete => render_confirm(frame, app, area),
        Overlay::AgentPicker => render_picker(frame, app, area),
        Overlay::Suggestions => render_suggestions(frame, app, area),
        Overlay::None => {}
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode = match app.remote_status() {
        Some((addr, true)) => format!("remote {addr}"),
        Some((addr, false)) => format!("remote {addr} (disconnected)"),
        None => "local".to_string(),
    };
    let left = format!(" crewboard | {mode}");

    let mut spans = vec![Span::styled(left, Style::default().fg(app.theme.text))];
    if let Some(notification) = &app.notification {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            notification.text.clone(),
            Style::default().fg(app.theme.accent).add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_key_bar(frame: &mut Frame, app: &App, area: Rect) {
    let keys = " n new  enter detail  [/] move  c claim  s spawn  v view  d delete  S suggestions  ? help  q quit";
    frame.render_widget(
        Paragraph::new(keys).style(Style::default().fg(app.theme.text)),
        area,
    );
}

fn render_board(frame: &mut Frame, app: &App, area: Rect) {
    let constraints: Vec<Constraint> = COLUMN_ORDER
        .iter()
        .map(|_| Constraint::Ratio(1, COLUMN_ORDER.len() as u32))
        .collect();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (idx, status) in COLUMN_ORDER.iter().enumerate() {
        render_column(frame, app, columns[idx], *status, idx == app.board.focused);
    }
}

fn render_column(frame: &mut Frame, app: &App, area: Rect, status: TaskStatus, focused: bool) {
    let tasks = &app.board.columns[column_index(status)];
    let title = format!(" {} ({}) ", column_label(status), tasks.len());

    let border_style = if focused {
        Style::default().fg(app.theme.accent)
    } else {
        Style::default().fg(app.theme.border)
    };

    let items: Vec<ListItem> = tasks.iter().map(|task| task_item(app, task)).collect();
    let mut state = ListState::default();
    if focused && !tasks.is_empty() {
        state.select(Some(app.board.selected[column_index(status)]));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(title),
        )
        .highlight_style(
            Style::default()
                .fg(app.theme.accent)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        );
    frame.render_stateful_widget(list, area, &mut state);
}

fn task_item<'a>(app: &App, task: &'a Task) -> ListItem<'a> {
    let mut lines = vec![Line::from(Span::styled(
        task.title.clone(),
        Style::default().fg(app.theme.text),
    ))];

    let mut badges: Vec<String> = Vec::new();
    if !task.assignee.is_empty() {
        badges.push(format!("@{}", task.assignee));
    }
    if let Some(glyph) = agent_glyph(task.agent_status) {
        badges.push(format!("{glyph} {}", task.agent_name));
    }
    if task.enrichment_status == EnrichmentStatus::Pending
        || task.enrichment_status == EnrichmentStatus::Enriching
    {
        badges.push("enriching".to_string());
    }
    if !task.blocked_by.is_empty() {
        badges.push(format!("blocked({})", task.blocked_by.len()));
    }
    if !badges.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  {}", badges.join("  ")),
            Style::default().fg(app.theme.accent),
        )));
    }
    if !task.agent_activity.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  {}", task.agent_activity),
            Style::default().fg(app.theme.border),
        )));
    }

    ListItem::new(lines)
}

fn agent_glyph(status: AgentStatus) -> Option<&'static str> {
    match status {
        AgentStatus::Idle => None,
        AgentStatus::Active => Some("●"),
        AgentStatus::Completed => Some("✓"),
        AgentStatus::Error => Some("✗"),
    }
}

fn column_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Backlog => "Backlog",
        TaskStatus::Brainstorm => "Brainstorm",
        TaskStatus::Planning => "Planning",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Review => "Review",
        TaskStatus::Done => "Done",
    }
}

fn render_form(frame: &mut Frame, app: &App, area: Rect) {
    let rect = centered_rect(area, 60, 9);
    frame.render_widget(Clear, rect);

    let active = |field: FormField| {
        if app.form.field == Some(field) {
            Style::default().fg(app.theme.accent)
        } else {
            Style::default().fg(app.theme.text)
        }
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("Title: ", active(FormField::Title)),
            Span::raw(app.form.title.clone()),
            cursor_span(app, FormField::Title),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Description: ", active(FormField::Description)),
            Span::raw(app.form.description.clone()),
            cursor_span(app, FormField::Description),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "enter create  tab switch field  esc cancel",
            Style::default().fg(app.theme.border),
        )),
    ];

    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.accent))
                .title(" New Task "),
        ),
        rect,
    );
}

fn cursor_span(app: &App, field: FormField) -> Span<'static> {
    if app.form.field == Some(field) {
        Span::styled("▏", Style::default().fg(app.theme.accent))
    } else {
        Span::raw("")
    }
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = &app.detail else {
        return;
    };
    let rect = centered_rect(area, 70, area.height * 4 / 5);
    frame.render_widget(Clear, rect);

    let task = &detail.task;
    let mut lines = vec![
        Line::from(Span::styled(
            task.title.clone(),
            Style::default().fg(app.theme.accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("id: {}   column: {}", task.short_id(), task.status)),
    ];
    if !task.assignee.is_empty() {
        lines.push(Line::from(format!("assignee: {}", task.assignee)));
    }
    if !task.branch_name.is_empty() {
        lines.push(Line::from(format!("branch: {}", task.branch_name)));
    }
    if !task.pr_url.is_empty() {
        lines.push(Line::from(format!("pr: {} (#{})", task.pr_url, task.pr_number)));
    }
    if !task.agent_name.is_empty() {
        lines.push(Line::from(format!(
            "agent: {} ({})",
            task.agent_name, task.agent_status
        )));
    }
    if !task.agent_activity.is_empty() {
        lines.push(Line::from(format!("activity: {}", task.agent_activity)));
    }
    if task.enrichment_status != EnrichmentStatus::None {
        lines.push(Line::from(format!(
            "enrichment: {}",
            task.enrichment_status.as_str()
        )));
    }
    if !task.blocked_by.is_empty() {
        let short: Vec<String> = task
            .blocked_by
            .iter()
            .map(|id| id[..8.min(id.len())].to_string())
            .collect();
        lines.push(Line::from(format!("blocked by: {}", short.join(", "))));
    }
    if !task.description.is_empty() {
        lines.push(Line::from(""));
        for row in task.description.lines() {
            lines.push(Line::from(row.to_string()));
        }
    }
    if !detail.comments.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Comments ({})", detail.comments.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for comment in &detail.comments {
            lines.push(Line::from(format!(
                "[{}] {}: {}",
                comment.created_at.format("%m-%d %H:%M"),
                comment.author,
                comment.body
            )));
        }
    }
    if !detail.suggestions.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Suggestions ({})", detail.suggestions.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for suggestion in &detail.suggestions {
            lines.push(Line::from(format!(
                "[{}] {} - {}",
                suggestion.status, suggestion.kind, suggestion.title
            )));
        }
    }

    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((detail.scroll, 0))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(app.theme.accent))
                    .title(" Task "),
            ),
        rect,
    );
}

fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let rect = centered_rect(area, 52, 17);
    frame.render_widget(Clear, rect);
    let lines: Vec<Line> = [
        "h/l, arrows    focus column",
        "j/k, arrows    select task",
        "n              new task",
        "enter          task detail",
        "[ / ]          move task between columns",
        "c / u          claim / unclaim",
        "s              spawn agent",
        "K              kill agent",
        "v              view agent window",
        "r              request agent reset",
        "d              delete task",
        "S              pending suggestions",
        "q              quit",
    ]
    .iter()
    .map(|row| Line::from(*row))
    .collect();
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.border))
                .title(" Keys "),
        ),
        rect,
    );
}

fn render_confirm(frame: &mut Frame, app: &App, area: Rect) {
    let rect = centered_rect(area, 44, 5);
    frame.render_widget(Clear, rect);
    let title = app
        .board
        .selected_task()
        .map(|t| t.title.clone())
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(format!("Delete \"{title}\"?")),
            Line::from(""),
            Line::from("y confirm   n cancel"),
        ])
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.accent))
                .title(" Confirm "),
        ),
        rect,
    );
}

fn render_picker(frame: &mut Frame, app: &App, area: Rect) {
    let rect = centered_rect(area, 40, (app.runners.len() + 4) as u16);
    frame.render_widget(Clear, rect);

    let items: Vec<ListItem> = app
        .runners
        .iter()
        .map(|runner| ListItem::new(format!("{} ({})", runner.display_name(), runner.id())))
        .collect();
    let mut state = ListState::default();
    state.select(Some(app.picker_cursor));

    frame.render_stateful_widget(
        List::new(items)
            .highlight_style(
                Style::default()
                    .fg(app.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(app.theme.accent))
                    .title(" Spawn with "),
            ),
        rect,
        &mut state,
    );
}

fn render_suggestions(frame: &mut Frame, app: &App, area: Rect) {
    let rect = centered_rect(area, 70, area.height * 3 / 5);
    frame.render_widget(Clear, rect);

    let items: Vec<ListItem> = app
        .suggestions
        .iter()
        .map(|s| {
            let target = if s.task_id.is_empty() {
                "board".to_string()
            } else {
                s.task_id[..8.min(s.task_id.len())].to_string()
            };
            ListItem::new(vec![
                Line::from(format!("[{}] {}  ({} → {})", s.kind, s.title, s.author, target)),
                Line::from(Span::styled(
                    format!("  {}", s.message),
                    Style::default().fg(app.theme.border),
                )),
            ])
        })
        .collect();
    let mut state = ListState::default();
    if !app.suggestions.is_empty() {
        state.select(Some(app.suggestion_cursor));
    }

    frame.render_stateful_widget(
        List::new(items)
            .highlight_style(
                Style::default()
                    .fg(app.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(app.theme.accent))
                    .title(" Pending Suggestions: a accept, x dismiss "),
            ),
        rect,
        &mut state,
    );
}

/// Overlay rectangle: width as a percentage of the frame, height in rows,
/// both clamped to the frame.
fn centered_rect(area: Rect, width_pct: u16, height: u16) -> Rect {
    let width = (area.width * width_pct / 100).min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
