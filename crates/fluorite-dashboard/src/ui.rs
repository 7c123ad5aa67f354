//! Layout and rendering

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    prelude::*,
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

use crate::app::{App, TabSelection};
use crate::widgets::{health_color, ResourceTableWidget, ServiceTableWidget, SummaryWidget};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Content
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);
    render_tabs(frame, chunks[1], app);

    match app.selected_tab {
        TabSelection::Overview => render_overview(frame, chunks[2], app),
        TabSelection::Detail => render_detail(frame, chunks[2], app),
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let mut spans = vec![Span::styled(
        "FLUORITE DASHBOARD",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    if let Some(snapshot) = &app.snapshot {
        let health = snapshot.aggregated.overall_health;
        spans.push(Span::raw("  "));
        spans.push(Span::styled(health.to_string(), Style::default().fg(health_color(health))));
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            snapshot
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string(),
            Style::default().fg(Color::Gray),
        ));
    }
    if let Some(error) = &app.last_error {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL)),
        halves[0],
    );

    let keys = Line::from(vec![
        Span::styled("[q]", Style::default().fg(Color::Yellow)),
        Span::raw("uit "),
        Span::styled("[r]", Style::default().fg(Color::Yellow)),
        Span::raw("efresh "),
        Span::styled("[Tab]", Style::default().fg(Color::Yellow)),
        Span::raw(" view "),
        Span::styled("[↑↓]", Style::default().fg(Color::Yellow)),
        Span::raw(" select"),
    ]);
    frame.render_widget(
        Paragraph::new(keys)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Right),
        halves[1],
    );
}

fn render_tabs(frame: &mut Frame, area: Rect, app: &App) {
    let tabs = Tabs::new(TabSelection::ALL.iter().map(|t| t.title()))
        .block(Block::default().borders(Borders::ALL).title("View"))
        .select(app.selected_tab.index())
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn render_overview(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    frame.render_widget(
        WidgetAdapter::new(|area, buf| SummaryWidget::render(app.snapshot.as_ref(), area, buf)),
        chunks[0],
    );
    frame.render_widget(
        WidgetAdapter::new(|area, buf| {
            ServiceTableWidget::render(app.snapshot.as_ref(), app.selected, area, buf)
        }),
        chunks[1],
    );
}

fn render_detail(frame: &mut Frame, area: Rect, app: &App) {
    frame.render_widget(
        WidgetAdapter::new(|area, buf| ResourceTableWidget::render(app.selected_service(), area, buf)),
        area,
    );
}

/// Bridges the static `render` functions to ratatui's `Widget` trait
struct WidgetAdapter<F>
where
    F: Fn(Rect, &mut Buffer),
{
    render_fn: F,
}

impl<F> WidgetAdapter<F>
where
    F: Fn(Rect, &mut Buffer),
{
    fn new(render_fn: F) -> Self {
        Self { render_fn }
    }
}

impl<F> Widget for WidgetAdapter<F>
where
    F: Fn(Rect, &mut Buffer),
{
    fn render(self, area: Rect, buf: &mut Buffer) {
        (self.render_fn)(area, buf);
    }
}
