//! Resources, metrics and errors of the selected service

use fluorite_core::{Resource, ServiceData, ServiceEntry};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, Row, Table},
};

use super::{entry_status, truncate};

pub struct ResourceTableWidget;

impl ResourceTableWidget {
    pub fn render(selected: Option<(&str, &ServiceEntry)>, area: Rect, buf: &mut Buffer) {
        let Some((name, entry)) = selected else {
            let block = Block::default().title(" DETAIL ").borders(Borders::ALL);
            let inner = block.inner(area);
            block.render(area, buf);
            buf.set_string(
                inner.x + 1,
                inner.y,
                "No service selected",
                Style::default().fg(Color::DarkGray),
            );
            return;
        };

        let (status, color) = entry_status(entry);
        let title = Line::from(vec![
            Span::raw(format!(" {} ", name.to_uppercase())),
            Span::styled(format!("[{}] ", status), Style::default().fg(color)),
        ]);

        match entry {
            ServiceEntry::Failed(failure) => {
                let block = Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red));
                let inner = block.inner(area);
                block.render(area, buf);

                let mut lines = vec![Line::styled(failure.error.clone(), Style::default().fg(Color::Red))];
                if let Some(code) = &failure.code {
                    lines.push(Line::styled(format!("code: {}", code), Style::default().fg(Color::Gray)));
                }
                Widget::render(List::new(lines.into_iter().map(ListItem::new)), inner, buf);
            }
            ServiceEntry::Data(data) => Self::render_data(title, data, area, buf),
        }
    }

    fn render_data(title: Line<'_>, data: &ServiceData, area: Rect, buf: &mut Buffer) {
        let notes = Self::notes(data);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),
                Constraint::Length(notes.len().min(8) as u16 + 2),
            ])
            .split(area);

        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));
        let inner = block.inner(chunks[0]);
        block.render(chunks[0], buf);

        if data.resources.is_empty() {
            buf.set_string(
                inner.x + 1,
                inner.y,
                "No resources",
                Style::default().fg(Color::DarkGray),
            );
        } else {
            let widths = [
                Constraint::Length(24), // Name
                Constraint::Length(12), // Kind
                Constraint::Length(14), // Status
                Constraint::Length(17), // Updated
                Constraint::Min(10),    // URL
            ];
            let header = Row::new(vec!["Name", "Kind", "Status", "Updated", "URL"])
                .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
            let rows: Vec<Row> = data.resources.iter().map(Self::row).collect();
            Widget::render(
                Table::new(rows, widths).header(header).column_spacing(1),
                inner,
                buf,
            );
        }

        let block = Block::default().title(" NOTES ").borders(Borders::ALL);
        let inner = block.inner(chunks[1]);
        block.render(chunks[1], buf);
        Widget::render(List::new(notes), inner, buf);
    }

    fn row(resource: &Resource) -> Row<'static> {
        let updated = resource
            .updated_at
            .map(|at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        Row::new(vec![
            Cell::from(truncate(&resource.name, 24)).style(Style::default().fg(Color::White)),
            Cell::from(truncate(&resource.kind, 12)),
            Cell::from(resource.status.clone().unwrap_or_default()).style(Style::default().fg(Color::Green)),
            Cell::from(updated).style(Style::default().fg(Color::Cyan)),
            Cell::from(resource.url.clone().unwrap_or_default()).style(Style::default().fg(Color::Gray)),
        ])
    }

    /// Soft errors first, then metrics
    fn notes(data: &ServiceData) -> Vec<ListItem<'static>> {
        let errors = data
            .errors
            .iter()
            .map(|e| ListItem::new(format!("! {}", e)).style(Style::default().fg(Color::Yellow)));
        let metrics = data
            .metrics
            .iter()
            .map(|(name, value)| ListItem::new(format!("{}: {}", name, value)));
        errors.chain(metrics).collect()
    }
}
