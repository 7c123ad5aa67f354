//! One row per service

use fluorite_core::{DashboardSnapshot, ServiceEntry};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Row, Table, TableState},
};

use super::{entry_status, truncate};

pub struct ServiceTableWidget;

impl ServiceTableWidget {
    pub fn render(snapshot: Option<&DashboardSnapshot>, selected: usize, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" SERVICES ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner = block.inner(area);
        block.render(area, buf);

        let services = match snapshot {
            Some(snapshot) if !snapshot.services.is_empty() => &snapshot.services,
            _ => {
                buf.set_string(
                    inner.x + 1,
                    inner.y,
                    "No services registered",
                    Style::default().fg(Color::DarkGray),
                );
                return;
            }
        };

        let widths = [
            Constraint::Length(14), // Service
            Constraint::Length(9),  // Status
            Constraint::Length(10), // Resources
            Constraint::Length(7),  // Errors
            Constraint::Length(10), // Fetched
            Constraint::Min(10),    // Message
        ];

        let header = Row::new(vec!["Service", "Status", "Resources", "Errors", "Fetched", "Message"])
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

        let rows: Vec<Row> = services
            .iter()
            .map(|(name, entry)| Self::row(name, entry))
            .collect();

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .highlight_symbol("▶ ")
            .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

        let mut state = TableState::default().with_selected(Some(selected));
        StatefulWidget::render(table, inner, buf, &mut state);
    }

    fn row(name: &str, entry: &ServiceEntry) -> Row<'static> {
        let (status, color) = entry_status(entry);
        let (resources, fetched, message) = match entry {
            ServiceEntry::Data(data) => (
                data.resources.len().to_string(),
                data.fetched_at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string(),
                data.errors.first().cloned().unwrap_or_default(),
            ),
            ServiceEntry::Failed(failure) => ("-".to_string(), "-".to_string(), failure.error.clone()),
        };

        Row::new(vec![
            Cell::from(truncate(name, 14)).style(Style::default().fg(Color::White)),
            Cell::from(status).style(Style::default().fg(color)),
            Cell::from(resources),
            Cell::from(entry.error_count().to_string()).style(Style::default().fg(if entry.error_count() > 0 {
                Color::Red
            } else {
                Color::Gray
            })),
            Cell::from(fetched).style(Style::default().fg(Color::Cyan)),
            Cell::from(truncate(&message, 60)).style(Style::default().fg(Color::Gray)),
        ])
    }
}
