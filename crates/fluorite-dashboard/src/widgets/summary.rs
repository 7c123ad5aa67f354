//! Aggregated roll-up panel

use fluorite_core::DashboardSnapshot;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders},
};

use super::health_color;

pub struct SummaryWidget;

impl SummaryWidget {
    pub fn render(snapshot: Option<&DashboardSnapshot>, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" SUMMARY ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner = block.inner(area);
        block.render(area, buf);
        if inner.height == 0 {
            return;
        }

        let Some(snapshot) = snapshot else {
            buf.set_string(
                inner.x + 1,
                inner.y,
                "Waiting for first snapshot…",
                Style::default().fg(Color::DarkGray),
            );
            return;
        };

        let line = Self::format_line(snapshot);
        buf.set_string(inner.x + 1, inner.y, &line, Style::default().fg(Color::White));

        // Recolor the health value in place
        let health = snapshot.aggregated.overall_health.to_string();
        if let Some(pos) = line.rfind(&health) {
            buf.set_string(
                inner.x + 1 + pos as u16,
                inner.y,
                &health,
                Style::default()
                    .fg(health_color(snapshot.aggregated.overall_health))
                    .bold(),
            );
        }
    }

    fn format_line(snapshot: &DashboardSnapshot) -> String {
        let stats = &snapshot.aggregated;
        format!(
            "Services: {:>3}    Resources: {:>5}    Errors: {:>3}    Health: {}",
            snapshot.services.len(),
            stats.total_resources,
            stats.total_errors,
            stats.overall_health
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluorite_core::{ServiceData, ServiceEntry};
    use std::collections::BTreeMap;

    #[test]
    fn test_format_line() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), ServiceEntry::Data(ServiceData::new("a")));
        services.insert("b".to_string(), ServiceEntry::failed("boom", None));
        let snapshot = DashboardSnapshot::from_entries(services);

        let line = SummaryWidget::format_line(&snapshot);
        assert!(line.contains("Services:   2"));
        assert!(line.contains("Errors:   1"));
        assert!(line.ends_with("degraded"));
    }

    #[test]
    fn test_render_without_snapshot() {
        let area = Rect::new(0, 0, 60, 3);
        let mut buf = Buffer::empty(area);
        SummaryWidget::render(None, area, &mut buf);
        let row: String = (0..area.width).map(|x| buf[(x, 1)].symbol().to_string()).collect();
        assert!(row.contains("Waiting"));
    }
}
