//! Dashboard widgets
//!
//! Each widget renders one panel from a snapshot into a buffer.

use fluorite_core::{OverallHealth, ServiceEntry};
use ratatui::style::Color;

mod resource_table;
mod service_table;
mod summary;

pub use resource_table::ResourceTableWidget;
pub use service_table::ServiceTableWidget;
pub use summary::SummaryWidget;

pub fn health_color(health: OverallHealth) -> Color {
    match health {
        OverallHealth::Healthy => Color::Green,
        OverallHealth::Degraded => Color::Yellow,
        OverallHealth::Down => Color::Red,
    }
}

/// Short status label and color for one service row
pub fn entry_status(entry: &ServiceEntry) -> (&'static str, Color) {
    match entry {
        ServiceEntry::Failed(_) => ("error", Color::Red),
        ServiceEntry::Data(data) if !data.errors.is_empty() => ("partial", Color::Yellow),
        ServiceEntry::Data(data) if !data.authenticated => ("no auth", Color::Magenta),
        ServiceEntry::Data(_) => ("ok", Color::Green),
    }
}

/// Clip to `max` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluorite_core::ServiceData;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefgh", 5), "abcd…");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }

    #[test]
    fn test_entry_status() {
        let failed = ServiceEntry::failed("boom", Some("provider"));
        assert_eq!(entry_status(&failed).0, "error");

        let partial = ServiceEntry::Data(ServiceData::new("x").authenticated(true).with_error("r2"));
        assert_eq!(entry_status(&partial).0, "partial");

        let ok = ServiceEntry::Data(ServiceData::new("x").authenticated(true));
        assert_eq!(entry_status(&ok).0, "ok");
    }
}
