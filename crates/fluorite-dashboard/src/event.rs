//! Terminal input
//!
//! Polls crossterm for key and resize events and maps keys to dashboard
//! actions.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use fluorite_core::Result;
use std::time::Duration;

/// Terminal events the run loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Key(KeyEvent),
    /// Poll timed out; time to pick up new snapshots
    Tick,
    Resize(u16, u16),
}

/// What a key press asks the dashboard to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Refresh,
    NextTab,
    PrevTab,
    SelectPrev,
    SelectNext,
}

/// Wait up to `timeout` for the next event
pub fn poll_event(timeout: Duration) -> Result<AppEvent> {
    if !event::poll(timeout)? {
        return Ok(AppEvent::Tick);
    }
    match event::read()? {
        // Windows reports releases too
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(AppEvent::Key(key)),
        Event::Resize(width, height) => Ok(AppEvent::Resize(width, height)),
        _ => Ok(AppEvent::Tick),
    }
}

/// Key bindings: q/Ctrl+C, r/F5, Tab/Shift+Tab, ↑/k, ↓/j
pub fn action_for(key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    match key.code {
        KeyCode::Char('c') if ctrl => Some(Action::Quit),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char('r') | KeyCode::Char('R') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::BackTab => Some(Action::PrevTab),
        KeyCode::Tab if shift => Some(Action::PrevTab),
        KeyCode::Tab => Some(Action::NextTab),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::SelectPrev),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::SelectNext),
        _ => None,
    }
}
