//! Main run loop

use fluorite_core::Result;
use fluorite_orchestrator::DashboardOrchestrator;
use std::time::Duration;
use tracing::info;

use crate::app::App;
use crate::event::{action_for, poll_event, Action, AppEvent};
use crate::{terminal, ui};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the dashboard until the user quits.
///
/// `orchestrator` must already be initialized; its refresh loop supplies
/// snapshots between manual refreshes.
pub async fn run(orchestrator: DashboardOrchestrator) -> Result<()> {
    let mut app = App::new(orchestrator);
    let (mut terminal, _guard) = terminal::init()?;

    // Empty services are still worth drawing, so a failure here is shown
    // in the header rather than returned
    app.refresh().await;

    while !app.should_quit {
        terminal.draw(|frame| ui::draw(frame, &app))?;
        app.pull_updates();

        match poll_event(POLL_INTERVAL)? {
            AppEvent::Key(key) => match action_for(key) {
                Some(Action::Quit) => app.should_quit = true,
                Some(Action::Refresh) => app.refresh().await,
                Some(Action::NextTab) => app.next_tab(),
                Some(Action::PrevTab) => app.prev_tab(),
                Some(Action::SelectPrev) => app.select_prev(),
                Some(Action::SelectNext) => app.select_next(),
                None => {}
            },
            // Redrawn on the next pass
            AppEvent::Resize(..) | AppEvent::Tick => {}
        }
    }

    info!("Dashboard closed");
    Ok(())
}
