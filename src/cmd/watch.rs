//! Live board (`dispatch-board watch`).

use anyhow::Result;
use console::Term;
use dispatch_board::board::{BoardKind, StatusKey, TechnicianStatus, WorkOrderStatus};
use dispatch_board::config::BoardToml;
use dispatch_board::session::BoardSession;
use dispatch_board::sync::{BoardEvent, ConnectionState};
use tokio::sync::broadcast::error::RecvError;

use super::super::Cli;
use super::display;

pub async fn cmd_watch(cli: &Cli, search: Option<&str>) -> Result<()> {
    let config = super::resolve_config(cli)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    match config.kind() {
        BoardKind::WorkOrders => watch::<WorkOrderStatus>(&config.toml, search).await,
        BoardKind::Technicians => watch::<TechnicianStatus>(&config.toml, search).await,
    }
}

async fn watch<S: StatusKey>(toml: &BoardToml, search: Option<&str>) -> Result<()> {
    let session = BoardSession::<S>::connect(toml).await?;
    let mut events = session.subscribe();
    if let Some(text) = search {
        let mut filters = session.filters();
        filters.search = Some(text.to_string());
        session.set_filters(filters);
    }

    let term = Term::stdout();
    let mut connection = ConnectionState::Connecting { attempt: 1 };
    let mut last_notice: Option<String> = None;
    redraw(&term, &session, &connection, last_notice.as_deref());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(BoardEvent::Changed { .. }) => {}
                Ok(BoardEvent::Connectivity(state)) => connection = state,
                Ok(BoardEvent::Notice(notice)) => last_notice = Some(display::notice_line(&notice)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "display lagged behind board events");
                }
                Err(RecvError::Closed) => break,
            },
        }
        redraw(&term, &session, &connection, last_notice.as_deref());
    }

    session.unmount().await;
    Ok(())
}

fn redraw<S: StatusKey>(
    term: &Term,
    session: &BoardSession<S>,
    connection: &ConnectionState,
    notice: Option<&str>,
) {
    let view = session.view(None);
    let _ = term.clear_screen();
    let _ = term.write_line(&display::connection_line(connection));
    if let Some(notice) = notice {
        let _ = term.write_line(notice);
    }
    let _ = term.write_line("");
    let _ = term.write_str(&display::render_text(&view));
}
