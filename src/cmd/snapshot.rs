//! One-shot board fetch (`dispatch-board snapshot`).

use anyhow::{Context, Result};
use dispatch_board::board::{
    BoardFilters, BoardKind, BoardStore, Priority, StatusKey, TechnicianStatus, WorkOrderStatus,
    render_board, visible_cards,
};
use dispatch_board::config::BoardToml;
use dispatch_board::session::http_api;
use dispatch_board::sync::BoardApi;

use super::super::{Cli, OutputFormat};
use super::display;

pub async fn cmd_snapshot(
    cli: &Cli,
    format: OutputFormat,
    search: Option<&str>,
    priorities: &[Priority],
) -> Result<()> {
    let config = super::resolve_config(cli)?;
    let output = match config.kind() {
        BoardKind::WorkOrders => {
            snapshot::<WorkOrderStatus>(&config.toml, format, search, priorities).await?
        }
        BoardKind::Technicians => {
            snapshot::<TechnicianStatus>(&config.toml, format, search, priorities).await?
        }
    };
    println!("{}", output);
    Ok(())
}

async fn snapshot<S: StatusKey>(
    toml: &BoardToml,
    format: OutputFormat,
    search: Option<&str>,
    priorities: &[Priority],
) -> Result<String> {
    let api = http_api::<S>(toml)?;
    let cards = api
        .fetch_snapshot()
        .await
        .with_context(|| format!("Failed to fetch {} board", S::KIND))?;
    tracing::debug!(cards = cards.len(), "snapshot fetched");

    let store = BoardStore::from_cards(cards);
    let filters = BoardFilters {
        search: search.map(str::to_string),
        priorities: priorities.iter().copied().collect(),
        ..BoardFilters::default()
    };
    let visible = visible_cards(&store, &filters);
    display::render(&render_board(&store, &visible, None), format)
}
