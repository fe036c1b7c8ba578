//! One-shot optimistic move (`dispatch-board move <card> <status>`).
//!
//! Runs the same path as a drop on the board: load, stage, call, then
//! commit or roll back. Exits non-zero when the move did not stick.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;
use dispatch_board::board::{
    BoardHandle, BoardKind, BoardStore, StatusKey, TechnicianStatus, WorkOrderStatus,
};
use dispatch_board::config::BoardToml;
use dispatch_board::session::http_api;
use dispatch_board::sync::{BoardApi, EventBus, OptimisticUpdateManager, TransitionOutcome};

use super::super::Cli;
use super::display::{CHECK, CROSS};

pub async fn cmd_move(cli: &Cli, card: &str, status: &str) -> Result<()> {
    let config = super::resolve_config(cli)?;
    match config.kind() {
        BoardKind::WorkOrders => move_card::<WorkOrderStatus>(&config.toml, card, status).await,
        BoardKind::Technicians => move_card::<TechnicianStatus>(&config.toml, card, status).await,
    }
}

async fn move_card<S: StatusKey>(toml: &BoardToml, card: &str, status: &str) -> Result<()> {
    let to_status: S = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let api: Arc<dyn BoardApi<S>> = Arc::new(http_api::<S>(toml)?);
    let cards = api
        .fetch_snapshot()
        .await
        .with_context(|| format!("Failed to fetch {} board", S::KIND))?;

    let board = BoardHandle::new(BoardStore::from_cards(cards));
    let manager = OptimisticUpdateManager::new(board, api, EventBus::new(), toml.request_timeout());

    match manager.transition(card, to_status).await? {
        TransitionOutcome::Committed { card_id, status } => {
            println!("{}{} moved to {}", CHECK, style(card_id).bold(), style(status).green());
            Ok(())
        }
        TransitionOutcome::Superseded { card_id } => {
            println!("{}{} already moved by the server", CHECK, style(card_id).bold());
            Ok(())
        }
        TransitionOutcome::RolledBack {
            card_id,
            restored,
            error,
        } => {
            println!(
                "{}{} rolled back to {}",
                CROSS,
                style(&card_id).bold(),
                style(restored).yellow()
            );
            bail!("Move of {} to {} failed: {}", card_id, to_status, error)
        }
        TransitionOutcome::Discarded { card_id } => bail!("Board closed before {} was moved", card_id),
    }
}
