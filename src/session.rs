//! One mounted board: the store plus the services wired around it.
//!
//! There is no global state. Whoever needs a board mounts a
//! [`BoardSession`], talks to it, and unmounts it; unmounting stops the
//! realtime client and the poller and disposes the store so late REST
//! results are dropped.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::board::drag::{DragDropController, DropOutcome};
use crate::board::filter::{BoardFilters, SearchDebouncer, visible_cards};
use crate::board::handle::BoardHandle;
use crate::board::models::CardId;
use crate::board::render::{BoardView, render_board};
use crate::board::status::StatusKey;
use crate::board::store::BoardStore;
use crate::config::BoardToml;
use crate::errors::{BoardError, TransitionRejected};
use crate::sync::api::{BoardApi, HttpBoardApi};
use crate::sync::bus::{BoardEvent, EventBus};
use crate::sync::optimistic::{OptimisticUpdateManager, TransitionOutcome};
use crate::sync::realtime::{PushConnector, RealtimeSettings, RealtimeSyncClient, WsConnector};

/// REST client for the server named in `toml`.
pub fn http_api<S: StatusKey>(toml: &BoardToml) -> Result<HttpBoardApi<S>> {
    let api = HttpBoardApi::new(&toml.server.base_url, toml.request_timeout())
        .with_context(|| format!("Invalid server URL '{}'", toml.server.base_url))?
        .with_token(toml.server.token.clone())
        .with_paths(
            toml.server.status_path.as_deref(),
            toml.server.snapshot_path.as_deref(),
        );
    Ok(api)
}

/// Tunables for a session, usually taken from `board.toml`.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub realtime: RealtimeSettings,
    pub request_timeout: Duration,
    pub search_debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            realtime: RealtimeSettings::default(),
            request_timeout: Duration::from_secs(10),
            search_debounce: Duration::from_millis(300),
        }
    }
}

impl SessionOptions {
    pub fn from_toml(toml: &BoardToml) -> Self {
        Self {
            realtime: toml.realtime_settings(),
            request_timeout: toml.request_timeout(),
            search_debounce: toml.search_debounce(),
        }
    }
}

pub struct BoardSession<S: StatusKey> {
    board: BoardHandle<S>,
    bus: EventBus,
    manager: Arc<OptimisticUpdateManager<S>>,
    filters: Mutex<BoardFilters<S>>,
    debouncer: SearchDebouncer,
    shutdown: CancellationToken,
    sync_task: Option<JoinHandle<()>>,
}

impl<S: StatusKey> BoardSession<S> {
    /// Load the initial snapshot, then start the realtime client.
    pub async fn mount(
        api: Arc<dyn BoardApi<S>>,
        connector: Arc<dyn PushConnector>,
        options: SessionOptions,
    ) -> Result<Self, BoardError> {
        let cards = api.fetch_snapshot().await.map_err(BoardError::Snapshot)?;
        let board = BoardHandle::new(BoardStore::from_cards(cards));
        let bus = EventBus::new();
        let manager = Arc::new(OptimisticUpdateManager::new(
            board.clone(),
            api,
            bus.clone(),
            options.request_timeout,
        ));

        let shutdown = CancellationToken::new();
        let client = RealtimeSyncClient::new(
            Arc::clone(&manager),
            connector,
            bus.clone(),
            options.realtime,
        );
        let sync_task = tokio::spawn(client.run(shutdown.child_token()));

        tracing::info!(
            board = S::KIND.as_str(),
            cards = board.read(|store| store.len()),
            "board mounted"
        );
        Ok(Self {
            board,
            bus,
            manager,
            filters: Mutex::new(BoardFilters::default()),
            debouncer: SearchDebouncer::new(options.search_debounce),
            shutdown,
            sync_task: Some(sync_task),
        })
    }

    /// Mount against the REST and WebSocket endpoints named in `toml`.
    pub async fn connect(toml: &BoardToml) -> Result<Self> {
        let api = http_api::<S>(toml)?;
        let ws_url = toml
            .ws_url()
            .context("No WebSocket URL configured and none could be derived from the server URL")?;
        let connector = WsConnector::new(ws_url, toml.server.token.clone());

        Self::mount(
            Arc::new(api),
            Arc::new(connector),
            SessionOptions::from_toml(toml),
        )
        .await
        .with_context(|| format!("Failed to mount board from {}", toml.server.base_url))
    }

    pub fn board(&self) -> &BoardHandle<S> {
        &self.board
    }

    pub fn manager(&self) -> &Arc<OptimisticUpdateManager<S>> {
        &self.manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.bus.subscribe()
    }

    /// A fresh drag controller bound to this board.
    pub fn drag_controller(&self) -> DragDropController<S> {
        DragDropController::new(self.board.clone())
    }

    /// Act on the result of a drop. Only a [`DropOutcome::Transition`]
    /// starts a move; the returned task resolves when the server answers.
    pub fn drop_card(
        &self,
        outcome: DropOutcome<S>,
    ) -> Result<Option<JoinHandle<TransitionOutcome<S>>>, TransitionRejected> {
        match outcome {
            DropOutcome::Transition(request) => match self.manager.submit(request) {
                Ok(task) => Ok(Some(task)),
                // The server moved the card here while it was being dragged.
                Err(TransitionRejected::SameColumn { card_id, status }) => {
                    tracing::debug!(card_id = %card_id, %status, "card already in drop column");
                    Ok(None)
                }
                Err(rejected) => Err(rejected),
            },
            DropOutcome::SameColumn { card_id, status } => {
                tracing::debug!(card_id = %card_id, %status, "dropped on source column");
                Ok(None)
            }
            DropOutcome::UnknownColumn { card_id, column } => {
                tracing::debug!(card_id = %card_id, column = %column, "dropped outside any column");
                Ok(None)
            }
            DropOutcome::NotDragging => Ok(None),
        }
    }

    /// Move a card and wait for the server's answer.
    pub async fn move_card(
        &self,
        card_id: &str,
        to_status: S,
    ) -> Result<TransitionOutcome<S>, BoardError> {
        Ok(self.manager.transition(card_id, to_status).await?)
    }

    pub fn filters(&self) -> BoardFilters<S> {
        self.lock_filters().clone()
    }

    pub fn set_filters(&self, filters: BoardFilters<S>) {
        *self.lock_filters() = filters;
    }

    /// Debounced search. Returns `false` when newer input superseded this
    /// text before the debounce window closed.
    pub async fn set_search(&self, text: impl Into<String>) -> bool {
        let Some(text) = self.debouncer.settle(text.into()).await else {
            return false;
        };
        let mut filters = self.lock_filters();
        filters.search = (!text.trim().is_empty()).then_some(text);
        true
    }

    pub fn visible(&self) -> BTreeSet<CardId> {
        let filters = self.filters();
        self.board.read(|store| visible_cards(store, &filters))
    }

    pub fn view(&self, dragging: Option<&str>) -> BoardView<S> {
        let filters = self.filters();
        self.board.read(|store| {
            let visible = visible_cards(store, &filters);
            render_board(store, &visible, dragging)
        })
    }

    /// Stop syncing and dispose the board. REST calls still in flight run
    /// to completion but their results are discarded.
    pub async fn unmount(mut self) {
        self.shutdown.cancel();
        self.board.dispose();
        if let Some(task) = self.sync_task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "realtime task ended abnormally");
        }
        tracing::info!(board = S::KIND.as_str(), "board unmounted");
    }

    fn lock_filters(&self) -> MutexGuard<'_, BoardFilters<S>> {
        self.filters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: StatusKey> Drop for BoardSession<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.board.dispose();
    }
}
