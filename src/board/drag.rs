//! Drag-and-drop gesture state machine.
//!
//! `Idle → Dragging → (drop) → Idle`. The controller only reads the store;
//! a completed drop yields a [`TransitionRequest`] that the caller hands to
//! the optimistic update manager.

use super::handle::BoardHandle;
use super::models::CardId;
use super::status::StatusKey;
use crate::errors::TransitionRejected;

/// Where the dragged card would land if dropped now. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionIndicator<S> {
    pub column: S,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession<S> {
    pub card_id: CardId,
    pub from_status: S,
    pub indicator: Option<InsertionIndicator<S>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState<S> {
    Idle,
    Dragging(DragSession<S>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest<S> {
    pub card_id: CardId,
    pub from_status: S,
    pub to_status: S,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome<S> {
    /// Hand this to the optimistic update manager.
    Transition(TransitionRequest<S>),
    /// Dropped back onto the source column; nothing to do.
    SameColumn { card_id: CardId, status: S },
    /// The drop target is not a column of this board.
    UnknownColumn { card_id: CardId, column: String },
    /// No drag was in progress.
    NotDragging,
}

pub struct DragDropController<S: StatusKey> {
    board: BoardHandle<S>,
    state: DragState<S>,
}

impl<S: StatusKey> DragDropController<S> {
    pub fn new(board: BoardHandle<S>) -> Self {
        Self {
            board,
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState<S> {
        &self.state
    }

    pub fn dragging_card(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging(session) => Some(&session.card_id),
            DragState::Idle => None,
        }
    }

    /// Start dragging a card. Captures its current column as the source.
    /// A drag already in progress is abandoned.
    pub fn drag_start(&mut self, card_id: &str) -> Result<(), TransitionRejected> {
        let from_status = self
            .board
            .read(|store| store.status_of(card_id))
            .ok_or_else(|| TransitionRejected::CardNotFound {
                card_id: card_id.to_string(),
            })?;
        tracing::debug!(card_id, from = %from_status, "drag started");
        self.state = DragState::Dragging(DragSession {
            card_id: card_id.to_string(),
            from_status,
            indicator: None,
        });
        Ok(())
    }

    /// Pointer moved over `column` at list position `index`. Returns the
    /// clamped insertion indicator, or `None` when nothing is being dragged.
    pub fn drag_over(&mut self, column: S, index: usize) -> Option<InsertionIndicator<S>> {
        let DragState::Dragging(session) = &mut self.state else {
            return None;
        };
        let len = self.board.read(|store| {
            store
                .column(column)
                .iter()
                .filter(|id| **id != session.card_id)
                .count()
        });
        let indicator = InsertionIndicator {
            column,
            index: index.min(len),
        };
        session.indicator = Some(indicator);
        Some(indicator)
    }

    /// Drop onto `column`. Always returns the controller to `Idle`.
    pub fn drop(&mut self, column: S) -> DropOutcome<S> {
        let DragState::Dragging(session) = std::mem::replace(&mut self.state, DragState::Idle) else {
            return DropOutcome::NotDragging;
        };
        if session.from_status == column {
            return DropOutcome::SameColumn {
                card_id: session.card_id,
                status: column,
            };
        }
        DropOutcome::Transition(TransitionRequest {
            card_id: session.card_id,
            from_status: session.from_status,
            to_status: column,
        })
    }

    /// Drop onto a column identified by its `data-status` attribute.
    pub fn drop_on(&mut self, data_status: &str) -> DropOutcome<S> {
        match data_status.parse::<S>() {
            Ok(column) => self.drop(column),
            Err(_) => match std::mem::replace(&mut self.state, DragState::Idle) {
                DragState::Dragging(session) => DropOutcome::UnknownColumn {
                    card_id: session.card_id,
                    column: data_status.to_string(),
                },
                DragState::Idle => DropOutcome::NotDragging,
            },
        }
    }

    /// Gesture ended without a drop.
    pub fn drag_end(&mut self) {
        self.state = DragState::Idle;
    }
}
