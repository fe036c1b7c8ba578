//! Optimistic update manager and conflict resolver.
//!
//! A move is applied to the store before the server sees it and tracked as
//! a [`PendingTransition`]. The REST result then commits it or rolls it
//! back. Realtime events for a card with a move in flight are parked behind
//! that move and replayed, in arrival order, once it resolves; an event
//! that puts the card where the move was taking it resolves the move on the
//! spot.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::api::{BoardApi, StatusUpdateResponse};
use super::bus::{BoardEvent, ChangeCause, EventBus, Notice};
use crate::board::drag::TransitionRequest;
use crate::board::handle::BoardHandle;
use crate::board::models::{Card, CardId, CardPatch, PendingTransition, RealtimeEvent};
use crate::board::status::StatusKey;
use crate::board::store::{BoardStore, EventEffect, SnapshotReport};
use crate::errors::{ApiError, BoardError, TransitionRejected};

/// How a submitted move ended.
#[derive(Debug)]
pub enum TransitionOutcome<S> {
    /// The server accepted the move; `status` is what it reported.
    Committed { card_id: CardId, status: S },
    /// The move was already resolved when the REST result arrived, by a
    /// realtime confirmation or because the card was deleted. A successful
    /// result still contributes its display fields; status is left alone.
    Superseded { card_id: CardId },
    /// The server call failed. The card went back to `restored` unless
    /// something else had moved it in the meantime. `error` is always
    /// [`BoardError::NetworkFailure`].
    RolledBack {
        card_id: CardId,
        restored: S,
        error: BoardError,
    },
    /// The board was torn down while the call was in flight.
    Discarded { card_id: CardId },
}

impl<S> TransitionOutcome<S> {
    pub fn card_id(&self) -> &str {
        match self {
            Self::Committed { card_id, .. }
            | Self::Superseded { card_id }
            | Self::RolledBack { card_id, .. }
            | Self::Discarded { card_id } => card_id,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::Superseded { .. })
    }
}

/// What the resolver did with one realtime event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Applied to the board straight away.
    Applied,
    /// Parked behind the card's pending move.
    Deferred,
    /// Confirmed the card's pending move, which committed immediately.
    Confirmed,
    /// Had no effect on the board.
    Ignored,
}

pub struct OptimisticUpdateManager<S: StatusKey> {
    board: BoardHandle<S>,
    api: Arc<dyn BoardApi<S>>,
    bus: EventBus,
    request_timeout: Duration,
}

impl<S: StatusKey> OptimisticUpdateManager<S> {
    pub fn new(
        board: BoardHandle<S>,
        api: Arc<dyn BoardApi<S>>,
        bus: EventBus,
        request_timeout: Duration,
    ) -> Self {
        Self {
            board,
            api,
            bus,
            request_timeout,
        }
    }

    pub fn board(&self) -> &BoardHandle<S> {
        &self.board
    }

    pub fn api(&self) -> &Arc<dyn BoardApi<S>> {
        &self.api
    }

    /// Validate a move, apply it to the store and register it as pending.
    /// No network call is made; a rejection leaves the board untouched.
    pub fn begin(&self, card_id: &str, to_status: S) -> Result<PendingTransition<S>, TransitionRejected> {
        let transition = self
            .board
            .write(|store| stage_transition(store, card_id, to_status))
            .unwrap_or(Err(TransitionRejected::BoardDisposed))?;
        tracing::debug!(
            card_id,
            from = %transition.from_status,
            to = %transition.to_status,
            request_id = %transition.client_request_id,
            "optimistic transition applied"
        );
        self.bus
            .publish(BoardEvent::changed(ChangeCause::Optimistic, card_id));
        Ok(transition)
    }

    /// Send a staged move to the server and resolve it with the result.
    pub async fn complete(&self, transition: PendingTransition<S>) -> TransitionOutcome<S> {
        let call = self
            .api
            .update_status(&transition.card_id, transition.to_status);
        let result = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.request_timeout)),
        };
        self.resolve(transition, result)
    }

    /// Commit or roll back `transition` given the server's answer, then
    /// replay the events deferred behind it.
    pub fn resolve(
        &self,
        transition: PendingTransition<S>,
        result: Result<StatusUpdateResponse<S>, ApiError>,
    ) -> TransitionOutcome<S> {
        let card_id = transition.card_id.clone();
        let mut merged_late = false;
        let written = self.board.write(|store| {
            let Some((pending, deferred)) =
                store.clear_pending(&card_id, transition.client_request_id)
            else {
                if let Ok(response) = result {
                    merged_late = merge_late_response(store, &card_id, response);
                }
                return TransitionOutcome::Superseded {
                    card_id: card_id.clone(),
                };
            };
            let outcome = match result {
                Ok(response) => commit(store, &pending, response),
                Err(error) => rollback(store, &pending, error),
            };
            replay(store, deferred);
            outcome
        });

        let outcome = match written {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(card_id = %card_id, "board disposed; discarding transition result");
                return TransitionOutcome::Discarded { card_id };
            }
        };

        match outcome {
            TransitionOutcome::Committed { ref card_id, status } => {
                tracing::info!(card_id = %card_id, %status, "transition committed");
                self.bus
                    .publish(BoardEvent::changed(ChangeCause::Committed, card_id.as_str()));
            }
            TransitionOutcome::RolledBack {
                ref card_id,
                restored,
                ref error,
            } => {
                tracing::warn!(card_id = %card_id, %restored, error = %error, "transition rolled back");
                let reason = match error {
                    BoardError::NetworkFailure { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.bus
                    .publish(BoardEvent::changed(ChangeCause::RolledBack, card_id.as_str()));
                self.bus.publish(BoardEvent::Notice(Notice::error(
                    card_id.as_str(),
                    format!("Could not move {} to {}: {}", card_id, transition.to_status, reason),
                )));
            }
            TransitionOutcome::Superseded { ref card_id } => {
                tracing::debug!(card_id = %card_id, merged_late, "transition already resolved");
                if merged_late {
                    self.bus
                        .publish(BoardEvent::changed(ChangeCause::Committed, card_id.as_str()));
                }
            }
            TransitionOutcome::Discarded { .. } => {}
        }
        outcome
    }

    /// Stage and complete a move in one call.
    pub async fn transition(
        &self,
        card_id: &str,
        to_status: S,
    ) -> Result<TransitionOutcome<S>, TransitionRejected> {
        let transition = self.begin(card_id, to_status)?;
        Ok(self.complete(transition).await)
    }

    /// Stage a move from a drop and finish it in the background.
    pub fn submit(
        self: &Arc<Self>,
        request: TransitionRequest<S>,
    ) -> Result<JoinHandle<TransitionOutcome<S>>, TransitionRejected> {
        let transition = self.begin(&request.card_id, request.to_status)?;
        if transition.from_status != request.from_status {
            tracing::debug!(
                card_id = %request.card_id,
                dragged_from = %request.from_status,
                actual_from = %transition.from_status,
                "card moved during drag"
            );
        }
        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move { manager.complete(transition).await }))
    }

    /// Route a realtime event through the conflict rule.
    pub fn handle_realtime(&self, event: RealtimeEvent<S>) -> EventDisposition {
        let card_id = event.card_id().to_string();
        let kind = event.kind();
        let disposition = match self.board.write(|store| resolve_event(store, event)) {
            Ok(disposition) => disposition,
            Err(_) => return EventDisposition::Ignored,
        };
        tracing::debug!(card_id = %card_id, kind, ?disposition, "realtime event");
        if matches!(
            disposition,
            EventDisposition::Applied | EventDisposition::Confirmed
        ) {
            self.bus
                .publish(BoardEvent::changed(ChangeCause::Realtime, card_id));
        }
        disposition
    }

    /// Merge a full server snapshot, keeping pending moves in place.
    pub fn ingest_snapshot(&self, cards: Vec<Card<S>>) -> Result<SnapshotReport, BoardError> {
        let report = self.board.write(|store| store.ingest_snapshot(cards))?;
        if !report.overwritten.is_empty() {
            tracing::warn!(
                cards = ?report.overwritten,
                "snapshot disagreed with local board; server state kept"
            );
        }
        if !report.is_noop() {
            tracing::debug!(
                added = report.added.len(),
                removed = report.removed.len(),
                reapplied = report.reapplied.len(),
                "snapshot merged"
            );
            self.bus.publish(BoardEvent::Changed {
                cause: ChangeCause::Snapshot,
                card_id: None,
            });
        }
        Ok(report)
    }
}

fn stage_transition<S: StatusKey>(
    store: &mut BoardStore<S>,
    card_id: &str,
    to_status: S,
) -> Result<PendingTransition<S>, TransitionRejected> {
    let from_status = store
        .status_of(card_id)
        .ok_or_else(|| TransitionRejected::CardNotFound {
            card_id: card_id.to_string(),
        })?;
    if from_status == to_status {
        return Err(TransitionRejected::SameColumn {
            card_id: card_id.to_string(),
            status: to_status.to_string(),
        });
    }
    let transition = PendingTransition::new(card_id, from_status, to_status);
    store.track_pending(transition.clone())?;
    if store.apply_transition(card_id, to_status).is_err() {
        store.clear_pending(card_id, transition.client_request_id);
        return Err(TransitionRejected::CardNotFound {
            card_id: card_id.to_string(),
        });
    }
    Ok(transition)
}

fn commit<S: StatusKey>(
    store: &mut BoardStore<S>,
    pending: &PendingTransition<S>,
    response: StatusUpdateResponse<S>,
) -> TransitionOutcome<S> {
    let card_id = &pending.card_id;
    let status = response
        .new_status
        .or_else(|| response.card.as_ref().map(|card| card.status))
        .unwrap_or(pending.to_status);

    // The canonical card from the server replaces ours wholesale.
    if let Some(mut card) = response.card {
        if card.id == *card_id {
            card.status = status;
            store.upsert_card(card);
        }
    } else if store.get_card(card_id).is_some() {
        let mut patch = CardPatch::new(card_id.as_str());
        patch.status = Some(status);
        patch.technician_name = response.technician_name;
        if let Err(e) = store.merge_patch(&patch) {
            tracing::debug!(card_id = %card_id, error = %e, "could not merge server response");
        }
    }
    TransitionOutcome::Committed {
        card_id: card_id.clone(),
        status,
    }
}

/// Fold a success that arrived after the move was already resolved into
/// the card, keeping whatever status the board holds now.
fn merge_late_response<S: StatusKey>(
    store: &mut BoardStore<S>,
    card_id: &str,
    response: StatusUpdateResponse<S>,
) -> bool {
    let Some(current) = store.status_of(card_id) else {
        return false;
    };
    if let Some(mut card) = response.card {
        if card.id != card_id {
            return false;
        }
        card.status = current;
        store.upsert_card(card);
        return true;
    }
    let Some(name) = response.technician_name else {
        return false;
    };
    let mut patch = CardPatch::new(card_id);
    patch.technician_name = Some(name);
    store.merge_patch(&patch).is_ok()
}

fn rollback<S: StatusKey>(
    store: &mut BoardStore<S>,
    pending: &PendingTransition<S>,
    error: ApiError,
) -> TransitionOutcome<S> {
    // Only undo our own move; if the card has since gone elsewhere, leave it.
    if store.status_of(&pending.card_id) == Some(pending.to_status) {
        let _ = store.apply_transition(&pending.card_id, pending.from_status);
    }
    TransitionOutcome::RolledBack {
        card_id: pending.card_id.clone(),
        restored: pending.from_status,
        error: BoardError::NetworkFailure {
            card_id: pending.card_id.clone(),
            source: error,
        },
    }
}

fn replay<S: StatusKey>(store: &mut BoardStore<S>, events: Vec<RealtimeEvent<S>>) {
    for event in events {
        let card_id = event.card_id().to_string();
        if let Err(e) = store.apply_event(event) {
            tracing::debug!(card_id = %card_id, error = %e, "deferred event no longer applies");
        }
    }
}

fn resolve_event<S: StatusKey>(store: &mut BoardStore<S>, event: RealtimeEvent<S>) -> EventDisposition {
    let card_id = event.card_id().to_string();
    let Some(pending) = store.pending(&card_id).cloned() else {
        return match store.apply_event(event) {
            Ok(EventEffect::Unchanged) => EventDisposition::Ignored,
            Ok(_) => EventDisposition::Applied,
            Err(e) => {
                tracing::debug!(card_id = %card_id, error = %e, "realtime event does not apply");
                EventDisposition::Ignored
            }
        };
    };

    if event.target_status() == Some(pending.to_status) {
        let deferred = store
            .clear_pending(&card_id, pending.client_request_id)
            .map(|(_, deferred)| deferred)
            .unwrap_or_default();
        replay(store, deferred);
        replay(store, vec![event]);
        return EventDisposition::Confirmed;
    }

    match store.defer_event(event) {
        Ok(()) => EventDisposition::Deferred,
        Err(event) => {
            replay(store, vec![event]);
            EventDisposition::Applied
        }
    }
}
