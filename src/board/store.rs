use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use super::models::{Card, CardId, CardPatch, PendingTransition, RealtimeEvent};
use super::status::StatusKey;
use crate::errors::{BoardError, TransitionRejected};

/// What a full-snapshot merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub added: Vec<CardId>,
    pub removed: Vec<CardId>,
    /// Cards with no pending write whose local status disagreed with the
    /// server. The server value won.
    pub overwritten: Vec<CardId>,
    /// Cards whose pending transition was re-applied on top of the snapshot.
    /// Informational: the local board already shows the pending target, so
    /// a re-application alone changes nothing.
    pub reapplied: Vec<CardId>,
    /// Existing cards whose stored record changed in any field.
    pub updated: Vec<CardId>,
    /// Column order differs from before the merge.
    pub reordered: bool,
}

impl SnapshotReport {
    /// True when the board reads exactly as it did before the merge.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty() && !self.reordered
    }
}

/// Result of applying one realtime event to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEffect {
    Applied,
    Removed,
    Unchanged,
}

#[derive(Debug)]
struct PendingEntry<S> {
    transition: PendingTransition<S>,
    /// Realtime events for this card that arrived while the transition was
    /// in flight, in arrival order.
    deferred: Vec<RealtimeEvent<S>>,
}

/// Cards grouped into status columns, plus the flat id index and the
/// pending-transition registry.
///
/// The fields are private: every mutation goes through one of the methods
/// below, each of which leaves columns, index and card statuses consistent
/// before it returns.
#[derive(Debug)]
pub struct BoardStore<S: StatusKey> {
    columns: BTreeMap<S, Vec<CardId>>,
    cards: HashMap<CardId, Card<S>>,
    pending: HashMap<CardId, PendingEntry<S>>,
}

impl<S: StatusKey> Default for BoardStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_columns<S: StatusKey>() -> BTreeMap<S, Vec<CardId>> {
    S::ALL.iter().map(|status| (*status, Vec::new())).collect()
}

impl<S: StatusKey> BoardStore<S> {
    pub fn new() -> Self {
        Self {
            columns: empty_columns(),
            cards: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn from_cards(cards: impl IntoIterator<Item = Card<S>>) -> Self {
        let mut store = Self::new();
        store.ingest_snapshot(cards);
        store
    }

    // ── Readers ──────────────────────────────────────────────────────

    pub fn get_card(&self, card_id: &str) -> Option<&Card<S>> {
        self.cards.get(card_id)
    }

    pub fn status_of(&self, card_id: &str) -> Option<S> {
        self.cards.get(card_id).map(|card| card.status)
    }

    pub fn column(&self, status: S) -> &[CardId] {
        self.columns
            .get(&status)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Columns in display order.
    pub fn columns(&self) -> impl Iterator<Item = (S, &[CardId])> + '_ {
        self.columns.iter().map(|(status, ids)| (*status, ids.as_slice()))
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card<S>> + '_ {
        self.cards.values()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn pending(&self, card_id: &str) -> Option<&PendingTransition<S>> {
        self.pending.get(card_id).map(|entry| &entry.transition)
    }

    pub fn pending_transitions(&self) -> impl Iterator<Item = &PendingTransition<S>> + '_ {
        self.pending.values().map(|entry| &entry.transition)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn deferred_count(&self, card_id: &str) -> usize {
        self.pending
            .get(card_id)
            .map(|entry| entry.deferred.len())
            .unwrap_or(0)
    }

    // ── Mutators ─────────────────────────────────────────────────────

    /// Move a card to `to_status`, updating both its column membership and
    /// its status field. Returns the status it had before.
    pub fn apply_transition(&mut self, card_id: &str, to_status: S) -> Result<S, BoardError> {
        let card = self
            .cards
            .get_mut(card_id)
            .ok_or_else(|| BoardError::CardNotFound {
                card_id: card_id.to_string(),
            })?;
        let previous = card.status;
        if previous == to_status {
            return Ok(previous);
        }
        card.status = to_status;
        self.detach(card_id, previous);
        self.attach(card_id, to_status);
        Ok(previous)
    }

    /// Replace the whole board with a server snapshot.
    ///
    /// Pending transitions survive: a card with a move in flight is placed
    /// in the column it is moving to, whatever the snapshot says. Cards
    /// without a pending write take the server's values. Applying the same
    /// snapshot twice yields the same board.
    pub fn ingest_snapshot(&mut self, cards: impl IntoIterator<Item = Card<S>>) -> SnapshotReport {
        let mut report = SnapshotReport::default();
        let mut index: HashMap<CardId, Card<S>> = HashMap::new();
        let mut order: Vec<CardId> = Vec::new();

        // Duplicate ids: the last record wins, the first position is kept.
        for card in cards {
            let id = card.id.clone();
            if index.insert(id.clone(), card).is_none() {
                order.push(id);
            }
        }

        let mut columns = empty_columns::<S>();
        for id in &order {
            let Some(card) = index.get_mut(id) else {
                continue;
            };
            let local_status = self.status_of(id);
            if let Some(entry) = self.pending.get(id) {
                let target = entry.transition.to_status;
                if card.status != target {
                    card.status = target;
                    report.reapplied.push(id.clone());
                }
            } else if local_status.is_some_and(|status| status != card.status) {
                report.overwritten.push(id.clone());
            }
            match self.cards.get(id) {
                None => report.added.push(id.clone()),
                Some(local) if local != &*card => report.updated.push(id.clone()),
                Some(_) => {}
            }
            columns.entry(card.status).or_default().push(id.clone());
        }

        report.removed = self
            .cards
            .keys()
            .filter(|id| !index.contains_key(*id))
            .cloned()
            .collect();
        report.removed.sort();
        report.reordered = columns != self.columns;

        self.columns = columns;
        self.cards = index;
        report
    }

    /// Insert a card or replace an existing one, moving it between columns
    /// if its status changed. Returns the previous version.
    pub fn upsert_card(&mut self, card: Card<S>) -> Option<Card<S>> {
        let id = card.id.clone();
        let status = card.status;
        let previous = self.cards.insert(id.clone(), card);
        match previous.as_ref().map(|card| card.status) {
            Some(old) if old == status => {}
            Some(old) => {
                self.detach(&id, old);
                self.attach(&id, status);
            }
            None => self.attach(&id, status),
        }
        previous
    }

    /// Merge a partial update into an existing card. Returns the previous
    /// status when the patch moved the card.
    pub fn merge_patch(&mut self, patch: &CardPatch<S>) -> Result<Option<S>, BoardError> {
        let card = self
            .cards
            .get_mut(&patch.id)
            .ok_or_else(|| BoardError::CardNotFound {
                card_id: patch.id.clone(),
            })?;
        card.merge_display_fields(patch);
        match patch.status {
            Some(status) => self.apply_transition(&patch.id, status).map(Some),
            None => Ok(None),
        }
    }

    /// Remove a card from the board. Any pending transition for it is
    /// dropped along with its deferred events.
    pub fn remove_card(&mut self, card_id: &str) -> Option<Card<S>> {
        let card = self.cards.remove(card_id)?;
        self.detach(card_id, card.status);
        self.pending.remove(card_id);
        Some(card)
    }

    pub fn track_pending(&mut self, transition: PendingTransition<S>) -> Result<(), TransitionRejected> {
        if let Some(existing) = self.pending.get(&transition.card_id) {
            return Err(TransitionRejected::AlreadyPending {
                card_id: transition.card_id.clone(),
                to_status: existing.transition.to_status.to_string(),
            });
        }
        self.pending.insert(
            transition.card_id.clone(),
            PendingEntry {
                transition,
                deferred: Vec::new(),
            },
        );
        Ok(())
    }

    /// Remove the pending transition for `card_id` if it is the one
    /// identified by `request_id`, returning it with the events deferred
    /// while it was in flight. A stale request id leaves the registry
    /// untouched.
    pub fn clear_pending(
        &mut self,
        card_id: &str,
        request_id: Uuid,
    ) -> Option<(PendingTransition<S>, Vec<RealtimeEvent<S>>)> {
        match self.pending.get(card_id) {
            Some(entry) if entry.transition.client_request_id == request_id => {}
            _ => return None,
        }
        self.pending
            .remove(card_id)
            .map(|entry| (entry.transition, entry.deferred))
    }

    /// Park an event behind the pending transition of its card. Hands the
    /// event back if the card has nothing pending.
    pub fn defer_event(&mut self, event: RealtimeEvent<S>) -> Result<(), RealtimeEvent<S>> {
        let card_id = event.card_id().to_string();
        match self.pending.get_mut(&card_id) {
            Some(entry) => {
                entry.deferred.push(event);
                Ok(())
            }
            None => Err(event),
        }
    }

    pub fn apply_event(&mut self, event: RealtimeEvent<S>) -> Result<EventEffect, BoardError> {
        match event {
            RealtimeEvent::CardCreated(card) | RealtimeEvent::CardReplaced(card) => {
                self.upsert_card(card);
                Ok(EventEffect::Applied)
            }
            RealtimeEvent::CardUpdated(patch) => {
                self.merge_patch(&patch)?;
                Ok(EventEffect::Applied)
            }
            RealtimeEvent::StatusChanged {
                card_id,
                status,
                technician_name,
            } => {
                self.apply_transition(&card_id, status)?;
                if let Some(name) = technician_name
                    && let Some(card) = self.cards.get_mut(&card_id)
                {
                    card.technician_name = Some(name);
                }
                Ok(EventEffect::Applied)
            }
            RealtimeEvent::CardDeleted { card_id } => Ok(match self.remove_card(&card_id) {
                Some(_) => EventEffect::Removed,
                None => EventEffect::Unchanged,
            }),
        }
    }

    /// Verify that every card sits in exactly one column, that the column
    /// agrees with its status, and that columns hold no unknown ids.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen: HashMap<&str, S> = HashMap::new();
        for (status, ids) in &self.columns {
            for id in ids {
                if let Some(other) = seen.insert(id.as_str(), *status) {
                    return Err(format!(
                        "card {} listed in both '{}' and '{}'",
                        id, other, status
                    ));
                }
                match self.cards.get(id) {
                    None => return Err(format!("column '{}' lists unknown card {}", status, id)),
                    Some(card) if card.status != *status => {
                        return Err(format!(
                            "card {} has status '{}' but sits in column '{}'",
                            id, card.status, status
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
        if let Some(orphan) = self.cards.keys().find(|id| !seen.contains_key(id.as_str())) {
            return Err(format!("card {} is in no column", orphan));
        }
        Ok(())
    }

    fn detach(&mut self, card_id: &str, status: S) {
        if let Some(ids) = self.columns.get_mut(&status) {
            ids.retain(|id| id != card_id);
        }
    }

    fn attach(&mut self, card_id: &str, status: S) {
        self.columns
            .entry(status)
            .or_default()
            .push(card_id.to_string());
    }
}
