use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::board::models::CardId;

/// Capacity of the board event channel. Slow subscribers see `Lagged`
/// and should redraw from the store.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible, transient message (the toast layer renders these).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub card_id: Option<CardId>,
    pub dismissible: bool,
}

impl Notice {
    pub fn error(card_id: impl Into<CardId>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            card_id: Some(card_id.into()),
            dismissible: true,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            card_id: None,
            dismissible: true,
        }
    }
}

/// State of the push channel, for the connectivity indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting { attempt: u32 },
    Connected,
    /// Push channel down. The next connect attempt is `retry_in` away and
    /// the snapshot poller is running when `polling` is set.
    Disconnected {
        attempt: u32,
        #[serde(with = "duration_ms")]
        retry_in: Duration,
        polling: bool,
    },
    /// The client was shut down.
    Closed,
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Why the board changed. Subscribers typically redraw on any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// A local move was applied ahead of the server.
    Optimistic,
    /// The server confirmed a move.
    Committed,
    /// A move failed and the card went back to its source column.
    RolledBack,
    /// Someone else changed the board.
    Realtime,
    /// A full snapshot was merged.
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BoardEvent {
    Changed {
        cause: ChangeCause,
        card_id: Option<CardId>,
    },
    Notice(Notice),
    Connectivity(ConnectionState),
}

impl BoardEvent {
    pub fn changed(cause: ChangeCause, card_id: impl Into<CardId>) -> Self {
        Self::Changed {
            cause,
            card_id: Some(card_id.into()),
        }
    }
}

/// Fan-out of [`BoardEvent`]s to every subscriber of a session.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BoardEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: BoardEvent) {
        let _ = self.tx.send(event);
    }
}
