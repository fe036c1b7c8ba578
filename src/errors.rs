//! Typed error hierarchy for the board engine.
//!
//! - `TransitionRejected`: a drag refused locally, before any network call
//! - `ApiError`: REST failures; each one rolls back an optimistic write
//! - `SyncError`: push-channel failures; these trigger reconnect + polling
//! - `BoardError`: the umbrella type returned by store and session calls

use std::time::Duration;

use thiserror::Error;

use crate::board::models::CardId;

/// A transition the engine refused without contacting the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionRejected {
    #[error("Card {card_id} is already in column '{status}'")]
    SameColumn { card_id: CardId, status: String },

    #[error("Card {card_id} already has a pending move to '{to_status}'")]
    AlreadyPending { card_id: CardId, to_status: String },

    #[error("Card {card_id} is not on the board")]
    CardNotFound { card_id: CardId },

    #[error("Board has been torn down")]
    BoardDisposed,
}

/// Failures of the REST contract. Every variant counts as a network
/// failure for the optimistic update manager.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Server rejected the status update for card {card_id}")]
    Rejected { card_id: CardId },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode server response: {0}")]
    Decode(String),

    #[error("Invalid endpoint URL '{0}'")]
    InvalidUrl(String),
}

/// Failures of the push channel.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Failed to connect push channel: {0}")]
    Connect(String),

    #[error("Push channel lost: {0}")]
    ChannelLost(String),

    #[error("Malformed push frame: {0}")]
    MalformedFrame(String),
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Rejected(#[from] TransitionRejected),

    #[error("Network failure for card {card_id}: {source}")]
    NetworkFailure {
        card_id: CardId,
        #[source]
        source: ApiError,
    },

    #[error("Failed to load board snapshot: {0}")]
    Snapshot(#[source] ApiError),

    #[error("Card {card_id} is not on the board")]
    CardNotFound { card_id: CardId },

    #[error("Board has been torn down")]
    Disposed,
}
