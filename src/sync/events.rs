//! Push-channel wire format.
//!
//! Every frame is `{"type": <kind>, "data": <payload>}`. Inbound frames are
//! decoded into [`PushMessage`]; the client sends [`ClientFrame`]s.

use serde::{Deserialize, Serialize};

use crate::board::models::{Card, CardPatch, RealtimeEvent};
use crate::board::status::{BoardKind, StatusKey};
use crate::errors::SyncError;

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { channel: String },
}

impl ClientFrame {
    pub fn to_text(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::MalformedFrame(e.to_string()))
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage<S> {
    Board(RealtimeEvent<S>),
    /// Who is looking at the board. Not board state.
    Presence(serde_json::Value),
    /// A kind this board does not act on.
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode one text frame for a board of kind `S::KIND`.
pub fn decode_frame<S: StatusKey>(text: &str) -> Result<PushMessage<S>, SyncError> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|e| SyncError::MalformedFrame(e.to_string()))?;
    let kind = S::KIND;
    let event = match frame.kind.as_str() {
        "work_order_updated" if kind == BoardKind::WorkOrders => {
            RealtimeEvent::CardUpdated(patch_from(unwrap_field(frame.data, "work_order"))?)
        }
        "technician_updated" if kind == BoardKind::Technicians => {
            RealtimeEvent::CardUpdated(patch_from(unwrap_field(frame.data, "technician"))?)
        }
        "task_started" | "task_completed" if kind == BoardKind::WorkOrders => {
            RealtimeEvent::CardReplaced(card_from(unwrap_field(frame.data, "task"))?)
        }
        "card_created" => RealtimeEvent::CardCreated(card_from(unwrap_field(frame.data, "card"))?),
        "card_updated" => RealtimeEvent::CardUpdated(patch_from(unwrap_field(frame.data, "card"))?),
        "status_changed" => {
            let patch: CardPatch<S> = patch_from(frame.data)?;
            let status = patch.status.ok_or_else(|| {
                SyncError::MalformedFrame(format!("status_changed for {} has no status", patch.id))
            })?;
            RealtimeEvent::StatusChanged {
                card_id: patch.id,
                status,
                technician_name: patch.technician_name,
            }
        }
        "card_deleted" => {
            let patch: CardPatch<S> = patch_from(frame.data)?;
            RealtimeEvent::CardDeleted { card_id: patch.id }
        }
        "presence_update" => return Ok(PushMessage::Presence(frame.data)),
        _ => return Ok(PushMessage::Ignored(frame.kind)),
    };
    Ok(PushMessage::Board(event))
}

/// Payloads arrive both bare and wrapped as `{"<field>": {...}}`.
fn unwrap_field(data: serde_json::Value, field: &str) -> serde_json::Value {
    match data {
        serde_json::Value::Object(mut map) if map.get(field).is_some_and(|v| v.is_object()) => {
            map.remove(field).unwrap_or_default()
        }
        other => other,
    }
}

fn card_from<S: StatusKey>(data: serde_json::Value) -> Result<Card<S>, SyncError> {
    serde_json::from_value(data).map_err(|e| SyncError::MalformedFrame(e.to_string()))
}

fn patch_from<S: StatusKey>(data: serde_json::Value) -> Result<CardPatch<S>, SyncError> {
    serde_json::from_value(data).map_err(|e| SyncError::MalformedFrame(e.to_string()))
}
