use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::status::{Priority, StatusKey};

pub type CardId = String;

/// Servers hand out both numeric and string ids; the board keys on strings.
fn de_card_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CardId, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid card id: {}", other))),
    }
}

/// One work order (or technician) as shown on the board.
///
/// Only `id`, `status`, `priority` and the technician assignment carry
/// meaning for the engine; everything else is display payload and is kept
/// as received, including fields this crate does not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card<S> {
    #[serde(deserialize_with = "de_card_id")]
    pub id: CardId,
    pub status: S,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "technician_id")]
    pub assigned_technician_id: Option<String>,
    #[serde(default)]
    pub technician_name: Option<String>,
    #[serde(default, alias = "name")]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub claim_number: Option<String>,
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl<S: StatusKey> Card<S> {
    pub fn new(id: impl Into<CardId>, status: S) -> Self {
        Self {
            id: id.into(),
            status,
            priority: Priority::default(),
            assigned_technician_id: None,
            technician_name: None,
            customer_name: None,
            description: None,
            claim_number: None,
            scheduled_date: None,
            created_at: None,
            updated_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Date used for date-range filtering: the scheduled date when present,
    /// otherwise the creation date. Accepts plain dates and RFC 3339
    /// timestamps.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.scheduled_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| self.created_at.as_deref().and_then(parse_date))
    }

    /// Copy every field the patch carries onto this card. Status is left to
    /// the store, which has to move the id between columns as well.
    pub(crate) fn merge_display_fields(&mut self, patch: &CardPatch<S>) {
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(ref tech) = patch.assigned_technician_id {
            self.assigned_technician_id = Some(tech.clone());
        }
        if let Some(ref name) = patch.technician_name {
            self.technician_name = Some(name.clone());
        }
        if let Some(ref name) = patch.customer_name {
            self.customer_name = Some(name.clone());
        }
        if let Some(ref description) = patch.description {
            self.description = Some(description.clone());
        }
        if let Some(ref claim) = patch.claim_number {
            self.claim_number = Some(claim.clone());
        }
        if let Some(ref date) = patch.scheduled_date {
            self.scheduled_date = Some(date.clone());
        }
        if let Some(ref updated) = patch.updated_at {
            self.updated_at = Some(updated.clone());
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// Partial update for a card, as pushed by `work_order_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: StatusKey"))]
pub struct CardPatch<S> {
    #[serde(deserialize_with = "de_card_id", alias = "card_id", alias = "work_order_id")]
    pub id: CardId,
    #[serde(default)]
    pub status: Option<S>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, alias = "technician_id")]
    pub assigned_technician_id: Option<String>,
    #[serde(default)]
    pub technician_name: Option<String>,
    #[serde(default, alias = "name")]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub claim_number: Option<String>,
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl<S> CardPatch<S> {
    pub fn new(id: impl Into<CardId>) -> Self {
        Self {
            id: id.into(),
            status: None,
            priority: None,
            assigned_technician_id: None,
            technician_name: None,
            customer_name: None,
            description: None,
            claim_number: None,
            scheduled_date: None,
            updated_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A status change applied to the board ahead of server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition<S> {
    pub card_id: CardId,
    pub from_status: S,
    pub to_status: S,
    pub client_request_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

impl<S> PendingTransition<S> {
    pub fn new(card_id: impl Into<CardId>, from_status: S, to_status: S) -> Self {
        Self {
            card_id: card_id.into(),
            from_status,
            to_status,
            client_request_id: Uuid::new_v4(),
            submitted_at: Utc::now(),
        }
    }
}

/// A board change made by someone else, delivered over the push channel or
/// derived from it. Every kind the engine understands is listed here; the
/// store and the conflict resolver match on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent<S> {
    /// A card that did not exist before.
    CardCreated(Card<S>),
    /// Full canonical representation of an existing card.
    CardReplaced(Card<S>),
    /// Partial update.
    CardUpdated(CardPatch<S>),
    StatusChanged {
        card_id: CardId,
        status: S,
        technician_name: Option<String>,
    },
    CardDeleted { card_id: CardId },
}

impl<S: StatusKey> RealtimeEvent<S> {
    pub fn card_id(&self) -> &str {
        match self {
            Self::CardCreated(card) | Self::CardReplaced(card) => &card.id,
            Self::CardUpdated(patch) => &patch.id,
            Self::StatusChanged { card_id, .. } | Self::CardDeleted { card_id } => card_id,
        }
    }

    /// Status the event would put the card in, if it carries one.
    pub fn target_status(&self) -> Option<S> {
        match self {
            Self::CardCreated(card) | Self::CardReplaced(card) => Some(card.status),
            Self::CardUpdated(patch) => patch.status,
            Self::StatusChanged { status, .. } => Some(*status),
            Self::CardDeleted { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CardCreated(_) => "card_created",
            Self::CardReplaced(_) => "card_replaced",
            Self::CardUpdated(_) => "card_updated",
            Self::StatusChanged { .. } => "status_changed",
            Self::CardDeleted { .. } => "card_deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::status::{TechnicianStatus, WorkOrderStatus};

    #[test]
    fn test_card_deserializes_numeric_id_and_keeps_unknown_fields() {
        let json = serde_json::json!({
            "id": 42,
            "status": "pending",
            "priority": "high",
            "customer_name": "Acme Plumbing",
            "region": "north"
        });
        let card: Card<WorkOrderStatus> = serde_json::from_value(json).unwrap();
        assert_eq!(card.id, "42");
        assert_eq!(card.status, WorkOrderStatus::Pending);
        assert_eq!(card.priority, Priority::High);
        assert_eq!(card.customer_name.as_deref(), Some("Acme Plumbing"));
        assert_eq!(card.extra.get("region"), Some(&serde_json::json!("north")));
    }

    #[test]
    fn test_card_defaults_priority_when_missing() {
        let json = serde_json::json!({"id": "W-001", "status": "draft"});
        let card: Card<WorkOrderStatus> = serde_json::from_value(json).unwrap();
        assert_eq!(card.priority, Priority::Medium);
        assert!(card.assigned_technician_id.is_none());
    }

    #[test]
    fn test_card_rejects_unknown_status() {
        let json = serde_json::json!({"id": "W-001", "status": "archived"});
        assert!(serde_json::from_value::<Card<WorkOrderStatus>>(json).is_err());
    }

    #[test]
    fn test_card_rejects_empty_id() {
        let json = serde_json::json!({"id": "", "status": "draft"});
        assert!(serde_json::from_value::<Card<WorkOrderStatus>>(json).is_err());
    }

    #[test]
    fn test_effective_date_prefers_scheduled_date() {
        let mut card = Card::new("W-001", WorkOrderStatus::Draft);
        card.created_at = Some("2024-03-01T08:00:00Z".to_string());
        assert_eq!(
            card.effective_date(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        card.scheduled_date = Some("2024-03-05".to_string());
        assert_eq!(
            card.effective_date(),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_patch_accepts_card_id_alias() {
        let json = serde_json::json!({"card_id": "W-009", "technician_name": "Dana"});
        let patch: CardPatch<WorkOrderStatus> = serde_json::from_value(json).unwrap();
        assert_eq!(patch.id, "W-009");
        assert!(patch.status.is_none());
        assert_eq!(patch.technician_name.as_deref(), Some("Dana"));
    }

    fn patch_for<S: StatusKey>(json: serde_json::Value) -> CardPatch<S> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_patch_decodes_for_any_board_kind() {
        let json = serde_json::json!({"id": "T-1", "status": "en_route"});
        let patch: CardPatch<TechnicianStatus> = patch_for(json);
        assert_eq!(patch.status, Some(TechnicianStatus::EnRoute));

        let json = serde_json::json!({"id": "W-001", "status": "review"});
        let patch: CardPatch<WorkOrderStatus> = patch_for(json);
        assert_eq!(patch.status, Some(WorkOrderStatus::Review));
    }

    #[test]
    fn test_merge_display_fields_leaves_status_alone() {
        let mut card = Card::new("W-001", WorkOrderStatus::Pending);
        let mut patch = CardPatch::new("W-001");
        patch.status = Some(WorkOrderStatus::Completed);
        patch.priority = Some(Priority::Urgent);
        patch.description = Some("Leak under sink".to_string());
        card.merge_display_fields(&patch);
        assert_eq!(card.status, WorkOrderStatus::Pending);
        assert_eq!(card.priority, Priority::Urgent);
        assert_eq!(card.description.as_deref(), Some("Leak under sink"));
    }

    #[test]
    fn test_realtime_event_target_status() {
        let event: RealtimeEvent<WorkOrderStatus> = RealtimeEvent::StatusChanged {
            card_id: "W-001".to_string(),
            status: WorkOrderStatus::Review,
            technician_name: None,
        };
        assert_eq!(event.card_id(), "W-001");
        assert_eq!(event.target_status(), Some(WorkOrderStatus::Review));

        let deleted: RealtimeEvent<WorkOrderStatus> = RealtimeEvent::CardDeleted {
            card_id: "W-002".to_string(),
        };
        assert_eq!(deleted.target_status(), None);
        assert_eq!(deleted.kind(), "card_deleted");
    }

    #[test]
    fn test_pending_transitions_get_unique_request_ids() {
        let a = PendingTransition::new("W-001", WorkOrderStatus::Draft, WorkOrderStatus::Pending);
        let b = PendingTransition::new("W-001", WorkOrderStatus::Draft, WorkOrderStatus::Pending);
        assert_ne!(a.client_request_id, b.client_request_id);
    }
}
