//! Render adapter: projects the board and a visibility set into a column
//! view model and the HTML the dispatch front end mounts.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;

use super::models::CardId;
use super::status::{BoardKind, Priority, StatusKey};
use super::store::BoardStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub id: CardId,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub technician: Option<String>,
    /// A move for this card is waiting on the server.
    pub pending: bool,
    pub dragging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView<S> {
    pub status: S,
    pub cards: Vec<CardView>,
    /// Cards in this column hidden by the current filters.
    pub hidden: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardView<S> {
    pub kind: BoardKind,
    pub columns: Vec<ColumnView<S>>,
    pub total: usize,
    pub visible: usize,
}

pub fn render_board<S: StatusKey>(
    store: &BoardStore<S>,
    visible: &BTreeSet<CardId>,
    dragging: Option<&str>,
) -> BoardView<S> {
    let mut shown = 0;
    let columns = store
        .columns()
        .map(|(status, ids)| {
            let mut cards = Vec::new();
            let mut hidden = 0;
            for id in ids {
                let Some(card) = store.get_card(id) else {
                    continue;
                };
                if !visible.contains(id) {
                    hidden += 1;
                    continue;
                }
                cards.push(CardView {
                    id: id.clone(),
                    title: card.customer_name.clone().unwrap_or_else(|| id.clone()),
                    description: card.description.clone(),
                    priority: card.priority,
                    technician: card
                        .technician_name
                        .clone()
                        .or_else(|| card.assigned_technician_id.clone()),
                    pending: store.pending(id).is_some(),
                    dragging: dragging == Some(id.as_str()),
                });
            }
            shown += cards.len();
            ColumnView { status, cards, hidden }
        })
        .collect();

    BoardView {
        kind: S::KIND,
        columns,
        total: store.len(),
        visible: shown,
    }
}

impl<S: StatusKey> BoardView<S> {
    pub fn column(&self, status: S) -> Option<&ColumnView<S>> {
        self.columns.iter().find(|column| column.status == status)
    }

    /// Markup for the board: one `.kanban-column[data-status]` per column,
    /// each holding one card element per visible card.
    pub fn to_html(&self) -> String {
        let card_class = self.kind.card_class();
        let mut html = String::new();
        let _ = write!(html, r#"<div class="kanban-board" data-board="{}">"#, self.kind);
        for column in &self.columns {
            let _ = write!(
                html,
                r#"<div class="kanban-column" data-status="{}"><div class="kanban-column-header">{} <span class="count">{}</span></div>"#,
                column.status,
                column.status,
                column.cards.len()
            );
            for card in &column.cards {
                let mut classes = format!("{} priority-{}", card_class, card.priority);
                if card.pending {
                    classes.push_str(" pending");
                }
                if card.dragging {
                    classes.push_str(" dragging");
                }
                let _ = write!(
                    html,
                    r#"<div class="{}" data-id="{}" draggable="true"><div class="card-title">{}</div>"#,
                    classes,
                    escape_html(&card.id),
                    escape_html(&card.title)
                );
                if let Some(ref description) = card.description {
                    let _ = write!(
                        html,
                        r#"<div class="card-description">{}</div>"#,
                        escape_html(description)
                    );
                }
                if let Some(ref technician) = card.technician {
                    let _ = write!(
                        html,
                        r#"<div class="card-technician">{}</div>"#,
                        escape_html(technician)
                    );
                }
                html.push_str("</div>");
            }
            html.push_str("</div>");
        }
        html.push_str("</div>");
        html
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::filter::{BoardFilters, visible_cards};
    use crate::board::models::{Card, PendingTransition};
    use crate::board::status::{TechnicianStatus, WorkOrderStatus};

    fn store() -> BoardStore<WorkOrderStatus> {
        let mut a = Card::new("W-001", WorkOrderStatus::Pending);
        a.customer_name = Some("Smith & <Sons>".to_string());
        a.technician_name = Some("Dana".to_string());
        let b = Card::new("W-002", WorkOrderStatus::Pending);
        let c = Card::new("W-003", WorkOrderStatus::Review);
        BoardStore::from_cards(vec![a, b, c])
    }

    #[test]
    fn test_render_respects_visibility_and_counts_hidden() {
        let store = store();
        let visible: BTreeSet<CardId> = ["W-001".to_string(), "W-003".to_string()].into();
        let view = render_board(&store, &visible, None);
        let pending = view.column(WorkOrderStatus::Pending).unwrap();
        assert_eq!(pending.cards.len(), 1);
        assert_eq!(pending.hidden, 1);
        assert_eq!(view.total, 3);
        assert_eq!(view.visible, 2);
        assert_eq!(view.columns.len(), WorkOrderStatus::ALL.len());
    }

    #[test]
    fn test_render_marks_pending_and_dragging_cards() {
        let mut store = store();
        store
            .track_pending(PendingTransition::new(
                "W-003",
                WorkOrderStatus::Review,
                WorkOrderStatus::Completed,
            ))
            .unwrap();
        let visible = visible_cards(&store, &BoardFilters::default());
        let view = render_board(&store, &visible, Some("W-001"));
        let review = view.column(WorkOrderStatus::Review).unwrap();
        assert!(review.cards[0].pending);
        let pending = view.column(WorkOrderStatus::Pending).unwrap();
        assert!(pending.cards.iter().any(|c| c.id == "W-001" && c.dragging));
    }

    #[test]
    fn test_html_carries_dom_seams_and_escapes_text() {
        let store = store();
        let visible = visible_cards(&store, &BoardFilters::default());
        let html = render_board(&store, &visible, None).to_html();
        assert!(html.contains(r#"class="kanban-column" data-status="pending""#));
        assert!(html.contains(r#"data-id="W-001""#));
        assert!(html.contains("work-order-card"));
        assert!(html.contains("Smith &amp; &lt;Sons&gt;"));
        assert!(!html.contains("<Sons>"));
    }

    #[test]
    fn test_technician_board_uses_technician_card_class() {
        let store = BoardStore::from_cards(vec![Card::new("T-1", TechnicianStatus::OnSite)]);
        let visible = visible_cards(&store, &BoardFilters::default());
        let html = render_board(&store, &visible, None).to_html();
        assert!(html.contains("technician-card"));
        assert!(html.contains(r#"data-status="on_site""#));
    }
}
