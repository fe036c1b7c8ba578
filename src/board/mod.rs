//! Board engine: cards grouped into status columns.
//!
//! ## Module Map
//!
//! | Module   | Responsibility                                               |
//! |----------|--------------------------------------------------------------|
//! | `status` | `StatusKey` trait, work-order / technician status enums      |
//! | `models` | `Card`, `CardPatch`, `PendingTransition`, `RealtimeEvent`    |
//! | `store`  | `BoardStore`: the only code that mutates columns             |
//! | `handle` | `BoardHandle`: shared `Arc<Mutex<_>>` plus the disposed flag |
//! | `filter` | Visibility predicate and search debouncing                   |
//! | `drag`   | Drag gesture state machine                                   |
//! | `render` | Column view model and HTML projection                        |

pub mod drag;
pub mod filter;
pub mod handle;
pub mod models;
pub mod render;
pub mod status;
pub mod store;

pub use drag::{DragDropController, DragState, DropOutcome, InsertionIndicator, TransitionRequest};
pub use filter::{BoardFilters, DateRange, SearchDebouncer, TechnicianFilter, visible_cards};
pub use handle::BoardHandle;
pub use models::{Card, CardId, CardPatch, PendingTransition, RealtimeEvent};
pub use render::{BoardView, CardView, ColumnView, render_board};
pub use status::{BoardKind, Priority, StatusKey, TechnicianStatus, WorkOrderStatus};
pub use store::{BoardStore, EventEffect, SnapshotReport};
