//! Keeping the board in step with the server.
//!
//! ```text
//!  drop ──> optimistic.rs ──PUT status──> api.rs (HttpBoardApi)
//!              │    ▲
//!   BoardStore │    │ RealtimeEvent (conflict rule)
//!              ▼    │
//!           realtime.rs <──frames── events.rs <── WsConnector
//!              │
//!              └─ poller ──GET snapshot──> api.rs
//! ```
//!
//! Every change is announced on the [`bus::EventBus`].

pub mod api;
pub mod bus;
pub mod events;
pub mod optimistic;
pub mod realtime;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{BoardApi, HttpBoardApi, StatusUpdateResponse, parse_snapshot};
pub use bus::{BoardEvent, ChangeCause, ConnectionState, EventBus, Notice, NoticeLevel};
pub use events::{ClientFrame, PushMessage, decode_frame};
pub use optimistic::{EventDisposition, OptimisticUpdateManager, TransitionOutcome};
pub use realtime::{
    BackoffPolicy, PushChannel, PushConnector, PushFrame, RealtimeSettings, RealtimeSyncClient,
    WsConnector,
};
