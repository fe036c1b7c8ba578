//! Test doubles: a scripted [`BoardApi`] and an in-memory push channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::api::{BoardApi, StatusUpdateResponse};
use super::realtime::{PushChannel, PushConnector, PushFrame};
use crate::board::models::{Card, CardId};
use crate::board::status::StatusKey;
use crate::errors::{ApiError, SyncError};

pub(crate) type UpdateResult<S> = Result<StatusUpdateResponse<S>, ApiError>;

enum Reply<S> {
    Now(UpdateResult<S>),
    Held(oneshot::Receiver<UpdateResult<S>>),
    Never,
}

/// Unscripted updates succeed and echo the requested status.
pub(crate) struct MockBoardApi<S> {
    snapshot: Mutex<Vec<Card<S>>>,
    snapshot_failures: AtomicUsize,
    replies: Mutex<VecDeque<Reply<S>>>,
    calls: Mutex<Vec<(CardId, S)>>,
    snapshot_calls: AtomicUsize,
}

impl<S: StatusKey> MockBoardApi<S> {
    pub fn new(snapshot: Vec<Card<S>>) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            snapshot_failures: AtomicUsize::new(0),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_snapshot(&self, cards: Vec<Card<S>>) {
        *self.snapshot.lock().unwrap() = cards;
    }

    /// Fail the next `n` snapshot fetches with HTTP 503.
    pub fn fail_snapshots(&self, n: usize) {
        self.snapshot_failures.store(n, Ordering::SeqCst);
    }

    pub fn reply(&self, result: UpdateResult<S>) {
        self.replies.lock().unwrap().push_back(Reply::Now(result));
    }

    /// What the HTTP adapter returns for `{"success": false}`.
    pub fn reject(&self, card_id: &str) {
        self.reply(Err(ApiError::Rejected {
            card_id: card_id.to_string(),
        }));
    }

    /// The next update stays in flight until the returned sender fires.
    pub fn hold(&self) -> oneshot::Sender<UpdateResult<S>> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(Reply::Held(rx));
        tx
    }

    /// The next update never answers.
    pub fn hang(&self) {
        self.replies.lock().unwrap().push_back(Reply::Never);
    }

    pub fn calls(&self) -> Vec<(CardId, S)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn confirmed<S>(status: S) -> StatusUpdateResponse<S> {
    let mut resp = StatusUpdateResponse::accepted();
    resp.new_status = Some(status);
    resp
}

#[async_trait]
impl<S: StatusKey> BoardApi<S> for MockBoardApi<S> {
    async fn fetch_snapshot(&self) -> Result<Vec<Card<S>>, ApiError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .snapshot_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn update_status(&self, card_id: &str, to_status: S) -> UpdateResult<S> {
        self.calls
            .lock()
            .unwrap()
            .push((card_id.to_string(), to_status));
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(confirmed(to_status)),
            Some(Reply::Now(result)) => result,
            Some(Reply::Held(rx)) => rx.await.unwrap_or_else(|_| {
                Err(ApiError::Decode("held reply dropped".to_string()))
            }),
            Some(Reply::Never) => std::future::pending().await,
        }
    }
}

/// In-memory [`PushConnector`]. Each queued channel serves one successful
/// connect; with the queue empty, connects are refused.
pub(crate) struct MemoryConnector {
    queue: Mutex<VecDeque<MemoryChannel>>,
}

pub(crate) struct MemoryChannel {
    rx: mpsc::UnboundedReceiver<PushFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

/// The server's side of a [`MemoryChannel`]. Dropping it closes the channel.
pub(crate) struct RemoteEnd {
    tx: mpsc::UnboundedSender<PushFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_channel(&self) -> RemoteEnd {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.queue.lock().unwrap().push_back(MemoryChannel {
            rx,
            sent: Arc::clone(&sent),
        });
        RemoteEnd { tx, sent }
    }
}

impl RemoteEnd {
    pub fn send(&self, text: &str) {
        let _ = self.tx.send(PushFrame::Text(text.to_string()));
    }

    pub fn close(self) {
        drop(self.tx);
    }

    /// Frames the client sent on this channel.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushChannel for MemoryChannel {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<PushFrame, SyncError>> {
        self.rx.recv().await.map(Ok)
    }
}

#[async_trait]
impl PushConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, SyncError> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(SyncError::Connect("connection refused".to_string())),
        }
    }
}
