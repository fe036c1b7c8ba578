use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::status::StatusKey;
use super::store::BoardStore;
use crate::errors::BoardError;

/// Shared handle to the one board store of a session.
///
/// Cloned into the drag controller, the optimistic update manager and the
/// realtime client. The lock is only ever held for the duration of a
/// closure and never across an `.await`.
pub struct BoardHandle<S: StatusKey> {
    inner: Arc<Mutex<BoardStore<S>>>,
    disposed: Arc<AtomicBool>,
}

impl<S: StatusKey> Clone for BoardHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            disposed: Arc::clone(&self.disposed),
        }
    }
}

impl<S: StatusKey> BoardHandle<S> {
    pub fn new(store: BoardStore<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run a closure against the store for reading.
    pub fn read<R>(&self, f: impl FnOnce(&BoardStore<S>) -> R) -> R {
        f(&self.lock())
    }

    /// Run a closure against the store for writing. Fails once the board
    /// has been disposed, so late network results cannot touch it.
    pub fn write<R>(&self, f: impl FnOnce(&mut BoardStore<S>) -> R) -> Result<R, BoardError> {
        if self.is_disposed() {
            return Err(BoardError::Disposed);
        }
        let mut guard = self.lock();
        // Re-check under the lock: dispose() may have raced the first check.
        if self.is_disposed() {
            return Err(BoardError::Disposed);
        }
        Ok(f(&mut guard))
    }

    /// Mark the board torn down. Irreversible.
    pub fn dispose(&self) {
        let _guard = self.lock();
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BoardStore<S>> {
        // Store methods never leave a half-applied mutation behind, so a
        // poisoned lock still guards a consistent board.
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("board lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}
