//! Cooperative cancellation for a single logical operation.
//!
//! A [`CancellationToken`] is cheap to clone; all clones observe the same
//! flag. The executor races the token against the in-flight transport call
//! and the retry sleep, so cancelling stops the current attempt and any
//! retry that would have followed it.

use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    cancelled: AtomicBool,
    next_callback: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    notify: Notify,
}

/// Cooperative abort signal scoped to one logical operation.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                next_callback: AtomicU64::new(0),
                callbacks: Mutex::new(Vec::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the token.
    ///
    /// The first call runs every registered callback once, in registration
    /// order, and wakes all [`cancelled`](Self::cancelled) waiters. Later
    /// calls do nothing.
    pub fn cancel(&self) {
        let callbacks = {
            let mut callbacks = self.inner.callbacks.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *callbacks)
        };

        self.inner.notify.notify_waiters();

        tracing::debug!(callbacks = callbacks.len(), "Cancellation token fired");
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Registers a callback to run when the token is cancelled.
    ///
    /// If the token is already cancelled the callback runs immediately on
    /// the calling thread.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Box::new(callback));
    }

    /// Returns the number of callbacks waiting for cancellation.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    /// Creates a token that is cancelled whenever `self` is.
    ///
    /// The link lasts as long as the returned [`ChildToken`]; dropping it
    /// removes the callback registered on `self`. Cancelling the child
    /// leaves the parent untouched.
    pub fn child_token(&self) -> ChildToken {
        let child = CancellationToken::new();
        let linked = child.clone();
        let registration = self.register(Box::new(move || linked.cancel()));
        ChildToken {
            token: child,
            parent: self.clone(),
            registration,
        }
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Stores the callback, or runs it at once if already cancelled.
    /// Returns the registration id of a stored callback.
    fn register(&self, callback: Callback) -> Option<u64> {
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.inner.cancelled.load(Ordering::Acquire) {
                let id = self.inner.next_callback.fetch_add(1, Ordering::Relaxed);
                callbacks.push((id, callback));
                return Some(id);
            }
        }
        callback();
        None
    }

    fn unregister(&self, id: u64) {
        let removed = {
            let mut callbacks = self.inner.callbacks.lock();
            callbacks
                .iter()
                .position(|(existing, _)| *existing == id)
                .map(|index| callbacks.remove(index))
        };
        drop(removed);
    }
}

/// A token linked to a parent for as long as it is alive.
///
/// Dereferences to the child [`CancellationToken`].
pub struct ChildToken {
    token: CancellationToken,
    parent: CancellationToken,
    registration: Option<u64>,
}

impl ChildToken {
    /// Returns the child token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Deref for ChildToken {
    type Target = CancellationToken;

    fn deref(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ChildToken {
    fn drop(&mut self) {
        if let Some(id) = self.registration.take() {
            self.parent.unregister(id);
        }
    }
}

impl std::fmt::Debug for ChildToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildToken")
            .field("cancelled", &self.token.is_cancelled())
            .field("linked", &self.registration.is_some())
            .finish()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("callbacks", &self.pending_callbacks())
            .finish()
    }
}
