//! Cancellable, observable proxy for one dispatched request or download.
//!
//! A caller creates an [`OperationHandle`] before anything is sent and passes it to
//! the HTTP layer, which binds the live primitives as they come into existence:
//! a request-level one (the token the request future races against) and a
//! task-level one (the spawned task driving a transfer). Either slot may be set,
//! both may be set, and each can be replaced.
//!
//! # Cancellation before binding
//!
//! Cancellation is sticky until [`clear`](OperationHandle::clear): a `cancel()`
//! that finds nothing bound is remembered, and every primitive bound afterwards is
//! cancelled as soon as it is bound. A dispatch racing a cancel therefore never
//! escapes it.
//!
//! # Events
//!
//! [`subscribe`](OperationHandle::subscribe) lazily opens a single-consumer
//! stream of [`LifecycleEvent`]s in invocation order. Without a subscriber
//! events are dropped. A new subscription closes the previous one, and `clear`
//! closes the stream after delivering [`LifecycleEvent::Cleared`].

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A transport-level object that can be asked to stop.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

impl<T: Cancellable + ?Sized> Cancellable for Arc<T> {
    fn cancel(&self) {
        (**self).cancel();
    }
}

impl Cancellable for CancellationToken {
    fn cancel(&self) {
        CancellationToken::cancel(self);
    }
}

impl Cancellable for AbortHandle {
    fn cancel(&self) {
        self.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    RequestBound,
    TaskBound,
    Cancelled,
    Cleared,
}

type Primitive = Arc<dyn Cancellable>;

#[derive(Default)]
struct HandleState {
    request: Option<Primitive>,
    task: Option<Primitive>,
    cancelled: bool,
    cleared: bool,
    events: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl HandleState {
    fn emit(&mut self, event: LifecycleEvent) {
        if self.cleared {
            return;
        }
        if let Some(tx) = &self.events
            && tx.send(event).is_err()
        {
            self.events = None;
        }
    }

    fn reopen_if_cleared(&mut self) {
        if self.cleared {
            debug!("rebinding a cleared operation handle");
            self.cleared = false;
        }
    }
}

/// See the [module docs](self).
///
/// Clones share state. Every operation is serialized behind one lock and may be
/// called from any thread; primitives are cancelled after the lock is released.
#[derive(Clone, Default)]
pub struct OperationHandle {
    state: Arc<Mutex<HandleState>>,
}

impl OperationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the request-level primitive, replacing any previous one.
    pub fn bind_request(&self, primitive: impl Cancellable + 'static) {
        let primitive: Primitive = Arc::new(primitive);
        let cancel_now = {
            let mut state = self.lock();
            state.reopen_if_cleared();
            state.request = Some(primitive.clone());
            state.emit(LifecycleEvent::RequestBound);
            state.cancelled
        };
        if cancel_now {
            debug!("request bound to a cancelled handle, cancelling it");
            primitive.cancel();
        }
    }

    /// Bind the task-level primitive, replacing any previous one.
    pub fn bind_task(&self, primitive: impl Cancellable + 'static) {
        let primitive: Primitive = Arc::new(primitive);
        let cancel_now = {
            let mut state = self.lock();
            state.reopen_if_cleared();
            state.task = Some(primitive.clone());
            state.emit(LifecycleEvent::TaskBound);
            state.cancelled
        };
        if cancel_now {
            debug!("task bound to a cancelled handle, cancelling it");
            primitive.cancel();
        }
    }

    /// Cancel the request-level primitive if bound, else the task-level one.
    ///
    /// With nothing bound the cancellation is remembered for the next bind.
    /// Emits [`LifecycleEvent::Cancelled`]. A cleared handle ignores the call
    /// until the next bind reopens it.
    pub fn cancel(&self) {
        let target = {
            let mut state = self.lock();
            if state.cleared {
                debug!("cancel requested on a cleared handle, ignoring");
                return;
            }
            state.cancelled = true;
            state.emit(LifecycleEvent::Cancelled);
            state.request.clone().or_else(|| state.task.clone())
        };
        match target {
            Some(primitive) => primitive.cancel(),
            None => debug!("cancel requested before any primitive was bound"),
        }
    }

    pub fn is_active(&self) -> bool {
        let state = self.lock();
        state.request.is_some() || state.task.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Emit [`LifecycleEvent::Cleared`], drop both primitives, forget any pending
    /// cancellation and close the event stream. Repeated calls do nothing.
    pub fn clear(&self) {
        let released = {
            let mut state = self.lock();
            if state.cleared {
                return;
            }
            state.emit(LifecycleEvent::Cleared);
            state.cleared = true;
            state.cancelled = false;
            state.events = None;
            (state.request.take(), state.task.take())
        };
        drop(released);
    }

    /// Open the event stream, closing any previous one.
    pub fn subscribe(&self) -> LifecycleEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().events = Some(tx);
        LifecycleEvents { rx }
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("OperationHandle")
            .field("request_bound", &state.request.is_some())
            .field("task_bound", &state.task.is_some())
            .field("cancelled", &state.cancelled)
            .field("cleared", &state.cleared)
            .field("observed", &state.events.is_some())
            .finish()
    }
}

/// Event stream returned by [`OperationHandle::subscribe`]. Ends when the handle is
/// cleared or a newer subscription replaces it.
#[derive(Debug)]
pub struct LifecycleEvents {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl LifecycleEvents {
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_next_event(&mut self) -> Option<LifecycleEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for LifecycleEvents {
    type Item = LifecycleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
