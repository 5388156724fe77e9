//! Message Handler Registry
//!
//! Maps message ids to the callbacks interested in them. Each registration
//! chooses where it runs: inline on the process worker, or deferred onto a queue
//! the embedding application drains from its own thread.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::types::Message;
use crate::wire::types::MessageId;

/// Type alias for a thread-safe message callback.
pub type HandlerFn = Arc<dyn Fn(&Message) + Send + Sync>;

/// Where a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On the process worker, as soon as the message is accepted.
    Immediate,
    /// On whichever thread calls `ClusterManager::dispatch_deferred`.
    Deferred,
}

/// Token returned by `register`, used to remove that one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Clone)]
pub struct Handler {
    pub id: HandlerId,
    pub dispatch: Dispatch,
    pub callback: HandlerFn,
}

/// Registry holding every handler per message id.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<MessageId, Vec<Handler>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for `message_id`; earlier registrations keep running.
    pub fn register<F>(&self, message_id: MessageId, dispatch: Dispatch, callback: F) -> HandlerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.handlers.entry(message_id).or_default().push(Handler {
            id,
            dispatch,
            callback: Arc::new(callback),
        });

        tracing::debug!("Registered {:?} handler for message {}", dispatch, message_id);
        id
    }

    /// Removes one registration. Returns `false` if it was not registered.
    pub fn unregister(&self, message_id: MessageId, handler_id: HandlerId) -> bool {
        let Some(mut handlers) = self.handlers.get_mut(&message_id) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|handler| handler.id != handler_id);
        let removed = handlers.len() != before;
        let now_empty = handlers.is_empty();
        drop(handlers);

        if now_empty {
            self.handlers.remove_if(&message_id, |_, list| list.is_empty());
        }
        removed
    }

    /// Cloned snapshot, so callbacks run without holding the map.
    pub fn handlers_for(&self, message_id: &MessageId) -> Vec<Handler> {
        self.handlers
            .get(message_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn has_handlers(&self, message_id: &MessageId) -> bool {
        self.handlers
            .get(message_id)
            .is_some_and(|entry| !entry.is_empty())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }
}

pub type DeferredCall = Box<dyn FnOnce() + Send + 'static>;

/// Calls waiting for the application's own update tick.
#[derive(Default)]
pub struct DeferredQueue {
    calls: Mutex<VecDeque<DeferredCall>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: DeferredCall) {
        self.calls.lock().push_back(call);
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Runs everything queued so far on the calling thread. Calls queued while
    /// draining wait for the next drain. Returns how many calls ran.
    pub fn drain(&self) -> usize {
        let pending: Vec<DeferredCall> = self.calls.lock().drain(..).collect();
        let count = pending.len();
        for call in pending {
            call();
        }
        count
    }
}
