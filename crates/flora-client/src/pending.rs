use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::message::Reply;

/// How a pending request finished before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The broker reported that every target has replied.
    Complete,
    /// The broker found no subscriber.
    NoTarget,
    /// The connection went away.
    Closed,
}

#[derive(Debug, Default)]
struct State {
    replies: Vec<Reply>,
    outcome: Option<Outcome>,
}

/// Reply accumulator for one in-flight `get`.
#[derive(Debug, Default)]
pub struct PendingRequest {
    state: Mutex<State>,
    cond: Condvar,
}

impl PendingRequest {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, reply: Reply) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.replies.push(reply);
        true
    }

    fn finish(&self, outcome: Outcome) {
        let mut state = self.lock();
        if state.outcome.is_none() {
            state.outcome = Some(outcome);
        }
        self.cond.notify_all();
    }

    /// Block until an outcome is set or `deadline` passes. Returns the
    /// replies in arrival order and the outcome, `None` meaning timeout.
    pub fn wait(&self, deadline: Instant) -> (Vec<Reply>, Option<Outcome>) {
        let mut state = self.lock();
        while state.outcome.is_none() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        (std::mem::take(&mut state.replies), state.outcome)
    }
}

#[derive(Debug, Default)]
struct Table {
    requests: HashMap<i32, Arc<PendingRequest>>,
    closed: bool,
}

/// Correlation id → pending request.
#[derive(Debug)]
pub struct PendingTable {
    next_id: AtomicI32,
    table: Mutex<Table>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            table: Mutex::new(Table::default()),
        }
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new request under a fresh positive id. Returns `None`
    /// once the table has been closed.
    pub fn register(&self) -> Option<(i32, Arc<PendingRequest>)> {
        let mut table = self.lock();
        if table.closed {
            return None;
        }
        let id = loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) & i32::MAX;
            if id != 0 && !table.requests.contains_key(&id) {
                break id;
            }
        };
        let pending = Arc::new(PendingRequest::default());
        table.requests.insert(id, Arc::clone(&pending));
        Some((id, pending))
    }

    pub fn remove(&self, id: i32) {
        self.lock().requests.remove(&id);
    }

    /// Append a reply. Returns false for unknown or already resolved ids.
    pub fn push_reply(&self, id: i32, reply: Reply) -> bool {
        let pending = self.lock().requests.get(&id).cloned();
        pending.is_some_and(|pending| pending.push(reply))
    }

    /// Resolve a request. Returns false for unknown ids.
    pub fn finish(&self, id: i32, outcome: Outcome) -> bool {
        let pending = self.lock().requests.get(&id).cloned();
        match pending {
            Some(pending) => {
                pending.finish(outcome);
                true
            }
            None => false,
        }
    }

    /// Wake every waiter with [`Outcome::Closed`] and refuse new requests.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut table = self.lock();
            table.closed = true;
            table.requests.drain().map(|(_, pending)| pending).collect()
        };
        for pending in drained {
            pending.finish(Outcome::Closed);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
