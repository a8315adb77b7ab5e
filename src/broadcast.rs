//! Long-poll broadcaster
//!
//! Holds the most recent message and a pool of parked poll requests.
//! A broadcast replaces the message and answers every parked request at once;
//! a poll from a client that is behind is answered immediately instead of parked.
//!
//! One broadcaster serves one topic. Clones share the same state, so construct it
//! once and hand clones to the HTTP handlers and to the producer.

use crate::clock::{Clock, SystemClock};
use crate::error::PollError;
use crate::handle::ResponseHandle;
use crate::types::{BroadcastReport, ClientId, LatestMessage, PollResponse, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::oneshot;

struct Inner<T> {
    latest: Option<LatestMessage<T>>,
    pool: HashMap<ClientId, Box<dyn ResponseHandle<T>>>,
}

impl<T> Inner<T> {
    fn current_time(&self) -> Timestamp {
        self.latest.as_ref().map_or(0, |latest| latest.time)
    }
}

/// Pool mutations never leave the map half-updated, so a poisoned lock is still usable
fn lock_inner<T>(shared: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LongPollBroadcaster<T> {
    shared: Arc<Mutex<Inner<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for LongPollBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<T> Default for LongPollBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of `subscribe`
#[must_use = "dropping a parked subscription disconnects the client"]
pub enum Subscription<T> {
    /// The client was behind and has already been answered
    CaughtUp,
    /// The client is waiting for the next broadcast
    Parked(ParkedClient<T>),
}

impl<T> Subscription<T> {
    pub fn is_parked(&self) -> bool {
        matches!(self, Subscription::Parked(_))
    }
}

/// Disconnect observer for a parked request.
///
/// Dropping it (or calling `disconnect`) removes the request from the pool.
/// Once a broadcast has answered the request this is a no-op.
pub struct ParkedClient<T> {
    id: ClientId,
    shared: Weak<Mutex<Inner<T>>>,
}

impl<T> ParkedClient<T> {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Returns true if the client was still parked
    pub fn disconnect(self) -> bool {
        self.remove()
    }

    fn remove(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };

        let removed = lock_inner(&shared).pool.remove(&self.id);
        match removed {
            Some(_handle) => {
                tracing::debug!("Client {} disconnected while parked", self.id);
                true
            }
            None => false,
        }
    }
}

impl<T> Drop for ParkedClient<T> {
    fn drop(&mut self) {
        self.remove();
    }
}

impl<T> LongPollBroadcaster<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Inner {
                latest: None,
                pool: HashMap::new(),
            })),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        lock_inner(&self.shared)
    }

    /// Timestamp of the latest message, 0 if nothing was broadcast yet
    pub fn last_message_timestamp(&self) -> Timestamp {
        self.lock().current_time()
    }

    /// Number of requests currently parked
    pub fn waiting_count(&self) -> usize {
        self.lock().pool.len()
    }
}

impl<T: Clone + Send + 'static> LongPollBroadcaster<T> {
    pub fn last_message(&self) -> Option<LatestMessage<T>> {
        self.lock().latest.clone()
    }

    /// Replace the latest message and answer every parked request with it.
    ///
    /// The pool is drained in the same critical section that replaces the
    /// message, so a concurrent `subscribe` either lands in this fan-out or
    /// sees the new timestamp and is answered right away.
    pub fn broadcast(&self, payload: T) -> BroadcastReport {
        let (response, waiting) = {
            let mut inner = self.lock();
            // Strictly increasing and never 0, which stays reserved for "nothing seen"
            let time = self
                .clock
                .now_millis()
                .max(inner.current_time().saturating_add(1));
            let latest = LatestMessage {
                message: payload,
                time,
            };
            let response = PollResponse::from(&latest);
            inner.latest = Some(latest);
            let waiting: Vec<_> = inner.pool.drain().collect();
            (response, waiting)
        };

        let mut report = BroadcastReport {
            time: response.time,
            delivered: 0,
            failed: 0,
        };

        for (id, handle) in waiting {
            match handle.deliver(response.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to deliver broadcast to client {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Broadcast at {} delivered to {} clients ({} failed)",
            report.time,
            report.delivered,
            report.failed
        );

        report
    }

    /// Register a poll from a client that last saw `last_seen`.
    ///
    /// A client whose timestamp differs from the current one is answered
    /// immediately (with the empty sentinel if nothing was broadcast yet).
    /// Otherwise the handle is parked until the next broadcast.
    pub fn subscribe<H>(&self, last_seen: Timestamp, handle: H) -> Subscription<T>
    where
        H: ResponseHandle<T>,
    {
        let mut inner = self.lock();
        let current = inner.current_time();

        if last_seen != current {
            let response = inner
                .latest
                .as_ref()
                .map_or_else(PollResponse::empty, PollResponse::from);
            drop(inner);

            tracing::debug!(
                "Client behind ({} != {}), answering immediately",
                last_seen,
                current
            );
            if let Err(e) = Box::new(handle).deliver(response) {
                tracing::warn!("Failed to deliver catch-up message: {}", e);
            }
            return Subscription::CaughtUp;
        }

        let id = ClientId::new();
        inner.pool.insert(id, Box::new(handle));
        tracing::debug!(
            "Client {} parked at {} ({} waiting)",
            id,
            current,
            inner.pool.len()
        );

        Subscription::Parked(ParkedClient {
            id,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Wait for the next message after `last_seen`.
    ///
    /// Dropping the returned future before it resolves counts as a disconnect.
    pub async fn wait(&self, last_seen: Timestamp) -> Result<PollResponse<T>, PollError> {
        let (tx, rx) = oneshot::channel();
        let subscription = self.subscribe(last_seen, tx);
        let response = rx.await.map_err(|_| PollError::Abandoned);
        drop(subscription);
        response
    }
}
