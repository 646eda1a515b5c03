//! Request correlation: matching asynchronous responses to in-flight calls.
//!
//! Every transport session owns one [`RequestCorrelator`]. [`dispatch`]
//! allocates a request id, registers a pending entry, transmits the frame and
//! waits for the matching response under a deadline. Each pending entry ends
//! in exactly one of three ways: a matching response, deadline expiry, or
//! session close.

use crate::connection::{
    domain::{RequestId, RpcError, RpcRequest, RpcResponse},
    ports::{TransportError, TransportSession},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome of a correlated call that did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The remote side answered with an error payload.
    #[error("remote error {}: {}", .0.code, .0.message)]
    Remote(RpcError),

    /// No response arrived before the deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The session closed while the call was outstanding.
    #[error("session closed while the call was outstanding: {0}")]
    Disconnected(String),

    /// The frame could not be transmitted.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for correlated calls.
pub type CallResult<T> = Result<T, CallError>;

#[derive(Debug)]
enum Completion {
    Response(Result<Value, RpcError>),
    Closed(String),
}

#[derive(Debug, Default)]
struct CorrelatorState {
    pending: HashMap<RequestId, oneshot::Sender<Completion>>,
    closed: Option<String>,
}

/// Pending-call table owned by one transport session.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicU64,
    state: Mutex<CorrelatorState>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    /// Creates an empty correlator. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            state: Mutex::new(CorrelatorState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CorrelatorState> {
        // The table holds no invariants a panicking holder could break
        // halfway, so a poisoned lock is still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn register(&self) -> CallResult<(RequestId, oneshot::Receiver<Completion>)> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(CallError::Disconnected(reason.clone()));
        }

        let mut id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        while state.pending.contains_key(&id) {
            id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        }

        let (sender, receiver) = oneshot::channel();
        state.pending.insert(id, sender);
        Ok((id, receiver))
    }

    /// Routes a response to its pending call.
    ///
    /// Returns `false` when no call with that id is outstanding (for example
    /// a late reply after the caller timed out); such responses are dropped.
    pub fn complete(&self, response: RpcResponse) -> bool {
        let sender = self.lock().pending.remove(&response.id);
        match sender {
            Some(sender) => sender.send(Completion::Response(response.outcome)).is_ok(),
            None => {
                debug!(request_id = %response.id, "discarding response for untracked request");
                false
            }
        }
    }

    /// Removes a pending call without completing it.
    fn abandon(&self, id: RequestId) {
        self.lock().pending.remove(&id);
    }

    /// Rejects every outstanding call and refuses new ones.
    ///
    /// Returns the number of calls rejected. Closing twice rejects nothing
    /// the second time.
    pub fn close(&self, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_owned());
            }
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (_, sender) in drained {
            // A receiver that already went away needs no notification.
            drop(sender.send(Completion::Closed(reason.to_owned())));
        }
        count
    }

    /// Returns the number of outstanding calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns whether the correlator has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }
}

/// Removes the pending entry when the dispatching future ends, whether it
/// completed, timed out, or was dropped by its caller.
struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.abandon(self.id);
    }
}

/// Sends `method` with `params` over `session` and waits for the matching
/// response.
///
/// The deadline covers both transmission and the wait for the reply. Calls
/// dispatched concurrently on one session complete in any order.
///
/// # Errors
///
/// Returns [`CallError::Remote`] when the remote side reports an error,
/// [`CallError::Timeout`] when the deadline passes,
/// [`CallError::Disconnected`] when the session closes first or reports
/// itself closed on write, and [`CallError::Transport`] when the frame
/// cannot be sent for any other reason.
pub async fn dispatch(
    session: &dyn TransportSession,
    method: &str,
    params: Value,
    timeout: Duration,
) -> CallResult<Value> {
    let correlator = session.correlator();
    let (id, receiver) = correlator.register()?;
    let _guard = PendingGuard { correlator, id };
    let request = RpcRequest::new(id, method, params);

    let exchange = async move {
        match session.send(request).await {
            Ok(Some(response)) => {
                correlator.complete(response);
            }
            Ok(None) => {}
            Err(TransportError::Closed(reason)) => return Err(CallError::Disconnected(reason)),
            Err(err) => return Err(err.into()),
        }
        receiver
            .await
            .map_err(|_| CallError::Disconnected("session dropped the pending call".to_owned()))
    };

    match tokio::time::timeout(timeout, exchange).await {
        Err(_) => {
            debug!(request_id = %id, method, "call deadline expired");
            Err(CallError::Timeout(timeout))
        }
        Ok(Err(err)) => Err(err),
        Ok(Ok(Completion::Response(Ok(result)))) => Ok(result),
        Ok(Ok(Completion::Response(Err(remote)))) => Err(CallError::Remote(remote)),
        Ok(Ok(Completion::Closed(reason))) => Err(CallError::Disconnected(reason)),
    }
}
