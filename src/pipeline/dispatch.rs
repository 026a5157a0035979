//! End-of-pipeline hand-off.
//!
//! An accepted request becomes a [`Dispatched`] event and is passed to a
//! [`Dispatcher`]. What happens next (CRM record creation, exports) belongs
//! to whoever consumes the event.

use std::fmt::Debug;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// An accepted request, ready for downstream processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatched {
    pub request_id: String,
    pub route: String,
    pub method: String,
    pub path: String,
    /// Replay identifier, webhook routes only.
    pub event_id: Option<String>,
    /// Authenticated principal, protected routes only.
    pub principal: Option<String>,
    /// Parsed JSON body, `Null` when the body was empty or not JSON.
    pub payload: Value,
    pub received_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatch queue is full")]
    QueueFull,

    #[error("dispatch queue is closed")]
    Closed,
}

/// Downstream collaborator receiving accepted requests.
pub trait Dispatcher: Send + Sync + Debug {
    fn dispatch(&self, event: Dispatched) -> BoxFuture<'_, Result<(), DispatchError>>;
}

/// Dispatcher pushing events into a bounded channel.
///
/// Never waits for capacity: a full queue is reported to the caller so the
/// sender can retry later.
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: mpsc::Sender<Dispatched>,
}

impl QueueDispatcher {
    /// Create a dispatcher and the receiving end for the queue consumer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Dispatched>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, event: Dispatched) -> BoxFuture<'_, Result<(), DispatchError>> {
        let result = self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        });
        async move { result }.boxed()
    }
}
