//! Response handles: where a poll answer eventually gets written.

use crate::error::DeliveryError;
use crate::types::PollResponse;
use tokio::sync::oneshot;

/// A transport-level sink for exactly one poll answer.
///
/// `deliver` consumes the handle, so a handle can never be written twice
/// or written after it was closed.
pub trait ResponseHandle<T>: Send + 'static {
    fn deliver(self: Box<Self>, response: PollResponse<T>) -> Result<(), DeliveryError>;
}

impl<T: Send + 'static> ResponseHandle<T> for oneshot::Sender<PollResponse<T>> {
    fn deliver(self: Box<Self>, response: PollResponse<T>) -> Result<(), DeliveryError> {
        // Err means the receiving request future is gone
        self.send(response).map_err(|_| DeliveryError::Closed)
    }
}
