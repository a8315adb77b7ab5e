use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. `0` means "never seen a message".
pub type Timestamp = i64;

/// Opaque identity of one parked poll request
pub type ClientId = ulid::Ulid;

/// The single most recently broadcast message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestMessage<T> {
    pub message: T,
    pub time: Timestamp,
}

/// What a poll request is answered with.
///
/// Serializes as `{"message": <payload|null>, "time": <int>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse<T> {
    pub message: Option<T>,
    pub time: Timestamp,
}

impl<T> PollResponse<T> {
    /// Sentinel sent to clients that are behind when nothing was broadcast yet
    pub fn empty() -> Self {
        Self {
            message: None,
            time: 0,
        }
    }
}

impl<T: Clone> From<&LatestMessage<T>> for PollResponse<T> {
    fn from(latest: &LatestMessage<T>) -> Self {
        Self {
            message: Some(latest.message.clone()),
            time: latest.time,
        }
    }
}

/// Per-client outcome of one broadcast fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub time: Timestamp,
    pub delivered: usize,
    pub failed: usize,
}
