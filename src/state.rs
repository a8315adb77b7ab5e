use crate::broadcast::LongPollBroadcaster;
use crate::config::ServerConfig;
use serde_json::Value;

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    /// The one topic this server publishes
    pub broadcaster: LongPollBroadcaster<Value>,
    pub publish_token: Option<String>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            broadcaster: LongPollBroadcaster::new(),
            publish_token: config.publish_token.clone(),
        }
    }

    pub fn with_broadcaster(broadcaster: LongPollBroadcaster<Value>) -> Self {
        Self {
            broadcaster,
            publish_token: None,
        }
    }
}
